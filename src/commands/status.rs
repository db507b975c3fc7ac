//! Status command implementation

use crate::config::Config;
use crate::error::Result;
use crate::llm::{ChatBackend, OpenAiCompatibleBackend};
use crate::meta::{MetaDb, RegistryStats};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub index_dir: String,
    pub base_url: String,
    pub model: String,
    pub backend_connected: bool,
    pub documents: RegistryStats,
}

/// Get system status
pub async fn cmd_status(config: &Config, db: &MetaDb) -> Result<StatusInfo> {
    info!("Getting status");

    let documents = db.stats().await?;
    let backend = OpenAiCompatibleBackend::new(&config.completion)?;
    status_with_backend(config, documents, &backend).await
}

async fn status_with_backend(
    config: &Config,
    documents: RegistryStats,
    backend: &dyn ChatBackend,
) -> Result<StatusInfo> {
    let backend_connected = backend.check_connection().await;
    if !backend_connected {
        tracing::debug!("{} backend at {} not reachable", backend.name(), config.completion.base_url);
    }

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        index_dir: config.paths.index_dir.display().to_string(),
        base_url: config.completion.base_url.clone(),
        model: config.completion.model.clone(),
        backend_connected,
        documents,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 pagetree Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("Indices: {}", status.index_dir);
    println!("\nModel server:");
    println!("  URL: {}", status.base_url);
    println!("  Model: {}", status.model);

    let connection_status = if status.backend_connected {
        "✓ Connected"
    } else {
        "✗ Not connected (search will fall back to keywords)"
    };
    println!("  Status: {}", connection_status);
    println!("\nDocuments:");
    println!("  Total: {}", status.documents.total);
    println!("  Ready: {}", status.documents.ready);
    println!("  In progress: {}", status.documents.indexing);
    println!("  Failed: {}", status.documents.failed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedBackend;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_status_reports_reachable_backend() {
        let config = Config::default();
        let backend = ScriptedBackend::constant("");
        let status = status_with_backend(&config, RegistryStats::default(), &backend)
            .await
            .unwrap();
        assert!(status.backend_connected);
        assert_eq!(status.model, config.completion.model);
    }

    #[tokio::test]
    async fn test_status_against_http_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"models": []}"#))
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.completion.base_url = format!("{}/v1", server.uri());
        let backend = OpenAiCompatibleBackend::new(&config.completion).unwrap();
        let status = status_with_backend(&config, RegistryStats::default(), &backend)
            .await
            .unwrap();
        assert!(status.backend_connected);
        assert_eq!(status.base_url, config.completion.base_url);
    }
}
