//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// What `init` created
#[derive(Debug, Clone, Serialize)]
pub struct InitInfo {
    pub config_path: String,
    pub db_path: String,
    pub index_dir: String,
}

/// Write a default configuration, create the index directory and the
/// document registry
pub async fn cmd_init(config_path: &Path, force: bool) -> Result<InitInfo> {
    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let config = Config::for_config_file(config_path);
    config.validate()?;
    config.save()?;

    std::fs::create_dir_all(&config.paths.index_dir)?;
    info!("Created index directory at {:?}", config.paths.index_dir);

    MetaDb::new(&config.paths.db_file).await?;
    info!("Created database at {:?}", config.paths.db_file);

    Ok(InitInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        index_dir: config.paths.index_dir.display().to_string(),
    })
}

/// Print init summary to console
pub fn print_init(info: &InitInfo) {
    println!("✓ pagetree initialized successfully");
    println!("  Config: {}", info.config_path);
    println!("  Database: {}", info.db_path);
    println!("  Indices: {}", info.index_dir);
    println!("\nNext steps:");
    println!("  1. Point completion.base_url at your model server (default: local Ollama)");
    println!("  2. Index a PDF: pagetree index ./report.pdf");
    println!("  3. Ask it something: pagetree ask <document-id> \"What does it conclude?\"");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_layout() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");

        let info = cmd_init(&config_path, false).await.unwrap();
        assert!(config_path.exists());
        assert!(tmp.path().join("indices").is_dir());
        assert!(tmp.path().join("metadata.db").exists());
        assert!(info.db_path.ends_with("metadata.db"));

        let loaded = Config::load(&config_path).unwrap();
        assert_eq!(loaded.paths.index_dir, tmp.path().join("indices"));
    }

    #[tokio::test]
    async fn test_init_refuses_overwrite_without_force() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(&config_path, "# mine\n").unwrap();

        let err = cmd_init(&config_path, false).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(std::fs::read_to_string(&config_path).unwrap(), "# mine\n");

        cmd_init(&config_path, true).await.unwrap();
        assert!(Config::load(&config_path).is_ok());
    }
}
