//! Document listing and removal

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::{Document, MetaDb};
use clap_complete::Shell;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// List registered documents, newest first
pub async fn cmd_list_documents(db: &MetaDb) -> Result<Vec<Document>> {
    info!("Listing documents");
    db.list_documents().await
}

/// What `remove` deleted
#[derive(Debug, Clone, Serialize)]
pub struct RemoveReport {
    pub document_id: String,
    pub filename: String,
    pub index_removed: bool,
}

/// Remove a document record and its index artifacts
pub async fn cmd_remove_document(config: &Config, db: &MetaDb, id: &str) -> Result<RemoveReport> {
    let doc = db
        .get_document(id)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;

    let mut index_removed = false;
    let doc_dir = config.paths.index_dir.join(&doc.id);
    if doc_dir.is_dir() {
        tokio::fs::remove_dir_all(&doc_dir).await?;
        index_removed = true;
    } else if let Some(path) = doc.index_path.as_deref().map(Path::new) {
        // Artifacts outside the index directory belong to the user
        if path.starts_with(&config.paths.index_dir) && path.exists() {
            tokio::fs::remove_file(path).await?;
            index_removed = true;
        }
    }

    if !db.delete_document(&doc.id).await? {
        warn!("Document {} vanished during removal", doc.id);
    }
    info!("Removed document {}", doc.id);

    Ok(RemoveReport {
        document_id: doc.id,
        filename: doc.filename,
        index_removed,
    })
}

/// Print documents list to console
pub fn print_documents(docs: &[Document]) {
    println!("\n📚 Registered Documents\n");

    if docs.is_empty() {
        println!("No documents registered. Use 'pagetree index <file.pdf>' to add one.");
        return;
    }

    for doc in docs {
        println!("• {} [{}]", doc.filename, doc.status);
        println!("  ID: {}", doc.id);
        println!("  File: {}", doc.file_path);
        if let Some(index_path) = &doc.index_path {
            println!("  Index: {}", index_path);
        }
        if let Some(message) = &doc.error_message {
            println!("  Error: {}", message);
        }
        println!("  Updated: {}", doc.updated_at);
        println!();
    }
}

/// Print document IDs with descriptions for shell completions
pub fn print_document_completions(docs: &[Document], shell: Shell) {
    for doc in docs {
        let description = format!("{} ({})", doc.filename, doc.status).replace('\n', " ");

        match shell {
            Shell::Zsh => println!("{}:{}", doc.id, description.replace(':', "\\:")),
            Shell::Fish => println!("{}\t{}", doc.id, description.replace('\t', " ")),
            _ => println!("{}", doc.id),
        }
    }
}
