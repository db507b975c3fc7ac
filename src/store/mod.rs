//! Persisted index artifacts
//!
//! An artifact is the pretty-printed JSON of a [`DocumentTree`]. Writes go to
//! a sibling temp file that is renamed into place, so a failed run never
//! leaves a partial artifact behind.

use crate::error::{Error, Result};
use crate::tree::{DocumentTree, SectionNode};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Artifact location for a PDF: `{index_dir}/{stem}_structure.json`
pub fn artifact_path(index_dir: &Path, pdf_path: &Path) -> PathBuf {
    let stem = pdf_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    index_dir.join(format!("{}_structure.json", stem))
}

/// Write `tree` to `path`, replacing any previous artifact
pub async fn write_index(path: &Path, tree: &DocumentTree) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_string_pretty(tree)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, json.as_bytes()).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    info!("Wrote index artifact {:?}", path);
    Ok(())
}

/// Load an artifact written by [`write_index`].
///
/// Also accepts a bare `{"structure": [...]}` object or a top-level node
/// array; missing metadata is filled in from the file name and the tree.
pub async fn load_index(path: &Path) -> Result<DocumentTree> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::DocumentNotFound(path.display().to_string())
        } else {
            Error::Io(e)
        }
    })?;
    parse_index(&content, path)
}

fn parse_index(content: &str, path: &Path) -> Result<DocumentTree> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    let mut tree = if value.is_array() {
        let structure: Vec<SectionNode> = serde_json::from_value(value)?;
        DocumentTree::new(String::new(), 0, structure)
    } else if value.get("structure").is_some() {
        serde_json::from_value::<DocumentTree>(value)?
    } else {
        return Err(Error::Other(format!(
            "{} is not an index artifact (no structure)",
            path.display()
        )));
    };

    if tree.doc_name.is_empty() {
        tree.doc_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().trim_end_matches("_structure").to_string())
            .unwrap_or_default();
    }
    if tree.page_count == 0 {
        tree.page_count = tree.structure.iter().map(|n| n.end_index).max().unwrap_or(0);
    }

    debug!("Loaded index with {} nodes from {:?}", tree.node_count(), path);
    Ok(tree)
}
