use crate::config::{
    default_add_doc_description, default_add_node_id, default_add_node_summary,
    default_add_node_text, default_completion_model, default_max_page_num_each_node,
    default_max_token_num_each_node, default_toc_check_page_num, YesNo,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Per-document indexing options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOptions {
    /// Requested model; overridden to the provisioned one
    #[serde(default = "default_completion_model")]
    pub model: String,

    #[serde(default = "default_toc_check_page_num")]
    pub toc_check_page_num: usize,

    #[serde(default = "default_max_page_num_each_node")]
    pub max_page_num_each_node: usize,

    #[serde(default = "default_max_token_num_each_node")]
    pub max_token_num_each_node: usize,

    #[serde(default = "default_add_node_id")]
    pub add_node_id: YesNo,

    #[serde(default = "default_add_node_summary")]
    pub add_node_summary: YesNo,

    #[serde(default = "default_add_doc_description")]
    pub add_doc_description: YesNo,

    #[serde(default = "default_add_node_text")]
    pub add_node_text: YesNo,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            model: default_completion_model(),
            toc_check_page_num: default_toc_check_page_num(),
            max_page_num_each_node: default_max_page_num_each_node(),
            max_token_num_each_node: default_max_token_num_each_node(),
            add_node_id: default_add_node_id(),
            add_node_summary: default_add_node_summary(),
            add_doc_description: default_add_doc_description(),
            add_node_text: default_add_node_text(),
        }
    }
}

impl IndexOptions {
    pub fn validate(&self) -> Result<()> {
        if self.toc_check_page_num == 0 {
            return Err(Error::InvalidOptions(
                "toc_check_page_num must be at least 1".to_string(),
            ));
        }
        if self.max_page_num_each_node == 0 {
            return Err(Error::InvalidOptions(
                "max_page_num_each_node must be at least 1".to_string(),
            ));
        }
        if self.max_token_num_each_node == 0 {
            return Err(Error::InvalidOptions(
                "max_token_num_each_node must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
