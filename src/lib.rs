//! pagetree - reasoning-based PDF indexing and tree search
//!
//! A PDF is turned into a tree of sections (from its table of contents when
//! it has one, by grouping pages otherwise), each node summarized by a
//! locally hosted model. Questions are answered by letting the model read the
//! tree and pick the sections to use, with a keyword ranking as fallback.

pub mod commands;
pub mod config;
pub mod error;
pub mod index;
pub mod llm;
pub mod meta;
pub mod pdf;
pub mod progress;
pub mod search;
pub mod store;
pub mod tree;

pub use error::{Error, Result};
