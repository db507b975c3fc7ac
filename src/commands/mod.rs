//! CLI commands implementation

pub mod documents;
pub mod index;
pub mod init;
pub mod search;
pub mod status;

pub use documents::*;
pub use index::*;
pub use init::*;
pub use search::*;
pub use status::*;
