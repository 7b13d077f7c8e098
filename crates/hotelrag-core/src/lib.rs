pub mod config;
pub mod error;
pub mod snapshot;
pub mod traits;
pub mod types;

pub use error::{Error, ModelError, Result};
pub use snapshot::CommentStore;
pub use traits::*;
pub use types::*;
