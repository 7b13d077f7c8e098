//! Test doubles and a small hotel-review corpus shared by the workspace's
//! integration tests.
pub mod corpus;
pub mod models;

pub use corpus::{hotel_corpus, CommentBuilder};
pub use models::{FailingEmbedder, FnReranker, Reply, ScriptedChat, StallingCollection};
