pub mod client;
pub mod writer;

pub use client::AnalyticsClient;
pub use writer::{IndexRequest, IndexWriter};
