pub mod cache;
pub mod cost;
pub mod embeddings;
pub mod jobs;
pub mod monitoring;
pub mod processor;
pub mod queue;
pub mod validation;
