//! Text embedding pipeline (C2): model lifecycle, query cache, similarity.

pub mod service;

pub use service::{cosine_similarity, EmbeddingError, EmbeddingService};
