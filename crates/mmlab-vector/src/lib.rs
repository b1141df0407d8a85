//! mmlab Vector - Embedding codec, store, and similarity ranking
//!
//! - [`VectorCodec`]: exponent-free text encoding for column stores
//! - [`VectorStore`]: keyed in-memory document store
//! - [`SimilarityIndex`]: brute-force cosine top-k
//! - [`QueryEmbedder`]: HTTP clients that embed query text

pub mod codec;
pub mod embedding;
pub mod similarity;
pub mod store;

pub use codec::{check_finite, VectorCodec, DEFAULT_DELIMITER};
pub use embedding::{
    check_embedding, create_query_embedder, OllamaEmbedder, QueryEmbedder, ServerlessEmbedder,
};
pub use similarity::{cosine_similarity, SimilarityIndex};
pub use store::VectorStore;
