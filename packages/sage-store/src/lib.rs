pub mod qdrant;

mod error;

pub use error::Error;
pub use qdrant::{ChunkRecord, QdrantStore};

pub type Result<T, E = Error> = std::result::Result<T, E>;
