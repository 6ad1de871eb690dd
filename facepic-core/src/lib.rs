//! Face-to-person clustering for a photo library.
//!
//! Faces arrive as embeddings from an external detector. The [`matcher`]
//! decides which known person each face belongs to (or starts a new one),
//! the [`representative`] module keeps every person's thumbnail face
//! current, and [`cluster::Clusterer`] drives both over a [`catalog`]
//! persisted by [`library`].

pub mod catalog;
pub mod cluster;
pub mod compare;
pub mod config;
pub mod embed;
pub mod filter;
pub mod library;
pub mod matcher;
pub mod model;
pub mod representative;
pub mod store;

pub use catalog::Catalog;
pub use cluster::{ClusterStats, Clusterer, IngestStats, PruneStats};
pub use embed::Embedding;
pub use matcher::{Assignment, Matcher, SharedMatcher};
pub use model::{BoundingBox, Detection, Face, FaceId, Person, PersonId};
pub use store::{EmbeddingStore, MemoryEmbeddingStore};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid embedding: {0}")]
    Embedding(#[from] embed::EmbedError),
    #[error("Storage error: {0}")]
    Storage(#[from] store::StoreError),
    #[error("Library error: {0}")]
    Library(#[from] library::LibraryError),
    #[error("Cannot merge person {0} into itself")]
    SamePerson(PersonId),
}

impl Error {
    /// Embedding rejected for dimensionality or content
    pub fn is_invalid_embedding(&self) -> bool {
        matches!(
            self,
            Error::Embedding(_) | Error::Library(library::LibraryError::Embedding { .. })
        )
    }

    /// Referenced person or face does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Storage(e) if e.is_not_found())
    }

    /// Backing storage could not be read or written; the caller may retry
    pub fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            Error::Storage(store::StoreError::Unavailable(_))
                | Error::Library(library::LibraryError::Io(_))
        )
    }
}
