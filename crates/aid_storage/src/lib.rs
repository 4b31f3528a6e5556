use std::path::Path;
use std::sync::Arc;

use aid_core::{DigestStore, Error, ProfileStore, Result};
use async_trait::async_trait;

pub mod backends;

pub use backends::*;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn get_error_message() -> &'static str;
    async fn new() -> Result<Self>
    where
        Self: Sized;
}

/// Both store halves of one backend, shared for the web layer.
pub type Stores = (Arc<dyn DigestStore>, Arc<dyn ProfileStore>);

/// Build the stores for a backend selected by name ("memory" or "sqlite").
/// `db_path` only applies to file-backed backends.
#[cfg_attr(not(feature = "sqlite"), allow(unused_variables))]
pub async fn create_storage(name: &str, db_path: Option<&Path>) -> Result<Stores> {
    match name {
        "memory" => {
            let storage = Arc::new(MemoryStorage::new());
            let digests: Arc<dyn DigestStore> = storage.clone();
            let profiles: Arc<dyn ProfileStore> = storage;
            Ok((digests, profiles))
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let storage = match db_path {
                Some(path) => Arc::new(SqliteStorage::new_with_path(path).await?),
                None => Arc::new(<SqliteStorage as StorageBackend>::new().await?),
            };
            let digests: Arc<dyn DigestStore> = storage.clone();
            let profiles: Arc<dyn ProfileStore> = storage;
            Ok((digests, profiles))
        }
        other => Err(Error::Storage(format!(
            "Unknown storage backend: {}",
            other
        ))),
    }
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{create_storage, StorageBackend, Stores};
}
