use std::sync::Arc;
use std::time::Duration;

use aid_core::{DigestStore, ProfileStore};

use crate::auth::IdentityVerifier;

pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct AppState {
    pub digests: Arc<dyn DigestStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub verifier: Arc<dyn IdentityVerifier>,
    /// Upper bound applied to the `limit` query parameter.
    pub max_page_size: u32,
    pub storage_timeout: Duration,
}

impl AppState {
    pub fn new(
        digests: Arc<dyn DigestStore>,
        profiles: Arc<dyn ProfileStore>,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        Self {
            digests,
            profiles,
            verifier,
            max_page_size: aid_core::page::DEFAULT_MAX_PAGE_SIZE,
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }

    pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size;
        self
    }
}
