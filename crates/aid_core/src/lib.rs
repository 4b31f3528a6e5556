pub mod error;
pub mod feed;
pub mod page;
pub mod query;
pub mod storage;
pub mod types;

pub use error::Error;
pub use page::{PageRequest, PageResult, Pagination};
pub use query::{DateRange, FilterRequest, Predicate};
pub use storage::{DigestStore, FacetCount, FacetField, PreferencesUpdate, ProfileStore};
pub use types::{Category, Digest, DigestFrequency, Preferences, ReadEntry, UserProfile};

pub type Result<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::error::Error;
    pub use crate::page::{PageRequest, PageResult, Pagination};
    pub use crate::query::{DateRange, FilterRequest, Predicate};
    pub use crate::storage::{DigestStore, FacetCount, FacetField, ProfileStore};
    pub use crate::types::{Category, Digest, UserProfile};
    pub use crate::Result;
}
