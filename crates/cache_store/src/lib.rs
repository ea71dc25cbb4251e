mod error;
mod paths;
mod schema;
mod store;

pub use error::CacheStoreError;
pub use paths::{cache_file_name, cache_root, sanitize_dir_name, server_cache_dir, CACHE_APP_DIR};
pub use schema::{CacheKind, CACHE_FILE_VERSION};
pub use store::{BoundedStore, LoadOutcome, DEFAULT_CAPACITY};
