//! Object storage client for export buckets.
//!
//! Thin wrapper over `object_store`: `gs://bucket/prefix` URLs map to GCS,
//! anything else is treated as a local filesystem path (used by tests).
//! Paths handed to the client are relative to the configured prefix.

use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::ObjectStore;
use snafu::prelude::*;
use std::sync::Arc;

use crate::error::{GcsConfigSnafu, InvalidUrlSnafu, LocalConfigSnafu, StorageError};

/// A reference-counted storage client.
pub type StorageClientRef = Arc<StorageClient>;

/// Storage client bound to one bucket (or local directory).
pub struct StorageClient {
    object_store: Arc<dyn ObjectStore>,
    prefix: Option<Path>,
    canonical_url: String,
}

impl std::fmt::Debug for StorageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageClient<{}>", self.canonical_url)
    }
}

impl StorageClient {
    /// Create a storage client for the given URL.
    pub fn for_url(url: &str) -> Result<Self, StorageError> {
        if let Some(rest) = url.strip_prefix("gs://") {
            let (bucket, key) = match rest.split_once('/') {
                Some((bucket, key)) => (bucket, Some(key.trim_matches('/'))),
                None => (rest, None),
            };
            ensure!(!bucket.is_empty(), InvalidUrlSnafu { url });

            let store = GoogleCloudStorageBuilder::from_env()
                .with_bucket_name(bucket)
                .build()
                .context(GcsConfigSnafu)?;

            Ok(Self {
                object_store: Arc::new(store),
                prefix: key.filter(|k| !k.is_empty()).map(Path::from),
                canonical_url: url.to_string(),
            })
        } else {
            let store = LocalFileSystem::new_with_prefix(url).context(LocalConfigSnafu)?;
            Ok(Self {
                object_store: Arc::new(store),
                prefix: None,
                canonical_url: url.to_string(),
            })
        }
    }

    /// The URL this client was constructed from.
    pub fn url(&self) -> &str {
        &self.canonical_url
    }

    /// Check whether an object exists at the given relative path.
    pub async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let qualified = self.qualify(path);
        match self.object_store.head(&qualified).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(source) => Err(StorageError::ObjectStore { source }),
        }
    }

    fn qualify(&self, path: &str) -> Path {
        match &self.prefix {
            Some(prefix) => prefix.parts().chain(Path::from(path).parts()).collect(),
            None => Path::from(path),
        }
    }
}
