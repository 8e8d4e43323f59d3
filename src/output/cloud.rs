//! Object storage destinations (local, S3, R2, GCS, Azure)

use crate::error::{Error, Result};
use bytes::Bytes;
use chrono::NaiveDate;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::fmt;
use std::sync::Arc;

/// Build a Hive-style partitioned path for one part file
///
/// Format: `{stream}/dt={YYYY-MM-DD}/part-{run}-{seq}.{ext}`
pub fn build_partitioned_path(
    stream_name: &str,
    date: NaiveDate,
    run_id: &str,
    seq: u64,
    extension: &str,
) -> String {
    // `schema.table` must stay a single path segment
    let stream_dir = stream_name.replace(['.', '/'], "_");
    format!(
        "{stream_dir}/dt={}/part-{run_id}-{seq:05}.{extension}",
        date.format("%Y-%m-%d")
    )
}

/// Where part files go, before any client is built
#[derive(Debug, Clone, PartialEq, Eq)]
enum StoreLocation {
    S3 { bucket: String, prefix: String },
    R2 { bucket: String, prefix: String },
    Gcs { bucket: String, prefix: String },
    Azure { container: String, prefix: String },
    Local { root: String },
}

impl StoreLocation {
    fn parse(url: &str) -> Result<Self> {
        let location = if let Some(rest) = url.strip_prefix("s3://") {
            let (bucket, prefix) = split_bucket(rest);
            StoreLocation::S3 { bucket, prefix }
        } else if let Some(rest) = url.strip_prefix("r2://") {
            let (bucket, prefix) = split_bucket(rest);
            StoreLocation::R2 { bucket, prefix }
        } else if let Some(rest) = url.strip_prefix("gs://") {
            let (bucket, prefix) = split_bucket(rest);
            StoreLocation::Gcs { bucket, prefix }
        } else if let Some(rest) = url.strip_prefix("az://") {
            let (container, prefix) = split_bucket(rest);
            StoreLocation::Azure { container, prefix }
        } else {
            let root = url.strip_prefix("file://").unwrap_or(url);
            StoreLocation::Local {
                root: root.to_string(),
            }
        };

        match &location {
            StoreLocation::S3 { bucket, .. }
            | StoreLocation::R2 { bucket, .. }
            | StoreLocation::Gcs { bucket, .. }
            | StoreLocation::Azure {
                container: bucket, ..
            } if bucket.is_empty() => Err(Error::invalid_value(
                "destinations.path",
                format!("missing bucket in {url}"),
            )),
            StoreLocation::Local { root } if root.trim().is_empty() => {
                Err(Error::missing_field("destinations.path"))
            }
            _ => Ok(location),
        }
    }

    fn scheme(&self) -> &'static str {
        match self {
            StoreLocation::S3 { .. } => "s3",
            StoreLocation::R2 { .. } => "r2",
            StoreLocation::Gcs { .. } => "gs",
            StoreLocation::Azure { .. } => "az",
            StoreLocation::Local { .. } => "file",
        }
    }

    fn prefix(&self) -> &str {
        match self {
            StoreLocation::S3 { prefix, .. }
            | StoreLocation::R2 { prefix, .. }
            | StoreLocation::Gcs { prefix, .. }
            | StoreLocation::Azure { prefix, .. } => prefix,
            StoreLocation::Local { .. } => "",
        }
    }

    /// Build the client; credentials come from the environment
    fn open(&self) -> Result<Arc<dyn ObjectStore>> {
        let client_error =
            |e: object_store::Error| Error::config(format!("Failed to create {self} client: {e}"));

        let store: Arc<dyn ObjectStore> = match self {
            StoreLocation::S3 { bucket, .. } => Arc::new(
                AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .build()
                    .map_err(client_error)?,
            ),
            StoreLocation::R2 { bucket, .. } => {
                let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
                // https://<account_id>.r2.cloudflarestorage.com
                if let Ok(endpoint) = std::env::var("R2_ENDPOINT_URL") {
                    builder = builder.with_endpoint(endpoint);
                }
                Arc::new(builder.build().map_err(client_error)?)
            }
            StoreLocation::Gcs { bucket, .. } => Arc::new(
                GoogleCloudStorageBuilder::from_env()
                    .with_bucket_name(bucket)
                    .build()
                    .map_err(client_error)?,
            ),
            StoreLocation::Azure { container, .. } => Arc::new(
                MicrosoftAzureBuilder::from_env()
                    .with_container_name(container)
                    .build()
                    .map_err(client_error)?,
            ),
            StoreLocation::Local { root } => {
                std::fs::create_dir_all(root).map_err(|e| {
                    Error::config(format!("Failed to create directory {root}: {e}"))
                })?;
                Arc::new(LocalFileSystem::new_with_prefix(root).map_err(client_error)?)
            }
        };
        Ok(store)
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLocation::S3 { bucket, .. }
            | StoreLocation::R2 { bucket, .. }
            | StoreLocation::Gcs { bucket, .. }
            | StoreLocation::Azure {
                container: bucket, ..
            } => write!(f, "{}://{bucket}", self.scheme()),
            StoreLocation::Local { root } => write!(f, "file://{root}"),
        }
    }
}

/// Split `bucket/some/prefix` into bucket and prefix
fn split_bucket(without_scheme: &str) -> (String, String) {
    match without_scheme.split_once('/') {
        Some((bucket, prefix)) => (bucket.to_string(), prefix.trim_end_matches('/').to_string()),
        None => (without_scheme.to_string(), String::new()),
    }
}

/// Storage destination for part files
///
/// Accepts `s3://bucket/prefix`, `r2://bucket/prefix` (endpoint from
/// `R2_ENDPOINT_URL`), `gs://bucket/prefix`, `az://container/prefix`, or a
/// local directory (optionally `file://`), which is created if missing.
#[derive(Debug, Clone)]
pub struct CloudDestination {
    location: StoreLocation,
    store: Arc<dyn ObjectStore>,
}

impl CloudDestination {
    /// Parse a destination URL and create the matching object store
    pub fn parse(url: &str) -> Result<Self> {
        let location = StoreLocation::parse(url)?;
        let store = location.open()?;
        tracing::debug!("Opened destination {location}");
        Ok(Self { location, store })
    }

    /// Whether files leave the local machine
    pub fn is_cloud(&self) -> bool {
        !matches!(self.location, StoreLocation::Local { .. })
    }

    /// URL scheme: s3, r2, gs, az or file
    pub fn scheme(&self) -> &str {
        self.location.scheme()
    }

    /// Write one object, returning its full location
    pub async fn write(&self, filename: &str, data: Bytes) -> Result<String> {
        let prefix = self.location.prefix();
        let path = if prefix.is_empty() {
            ObjectPath::from(filename)
        } else {
            ObjectPath::from(format!("{prefix}/{filename}"))
        };

        self.store
            .put(&path, data.into())
            .await
            .map_err(|e| Error::output(format!("Failed to write {path} to {}: {e}", self.location)))?;

        Ok(format!("{}/{path}", self.location))
    }
}
