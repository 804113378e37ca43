//! Bundle fetcher interfaces
//!
//! The fetcher discovers TKR package bundles in an image registry and admits
//! only the versions a compatibility source vouches for. It talks to the
//! resolver exclusively through the catalog population path; this module
//! defines its collaborators and the tag selection it performs before any
//! bundle is downloaded.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::version::from_image_tag;

/// Error type for fetcher collaborators
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The compatibility source could not be read
    #[error("failed to read compatible versions: {0}")]
    Compatibility(String),

    /// The image registry returned an error
    #[error("registry error for '{image}': {message}")]
    Registry {
        /// Image (with or without tag) being accessed
        image: String,
        /// Registry error message
        message: String,
    },
}

/// Source of the TKR versions this management cluster supports
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Compatibility: Send + Sync {
    /// Full TKR version strings currently considered compatible
    async fn compatible_versions(&self) -> Result<HashSet<String>, FetchError>;
}

/// Read access to an OCI image registry
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Registry: Send + Sync {
    /// List the tags of an image
    async fn list_image_tags(&self, image: &str) -> Result<Vec<String>, FetchError>;

    /// Fetch one file from an image (`image:tag`)
    async fn get_file(&self, image_with_tag: &str, file: &str) -> Result<Vec<u8>, FetchError>;
}

/// Selects the bundle images worth pulling
pub struct Fetcher {
    registry: Arc<dyn Registry>,
    compatibility: Arc<dyn Compatibility>,
    image_name: String,
}

impl Fetcher {
    /// Create a fetcher for the TKR bundle image `image_name`
    pub fn new(
        registry: Arc<dyn Registry>,
        compatibility: Arc<dyn Compatibility>,
        image_name: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            compatibility,
            image_name: image_name.into(),
        }
    }

    /// Bundle image name
    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    /// Tags of the bundle image whose version is compatible
    ///
    /// Image tags encode the version with `_` in place of `+`.
    pub async fn image_tags_to_pull(&self) -> Result<BTreeSet<String>, FetchError> {
        let compatible = self.compatibility.compatible_versions().await?;
        let tags = self.registry.list_image_tags(&self.image_name).await?;
        let listed = tags.len();

        let to_pull: BTreeSet<String> = tags
            .into_iter()
            .filter(|tag| {
                let keep = compatible.contains(&from_image_tag(tag));
                if !keep {
                    debug!(
                        image = %self.image_name,
                        tag = %tag,
                        "Skipping incompatible bundle tag"
                    );
                }
                keep
            })
            .collect();

        info!(
            image = %self.image_name,
            listed,
            compatible = compatible.len(),
            to_pull = to_pull.len(),
            "Selected bundle tags to pull"
        );
        Ok(to_pull)
    }

    /// Fetch a file from the bundle image at `tag`
    pub async fn bundle_file(&self, tag: &str, file: &str) -> Result<Vec<u8>, FetchError> {
        let image_with_tag = format!("{}:{}", self.image_name, tag);
        self.registry.get_file(&image_with_tag, file).await
    }
}
