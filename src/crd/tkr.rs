//! TanzuKubernetesRelease Custom Resource Definition
//!
//! A TKR is a published, versioned bundle describing a supported Kubernetes
//! release. The resolver only reads the version strings and the OSImage
//! compatibility references.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::osimage::{OSImage, OsSelector};
use crate::version::{self, Version, VersionPrefix};
use crate::{Error, Result, LABEL_INCOMPATIBLE, LABEL_INVALID};

/// Specification for a TanzuKubernetesRelease
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "run.tanzu.vmware.com",
    version = "v1alpha3",
    kind = "TanzuKubernetesRelease",
    plural = "tanzukubernetesreleases",
    shortname = "tkr",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Kubernetes","type":"string","jsonPath":".spec.kubernetes.version"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TanzuKubernetesReleaseSpec {
    /// Full release version, e.g. `v1.22.8+vmware.1-tkg.2-zshippable`
    pub version: String,

    /// Kubernetes distribution shipped by this release
    pub kubernetes: KubernetesSpec,

    /// OSImages this release ships, by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub os_images: Vec<OsImageRef>,

    /// OSImages this release accepts by OS attributes
    ///
    /// Selector matches additionally require the OSImage to be built for the
    /// same Kubernetes version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_image_selector: Option<OsSelector>,
}

/// Kubernetes version information of a TKR
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesSpec {
    /// Kubernetes version, e.g. `v1.22.8+vmware.1`
    pub version: String,

    /// Image repository for Kubernetes component images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_repository: Option<String>,
}

/// Reference to an OSImage by name
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct OsImageRef {
    /// OSImage name
    pub name: String,
}

impl OsImageRef {
    /// Create a reference to the named OSImage
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl TanzuKubernetesRelease {
    /// Parse the release version
    pub fn parsed_version(&self) -> Result<Version> {
        Version::parse(&self.spec.version)
    }

    /// Parse the release version, requiring it to be recordable on clusters
    ///
    /// The label form of the version must be a legal label value, and the
    /// Kubernetes version is written into `spec.topology.version` of
    /// resolved clusters, so it must be a full version the release version
    /// satisfies (`v1.22.8+vmware.1` for `v1.22.8+vmware.1-tkg.2`).
    pub fn checked_version(&self) -> Result<Version> {
        let version = self.parsed_version()?;
        if !version::is_label_value(&self.label_value()) {
            return Err(Error::malformed_version(
                self.spec.version.as_str(),
                "label form is not a legal label value",
            ));
        }
        let kubernetes = &self.spec.kubernetes.version;
        Version::parse(kubernetes)?;
        if !VersionPrefix::parse(kubernetes)?.matches(&version) {
            return Err(Error::malformed_version(
                kubernetes.as_str(),
                format!(
                    "kubernetes version does not match release version '{}'",
                    self.spec.version
                ),
            ));
        }
        Ok(version)
    }

    /// Label value recorded on clusters resolved to this release
    pub fn label_value(&self) -> String {
        version::to_label_value(&self.spec.version)
    }

    /// Returns true if the TKR carries the given label (any value)
    pub fn has_label(&self, key: &str) -> bool {
        self.labels().contains_key(key)
    }

    /// Returns true unless the TKR is marked invalid or incompatible
    pub fn is_resolvable(&self) -> bool {
        !self.has_label(LABEL_INVALID) && !self.has_label(LABEL_INCOMPATIBLE)
    }

    /// Returns true if the TKR names the OSImage explicitly
    pub fn names_os_image(&self, name: &str) -> bool {
        self.spec.os_images.iter().any(|r| r.name == name)
    }

    /// Returns true if the OSImage is compatible with this release
    pub fn is_compatible_with(&self, os_image: &OSImage) -> bool {
        if self.names_os_image(&os_image.name_any()) {
            return true;
        }
        match &self.spec.os_image_selector {
            Some(selector) => {
                os_image.spec.kubernetes_version == self.spec.kubernetes.version
                    && selector.matches(&os_image.attributes())
            }
            None => false,
        }
    }
}
