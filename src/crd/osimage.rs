//! OSImage Custom Resource Definition
//!
//! An OSImage describes a bootable machine image for one OS, architecture
//! and infrastructure provider. The provider-specific image reference is
//! carried as an opaque payload and never interpreted here.

use std::fmt;

use kube::CustomResource;
use schemars::gen::SchemaGenerator;
use schemars::schema::{Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for an OSImage
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "run.tanzu.vmware.com",
    version = "v1alpha3",
    kind = "OSImage",
    plural = "osimages",
    printcolumn = r#"{"name":"K8s","type":"string","jsonPath":".spec.kubernetesVersion"}"#,
    printcolumn = r#"{"name":"OS","type":"string","jsonPath":".spec.os.name"}"#,
    printcolumn = r#"{"name":"Arch","type":"string","jsonPath":".spec.os.arch"}"#,
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.image.type"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OSImageSpec {
    /// Kubernetes version the image is built for
    pub kubernetes_version: String,

    /// Operating system of the image
    pub os: OsInfo,

    /// Provider-specific image reference
    pub image: MachineImageInfo,
}

/// Operating system description
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct OsInfo {
    /// OS family (`linux`, `windows`)
    #[serde(rename = "type", default)]
    pub type_: String,

    /// OS name (`ubuntu`, `photon`)
    pub name: String,

    /// OS version (`20.04`, `3`)
    pub version: String,

    /// CPU architecture (`amd64`, `arm64`)
    pub arch: String,
}

/// Provider-specific machine image reference
///
/// `type_` names the infrastructure provider; `ref_` is the provider payload
/// (AMI id and region, OVA path, ...). Equality and cloning are structural
/// over the payload.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct MachineImageInfo {
    /// Infrastructure provider identifier (`aws`, `vsphere`, `azure`, `docker`)
    #[serde(rename = "type")]
    pub type_: String,

    /// Opaque provider payload, usually an object but never inspected
    #[serde(rename = "ref", default, skip_serializing_if = "serde_json::Value::is_null")]
    #[schemars(schema_with = "opaque_value")]
    pub ref_: serde_json::Value,
}

impl MachineImageInfo {
    /// Create an image reference for a provider
    pub fn new(type_: impl Into<String>, ref_: serde_json::Value) -> Self {
        Self {
            type_: type_.into(),
            ref_,
        }
    }
}

fn opaque_value(_: &mut SchemaGenerator) -> Schema {
    let mut schema = SchemaObject::default();
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    Schema::Object(schema)
}

/// The OS attribute tuple OSImages are indexed and matched by
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OsAttributes {
    /// OS name
    pub name: String,
    /// OS version
    pub version: String,
    /// CPU architecture
    pub arch: String,
    /// Infrastructure provider
    pub provider: String,
}

impl OSImage {
    /// OS attribute tuple of this image
    pub fn attributes(&self) -> OsAttributes {
        OsAttributes {
            name: self.spec.os.name.clone(),
            version: self.spec.os.version.clone(),
            arch: self.spec.os.arch.clone(),
            provider: self.spec.image.type_.clone(),
        }
    }
}

/// OS requirements where an unset field matches anything
///
/// Used both by TKRs to select compatible images and by machine templates
/// to state which image they need.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct OsSelector {
    /// Required OS name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Required OS version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Required CPU architecture
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,

    /// Required infrastructure provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl OsSelector {
    /// Returns true if every set field equals the corresponding attribute
    pub fn matches(&self, attrs: &OsAttributes) -> bool {
        field_matches(&self.name, &attrs.name)
            && field_matches(&self.version, &attrs.version)
            && field_matches(&self.arch, &attrs.arch)
            && field_matches(&self.provider, &attrs.provider)
    }

    /// Returns true if every field is set (exact index lookup possible)
    pub fn is_exact(&self) -> bool {
        self.name.is_some()
            && self.version.is_some()
            && self.arch.is_some()
            && self.provider.is_some()
    }

    /// Overlay another selector's set fields onto this one
    pub fn overlay(&self, other: &OsSelector) -> OsSelector {
        OsSelector {
            name: other.name.clone().or_else(|| self.name.clone()),
            version: other.version.clone().or_else(|| self.version.clone()),
            arch: other.arch.clone().or_else(|| self.arch.clone()),
            provider: other.provider.clone().or_else(|| self.provider.clone()),
        }
    }
}

fn field_matches(want: &Option<String>, have: &str) -> bool {
    want.as_deref().is_none_or(|w| w == have)
}

impl fmt::Display for OsSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let any = |v: &Option<String>| v.clone().unwrap_or_else(|| "any".to_string());
        write!(
            f,
            "os={}/{} arch={} provider={}",
            any(&self.name),
            any(&self.version),
            any(&self.arch),
            any(&self.provider)
        )
    }
}
