//! TKR resolver - picks a TanzuKubernetesRelease and OSImages for CAPI clusters
//!
//! At cluster create/update time a mutating admission webhook resolves which
//! TKR (and which machine images) a cluster should run, and stamps the
//! decision onto the cluster so provisioning is deterministic.
//!
//! # Architecture
//!
//! ```text
//! watch events ──► Catalog ◄── (read snapshot) ── Matcher ◄── Query ◄── Cluster + ClusterClass
//!                                                   │
//!                                                   ▼
//!                                      Recorder ──► label + topology version
//! ```
//!
//! # Modules
//!
//! - [`version`] - Vendor-flavoured version parsing, ordering and constraints
//! - [`crd`] - TKR, OSImage, and the Cluster API objects the resolver touches
//! - [`catalog`] - Concurrency-safe in-memory store of TKRs and OSImages
//! - [`query`] - Resolution query derived from a cluster and its ClusterClass
//! - [`resolver`] - Matching and ranking of TKRs and OSImages
//! - [`recorder`] - Stability rule and the mutations written onto clusters
//! - [`webhook`] - Admission webhook adapter (axum)
//! - [`sync`] - Catalog population from Kubernetes watches
//! - [`fetcher`] - Interfaces of the bundle fetcher feeding the catalog
//! - [`telemetry`] - Logging initialization
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod catalog;
pub mod crd;
pub mod error;
pub mod fetcher;
pub mod query;
pub mod recorder;
pub mod resolver;
pub mod sync;
pub mod telemetry;
pub mod version;
pub mod webhook;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Labels and annotations
// =============================================================================

/// Label on a Cluster naming the resolved TKR (label-safe version)
pub const LABEL_TKR: &str = "run.tanzu.vmware.com/tkr";

/// Label marking a TKR as deprecated
pub const LABEL_DEPRECATED: &str = "run.tanzu.vmware.com/deprecated";

/// Label marking a TKR as invalid; invalid TKRs are never picked
pub const LABEL_INVALID: &str = "run.tanzu.vmware.com/invalid";

/// Label marking a TKR as incompatible with this management cluster
pub const LABEL_INCOMPATIBLE: &str = "run.tanzu.vmware.com/incompatible";

/// Cluster annotation carrying explicit TKR label requirements
pub const ANNOTATION_RESOLVE_TKR: &str = "run.tanzu.vmware.com/resolve-tkr";

/// Default listen address of the webhook server
pub const DEFAULT_WEBHOOK_ADDR: &str = "0.0.0.0:9443";
