//! Resolution recording
//!
//! The recorder is the single entry point used at admission time. It builds
//! the query, decides whether a cluster's existing resolution still holds,
//! and otherwise computes the two fields a fresh resolution writes:
//!
//! - the `run.tanzu.vmware.com/tkr` label (label-safe TKR version)
//! - `spec.topology.version` (the TKR's Kubernetes version)
//!
//! Mutations are computed as a [`ResolvedFields`] value first and applied in
//! one infallible step, so a failed resolution never leaves a cluster half
//! written.

use std::sync::Arc;

use kube::ResourceExt;
use tracing::{debug, info};

use crate::catalog::{Catalog, CatalogView, TkrRecord};
use crate::crd::{Cluster, ClusterClass};
use crate::query::{build_query, Query};
use crate::resolver::{resolve, resolve_os_images, Resolution};
use crate::version::{from_label_value, ChannelPolicy};
use crate::{Result, LABEL_TKR};

/// The fields written onto a cluster by a resolution
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedFields {
    /// Value of the `run.tanzu.vmware.com/tkr` label
    pub tkr_label: String,
    /// Value of `spec.topology.version`
    pub topology_version: String,
}

impl ResolvedFields {
    /// Fields recording a resolution
    pub fn from_resolution(resolution: &Resolution) -> Self {
        Self {
            tkr_label: resolution.tkr.tkr.label_value(),
            topology_version: resolution.tkr.tkr.spec.kubernetes.version.clone(),
        }
    }

    /// Write both fields onto a cluster
    ///
    /// Clusters without a topology only receive the label; the query builder
    /// rejects those before a resolution is ever computed.
    pub fn apply_to(&self, cluster: &mut Cluster) {
        cluster
            .labels_mut()
            .insert(LABEL_TKR.to_string(), self.tkr_label.clone());
        if let Some(topology) = cluster.spec.topology.as_mut() {
            topology.version = self.topology_version.clone();
        }
    }

    /// Returns true if the cluster already carries both values
    pub fn is_applied(&self, cluster: &Cluster) -> bool {
        cluster.tkr_label() == Some(self.tkr_label.as_str())
            && cluster
                .spec
                .topology
                .as_ref()
                .is_some_and(|t| t.version == self.topology_version)
    }
}

/// Resolves clusters against a shared catalog
#[derive(Clone, Debug)]
pub struct Recorder {
    catalog: Arc<Catalog>,
    policy: ChannelPolicy,
}

impl Recorder {
    /// Create a recorder over a shared catalog
    pub fn new(catalog: Arc<Catalog>, policy: ChannelPolicy) -> Self {
        Self { catalog, policy }
    }

    /// The shared catalog
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// The channel policy used for ranking
    pub fn policy(&self) -> &ChannelPolicy {
        &self.policy
    }

    /// Resolve a cluster and record the result on it
    ///
    /// Returns `Ok(())` both when fields were written and when the existing
    /// resolution was kept. On error the cluster is untouched.
    pub fn resolve_and_set_metadata(
        &self,
        cluster: &mut Cluster,
        class: &ClusterClass,
    ) -> Result<()> {
        if let Some(fields) = self.resolve_mutations(cluster, class)? {
            fields.apply_to(cluster);
        }
        Ok(())
    }

    /// Compute the fields to write, or `None` to keep the cluster unchanged
    pub fn resolve_mutations(
        &self,
        cluster: &Cluster,
        class: &ClusterClass,
    ) -> Result<Option<ResolvedFields>> {
        let name = cluster.name_any();
        let query = build_query(cluster, class)?;

        // One snapshot for the stability check and the fresh resolution
        let view = self.catalog.read();

        if let Some(existing) = self.existing_resolution(cluster, &query, &view) {
            debug!(
                cluster = %name,
                tkr = %existing.name(),
                "Existing resolution still satisfies the query, keeping it"
            );
            return Ok(None);
        }

        let resolution = resolve(&query, &view, &self.policy)?;
        drop(view);

        let fields = ResolvedFields::from_resolution(&resolution);
        if fields.is_applied(cluster) {
            return Ok(None);
        }

        info!(
            cluster = %name,
            namespace = ?cluster.namespace(),
            tkr = %resolution.tkr_name(),
            topology_version = %fields.topology_version,
            os_images = ?resolution.os_images.keys().collect::<Vec<_>>(),
            "Resolved TKR for cluster"
        );
        Ok(Some(fields))
    }

    /// The cluster's recorded TKR if it still satisfies the query
    ///
    /// Channel policy and TKR lifecycle labels are deliberately not checked:
    /// they gate fresh picks only and never evict an existing resolution.
    fn existing_resolution(
        &self,
        cluster: &Cluster,
        query: &Query,
        view: &CatalogView<'_>,
    ) -> Option<TkrRecord> {
        let label = cluster.tkr_label()?;
        let Some(record) = view
            .tkr(label)
            .or_else(|| view.tkr_by_version(&from_label_value(label)))
        else {
            debug!(cluster = %cluster.name_any(), label = %label, "Recorded TKR not in catalog");
            return None;
        };

        if !query.version.matches(&record.version) {
            debug!(
                cluster = %cluster.name_any(),
                tkr = %record.name(),
                constraint = %query.version,
                "Recorded TKR no longer satisfies the requested version"
            );
            return None;
        }
        if !query.label_requirements.matches(record.tkr.labels()) {
            debug!(
                cluster = %cluster.name_any(),
                tkr = %record.name(),
                "Recorded TKR no longer satisfies the label requirements"
            );
            return None;
        }
        if let Err(e) = resolve_os_images(&record, &query.templates, view, &self.policy) {
            debug!(
                cluster = %cluster.name_any(),
                tkr = %record.name(),
                error = %e,
                "Recorded TKR no longer resolves OSImages"
            );
            return None;
        }
        Some(record)
    }
}
