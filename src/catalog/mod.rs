//! In-memory catalog of TKRs and OSImages
//!
//! The catalog is shared between the population path (watch events) and the
//! admission path (resolution). All state sits behind one reader/writer lock:
//! every mutation takes the write lock once and updates the authoritative
//! name maps together with the secondary indices, so readers never observe a
//! half-applied change.
//!
//! Resolution reads through a [`CatalogView`], which holds the read lock for
//! its lifetime and therefore sees one consistent snapshot.

mod index;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use kube::ResourceExt;
use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, warn};

use crate::crd::{OSImage, OsAttributes, OsSelector, TanzuKubernetesRelease};
use crate::version::{ChannelPolicy, Version, VersionPrefix};

use index::NameIndex;

/// A record accepted by [`Catalog::add`]
#[derive(Clone, Debug)]
pub enum Record {
    /// A TanzuKubernetesRelease
    Tkr(TanzuKubernetesRelease),
    /// An OSImage
    OsImage(OSImage),
}

impl From<TanzuKubernetesRelease> for Record {
    fn from(tkr: TanzuKubernetesRelease) -> Self {
        Self::Tkr(tkr)
    }
}

impl From<OSImage> for Record {
    fn from(os_image: OSImage) -> Self {
        Self::OsImage(os_image)
    }
}

/// A TKR whose version parsed, as handed out to readers
#[derive(Clone, Debug)]
pub struct TkrRecord {
    /// The release object
    pub tkr: Arc<TanzuKubernetesRelease>,
    /// Its parsed version
    pub version: Version,
}

impl TkrRecord {
    /// Catalog name of the release
    pub fn name(&self) -> String {
        self.tkr.name_any()
    }
}

#[derive(Debug)]
struct StoredTkr {
    tkr: Arc<TanzuKubernetesRelease>,
    version: Option<Version>,
}

#[derive(Debug, Default)]
struct CatalogState {
    tkrs: HashMap<String, StoredTkr>,
    os_images: HashMap<String, Arc<OSImage>>,
    /// Core version prefix (`v1`, `v1.22`, `v1.22.11`) -> TKR names
    by_version: NameIndex<String>,
    /// OS attribute tuple -> OSImage names
    by_os: NameIndex<OsAttributes>,
    /// OSImage name -> TKRs naming it in `osImages`
    os_image_refs: NameIndex<String>,
}

impl CatalogState {
    fn insert_tkr(&mut self, tkr: TanzuKubernetesRelease) {
        let name = tkr.name_any();
        self.remove_tkr(&name);

        let version = match tkr.checked_version() {
            Ok(version) => {
                for key in version.core_prefix_keys() {
                    self.by_version.insert(key, &name);
                }
                Some(version)
            }
            Err(e) => {
                warn!(
                    tkr = %name,
                    error = %e,
                    "TKR has a malformed version, it will not be resolvable"
                );
                None
            }
        };
        for os_image in &tkr.spec.os_images {
            self.os_image_refs.insert(os_image.name.clone(), &name);
        }

        debug!(tkr = %name, version = %tkr.spec.version, "Added TKR to catalog");
        self.tkrs.insert(
            name,
            StoredTkr {
                tkr: Arc::new(tkr),
                version,
            },
        );
    }

    fn remove_tkr(&mut self, name: &str) -> bool {
        let Some(stored) = self.tkrs.remove(name) else {
            return false;
        };
        if let Some(version) = &stored.version {
            for key in version.core_prefix_keys() {
                self.by_version.remove(&key, name);
            }
        }
        for os_image in &stored.tkr.spec.os_images {
            self.os_image_refs.remove(&os_image.name, name);
        }
        true
    }

    fn insert_os_image(&mut self, os_image: OSImage) {
        let name = os_image.name_any();
        self.remove_os_image(&name);

        self.by_os.insert(os_image.attributes(), &name);
        debug!(
            os_image = %name,
            kubernetes = %os_image.spec.kubernetes_version,
            "Added OSImage to catalog"
        );
        self.os_images.insert(name, Arc::new(os_image));
    }

    fn remove_os_image(&mut self, name: &str) -> bool {
        let Some(os_image) = self.os_images.remove(name) else {
            return false;
        };
        self.by_os.remove(&os_image.attributes(), name);
        true
    }

    fn record(&self, name: &str) -> Option<TkrRecord> {
        let stored = self.tkrs.get(name)?;
        Some(TkrRecord {
            tkr: Arc::clone(&stored.tkr),
            version: stored.version.clone()?,
        })
    }
}

/// Concurrency-safe TKR and OSImage store
///
/// Construct once and share through an `Arc` between the population path and
/// the resolution path.
#[derive(Debug, Default)]
pub struct Catalog {
    state: RwLock<CatalogState>,
}

impl Catalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a record (last write wins)
    pub fn add(&self, record: impl Into<Record>) {
        let mut state = self.state.write();
        match record.into() {
            Record::Tkr(tkr) => state.insert_tkr(tkr),
            Record::OsImage(os_image) => state.insert_os_image(os_image),
        }
    }

    /// Add many records under a single write lock
    pub fn extend<R: Into<Record>>(&self, records: impl IntoIterator<Item = R>) {
        let mut state = self.state.write();
        for record in records {
            match record.into() {
                Record::Tkr(tkr) => state.insert_tkr(tkr),
                Record::OsImage(os_image) => state.insert_os_image(os_image),
            }
        }
    }

    /// Remove a TKR by name; returns true if it was present
    pub fn remove_tkr(&self, name: &str) -> bool {
        let removed = self.state.write().remove_tkr(name);
        if removed {
            debug!(tkr = %name, "Removed TKR from catalog");
        }
        removed
    }

    /// Remove an OSImage by name; returns true if it was present
    pub fn remove_os_image(&self, name: &str) -> bool {
        let removed = self.state.write().remove_os_image(name);
        if removed {
            debug!(os_image = %name, "Removed OSImage from catalog");
        }
        removed
    }

    /// Drop every TKR not named in `keep`; returns the number removed
    pub fn retain_tkrs(&self, keep: &HashSet<String>) -> usize {
        let mut state = self.state.write();
        let stale: Vec<String> = state
            .tkrs
            .keys()
            .filter(|name| !keep.contains(*name))
            .cloned()
            .collect();
        for name in &stale {
            state.remove_tkr(name);
        }
        stale.len()
    }

    /// Drop every OSImage not named in `keep`; returns the number removed
    pub fn retain_os_images(&self, keep: &HashSet<String>) -> usize {
        let mut state = self.state.write();
        let stale: Vec<String> = state
            .os_images
            .keys()
            .filter(|name| !keep.contains(*name))
            .cloned()
            .collect();
        for name in &stale {
            state.remove_os_image(name);
        }
        stale.len()
    }

    /// Take a consistent read snapshot
    ///
    /// Writers wait until the view is dropped, so keep it short-lived and
    /// never hold it across an `.await`.
    pub fn read(&self) -> CatalogView<'_> {
        CatalogView {
            state: self.state.read(),
        }
    }

    /// TKRs whose version satisfies the constraint
    pub fn tkrs_satisfying(&self, constraint: &VersionPrefix) -> Vec<TkrRecord> {
        self.read().tkrs_satisfying(constraint)
    }

    /// OSImages matching the OS requirements
    pub fn os_images_matching(&self, selector: &OsSelector) -> Vec<Arc<OSImage>> {
        self.read().os_images_matching(selector)
    }

    /// Number of TKRs (including ones with malformed versions)
    pub fn tkr_count(&self) -> usize {
        self.state.read().tkrs.len()
    }

    /// Number of OSImages
    pub fn os_image_count(&self) -> usize {
        self.state.read().os_images.len()
    }
}

/// Read snapshot of the catalog
pub struct CatalogView<'a> {
    state: RwLockReadGuard<'a, CatalogState>,
}

impl CatalogView<'_> {
    /// TKR by name, if present and its version parses
    pub fn tkr(&self, name: &str) -> Option<TkrRecord> {
        self.state.record(name)
    }

    /// TKR whose version equals `version`
    pub fn tkr_by_version(&self, version: &str) -> Option<TkrRecord> {
        let wanted = Version::parse(version).ok()?;
        let [.., patch_key] = wanted.core_prefix_keys();
        self.state
            .by_version
            .get(&patch_key)
            .filter_map(|name| self.state.record(name))
            .find(|record| record.version == wanted)
    }

    /// TKRs whose version satisfies the constraint, in name order
    pub fn tkrs_satisfying(&self, constraint: &VersionPrefix) -> Vec<TkrRecord> {
        self.state
            .by_version
            .get(&constraint.core_key())
            .filter_map(|name| self.state.record(name))
            .filter(|record| constraint.matches(&record.version))
            .collect()
    }

    /// Closest catalog versions to a request, newest first
    ///
    /// Looks in the request's MAJOR.MINOR line first, then MAJOR, then the
    /// whole catalog.
    pub fn nearest_versions(
        &self,
        constraint: &VersionPrefix,
        policy: &ChannelPolicy,
        limit: usize,
    ) -> Vec<String> {
        let core = constraint.core();
        let mut keys = Vec::new();
        if core.len() >= 2 {
            keys.push(format!("v{}.{}", core[0], core[1]));
        }
        if let Some(major) = core.first() {
            keys.push(format!("v{major}"));
        }

        let mut candidates: Vec<TkrRecord> = keys
            .iter()
            .map(|key| {
                self.state
                    .by_version
                    .get(key)
                    .filter_map(|name| self.state.record(name))
                    .collect::<Vec<_>>()
            })
            .find(|records| !records.is_empty())
            .unwrap_or_else(|| {
                self.state
                    .tkrs
                    .keys()
                    .filter_map(|name| self.state.record(name))
                    .collect()
            });

        candidates.sort_by(|a, b| {
            policy
                .compare(&b.version, &a.version)
                .then_with(|| a.name().cmp(&b.name()))
        });
        candidates
            .into_iter()
            .take(limit)
            .map(|record| record.tkr.spec.version.clone())
            .collect()
    }

    /// OSImage by name
    pub fn os_image(&self, name: &str) -> Option<Arc<OSImage>> {
        self.state.os_images.get(name).cloned()
    }

    /// OSImages matching the OS requirements, in name order
    ///
    /// Fully specified requirements are a single index lookup; wildcard
    /// fields scan the index keys, not the records.
    pub fn os_images_matching(&self, selector: &OsSelector) -> Vec<Arc<OSImage>> {
        let mut names: Vec<&str> = if selector.is_exact() {
            let key = OsAttributes {
                name: selector.name.clone().unwrap_or_default(),
                version: selector.version.clone().unwrap_or_default(),
                arch: selector.arch.clone().unwrap_or_default(),
                provider: selector.provider.clone().unwrap_or_default(),
            };
            self.state.by_os.get(&key).collect()
        } else {
            self.state
                .by_os
                .iter()
                .filter(|(attrs, _)| selector.matches(attrs))
                .flat_map(|(_, names)| names.iter().map(String::as_str))
                .collect()
        };
        names.sort_unstable();
        names
            .into_iter()
            .filter_map(|name| self.state.os_images.get(name).cloned())
            .collect()
    }

    /// TKRs naming the OSImage in their `osImages` list
    pub fn tkrs_referencing(&self, os_image: &str) -> Vec<TkrRecord> {
        self.state
            .os_image_refs
            .get(&os_image.to_string())
            .filter_map(|name| self.state.record(name))
            .collect()
    }

    /// Number of TKRs (including ones with malformed versions)
    pub fn tkr_count(&self) -> usize {
        self.state.tkrs.len()
    }

    /// Number of OSImages
    pub fn os_image_count(&self) -> usize {
        self.state.os_images.len()
    }
}
