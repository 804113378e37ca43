//! Catalog population from Kubernetes watches
//!
//! TKRs and OSImages are cluster-scoped objects published by the bundle
//! fetcher. A watcher per kind replays them into the shared catalog:
//!
//! - `Apply` adds (last write wins)
//! - `Delete` removes
//! - a completed re-list (`Init` .. `InitDone`) prunes entries that were not
//!   re-listed, covering deletes missed while the watch was down
//!
//! The catalog is rebuilt from scratch on restart by the initial list. Each
//! watcher reports when its first list completes, so the webhook can hold off
//! serving until the catalog is populated, and the process exits if a
//! watcher ever stops.

use std::collections::HashSet;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::{self, FutureExt};
use futures::StreamExt;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::catalog::{Catalog, Record};
use crate::crd::{OSImage, TanzuKubernetesRelease};

/// Watch timeout in seconds; kept under the API server's 30s limit
const WATCH_TIMEOUT_SECS: u32 = 25;

/// A watched kind stored in the catalog
pub trait Cataloged:
    Resource<DynamicType = ()>
    + Into<Record>
    + Clone
    + DeserializeOwned
    + Debug
    + Send
    + Sync
    + 'static
{
    /// Kind name used in log fields
    const KIND: &'static str;

    /// Remove an object of this kind by name
    fn remove_from(catalog: &Catalog, name: &str) -> bool;

    /// Keep only the named objects of this kind
    fn retain_in(catalog: &Catalog, keep: &HashSet<String>) -> usize;
}

impl Cataloged for TanzuKubernetesRelease {
    const KIND: &'static str = "TanzuKubernetesRelease";

    fn remove_from(catalog: &Catalog, name: &str) -> bool {
        catalog.remove_tkr(name)
    }

    fn retain_in(catalog: &Catalog, keep: &HashSet<String>) -> usize {
        catalog.retain_tkrs(keep)
    }
}

impl Cataloged for OSImage {
    const KIND: &'static str = "OSImage";

    fn remove_from(catalog: &Catalog, name: &str) -> bool {
        catalog.remove_os_image(name)
    }

    fn retain_in(catalog: &Catalog, keep: &HashSet<String>) -> usize {
        catalog.retain_os_images(keep)
    }
}

/// Applies watch events of one kind to the catalog
pub struct CatalogSync<K> {
    catalog: Arc<Catalog>,
    /// Names seen during an in-progress re-list
    relisting: Option<HashSet<String>>,
    /// Fired once the first list completes
    ready: Option<oneshot::Sender<()>>,
    _kind: PhantomData<K>,
}

impl<K: Cataloged> CatalogSync<K> {
    /// Create a sync feeding the given catalog
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            relisting: None,
            ready: None,
            _kind: PhantomData,
        }
    }

    /// Signal `ready` when the first list has been applied
    pub fn with_ready(mut self, ready: oneshot::Sender<()>) -> Self {
        self.ready = Some(ready);
        self
    }

    /// Apply one watch event
    pub fn apply(&mut self, event: Event<K>) {
        match event {
            Event::Apply(obj) => {
                debug!(kind = K::KIND, name = %obj.name_any(), "Applying watched object");
                self.catalog.add(obj);
            }
            Event::Delete(obj) => {
                let name = obj.name_any();
                if K::remove_from(&self.catalog, &name) {
                    info!(kind = K::KIND, name = %name, "Removed deleted object from catalog");
                }
            }
            Event::Init => {
                debug!(kind = K::KIND, "Re-list started");
                self.relisting = Some(HashSet::new());
            }
            Event::InitApply(obj) => {
                if let Some(seen) = self.relisting.as_mut() {
                    seen.insert(obj.name_any());
                }
                self.catalog.add(obj);
            }
            Event::InitDone => {
                let seen = self.relisting.take().unwrap_or_default();
                let pruned = K::retain_in(&self.catalog, &seen);
                info!(kind = K::KIND, listed = seen.len(), pruned, "Re-list complete");
                if let Some(ready) = self.ready.take() {
                    let _ = ready.send(());
                }
            }
        }
    }
}

/// Watch one kind and feed it into the catalog until the stream ends
pub async fn run_watch<K: Cataloged>(
    client: Client,
    catalog: Arc<Catalog>,
    ready: oneshot::Sender<()>,
) {
    let api: Api<K> = Api::all(client);
    let config = watcher::Config::default().timeout(WATCH_TIMEOUT_SECS);
    let mut sync = CatalogSync::<K>::new(catalog).with_ready(ready);

    info!(kind = K::KIND, "Starting catalog watcher");
    let mut stream = watcher::watcher(api, config).default_backoff().boxed();
    while let Some(event) = stream.next().await {
        match event {
            Ok(event) => sync.apply(event),
            Err(e) => warn!(kind = K::KIND, error = %e, "Catalog watch error, retrying"),
        }
    }
    info!(kind = K::KIND, "Catalog watcher stopped");
}

/// Running catalog watcher tasks
#[derive(Default)]
pub struct CatalogWatchers {
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    ready: Vec<(&'static str, oneshot::Receiver<()>)>,
}

impl CatalogWatchers {
    /// Spawn a watcher task for `kind`, handing it the sender to fire once
    /// its first list is in the catalog
    pub fn spawn<F, Fut>(&mut self, kind: &'static str, task: F)
    where
        F: FnOnce(oneshot::Sender<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (ready_tx, ready_rx) = oneshot::channel();
        self.tasks.push((kind, tokio::spawn(task(ready_tx))));
        self.ready.push((kind, ready_rx));
    }

    /// Wait for every watcher's first list
    ///
    /// Fails with the kind of a watcher that stopped before listing.
    pub async fn wait_listed(&mut self) -> Result<(), &'static str> {
        for (kind, ready) in self.ready.drain(..) {
            if ready.await.is_err() {
                return Err(kind);
            }
            debug!(kind, "Initial list complete");
        }
        Ok(())
    }

    /// Wait until any watcher stops, returning its kind
    ///
    /// Watchers retry forever, so this only resolves when one panics or its
    /// stream ends. Never resolves if no watchers were spawned.
    pub async fn wait_stopped(self) -> &'static str {
        if self.tasks.is_empty() {
            return future::pending().await;
        }
        let tasks = self.tasks.into_iter().map(|(kind, handle)| {
            async move {
                if let Err(e) = handle.await {
                    error!(kind, error = %e, "Catalog watcher task failed");
                }
                kind
            }
            .boxed()
        });
        let (kind, _, _) = future::select_all(tasks).await;
        kind
    }
}

/// Spawn watchers for TKRs and OSImages
pub fn spawn_catalog_sync(client: Client, catalog: Arc<Catalog>) -> CatalogWatchers {
    let mut watchers = CatalogWatchers::default();
    {
        let client = client.clone();
        let catalog = Arc::clone(&catalog);
        watchers.spawn(TanzuKubernetesRelease::KIND, move |ready| {
            run_watch::<TanzuKubernetesRelease>(client, catalog, ready)
        });
    }
    watchers.spawn(OSImage::KIND, move |ready| {
        run_watch::<OSImage>(client, catalog, ready)
    });
    watchers
}
