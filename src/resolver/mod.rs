//! TKR and OSImage matching
//!
//! Picks the best TKR for a query and one OSImage per machine template.
//! The whole decision is made against a single [`CatalogView`], so a
//! resolution never mixes two catalog states.
//!
//! Selection order:
//! 1. TKRs satisfying the version request, carrying the required labels and
//!    not marked invalid or incompatible
//! 2. Pre-release channels only when the request names the channel exactly
//! 3. Highest version under the [`ChannelPolicy`]; equal versions by name
//! 4. Per template, compatible OSImages matching the OS requirements; ties go
//!    to the image referenced by the newest TKR, then to the first name

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use kube::ResourceExt;
use tracing::debug;

use crate::catalog::{CatalogView, TkrRecord};
use crate::crd::OSImage;
use crate::query::{Query, TemplateQuery};
use crate::version::{ChannelPolicy, Version};
use crate::{Error, Result};

/// Number of catalog versions listed when nothing matches
pub const NEAREST_VERSIONS_LIMIT: usize = 3;

/// A chosen TKR with one OSImage per machine template
#[derive(Clone, Debug)]
pub struct Resolution {
    /// The chosen release
    pub tkr: TkrRecord,
    /// Machine template name -> chosen OSImage
    pub os_images: BTreeMap<String, Arc<OSImage>>,
}

impl Resolution {
    /// Name of the chosen TKR
    pub fn tkr_name(&self) -> String {
        self.tkr.name()
    }

    /// Name of the OSImage chosen for a template
    pub fn os_image_name(&self, template: &str) -> Option<String> {
        self.os_images.get(template).map(|image| image.name_any())
    }
}

/// Resolve a query against a catalog snapshot
pub fn resolve(
    query: &Query,
    view: &CatalogView<'_>,
    policy: &ChannelPolicy,
) -> Result<Resolution> {
    let tkr = best_tkr(query, view, policy)?;
    let os_images = resolve_os_images(&tkr, &query.templates, view, policy)?;
    Ok(Resolution { tkr, os_images })
}

/// Pick the best eligible TKR, or fail with `NoCompatibleTkr`
pub fn best_tkr(
    query: &Query,
    view: &CatalogView<'_>,
    policy: &ChannelPolicy,
) -> Result<TkrRecord> {
    let allow_prerelease = query.version.is_exact_prerelease(policy);

    let best = view
        .tkrs_satisfying(&query.version)
        .into_iter()
        .filter(|record| is_eligible(record, query, policy, allow_prerelease))
        .max_by(|a, b| rank(a, b, policy));

    match best {
        Some(record) => {
            debug!(tkr = %record.name(), constraint = %query.version, "Selected TKR");
            Ok(record)
        }
        None => Err(Error::NoCompatibleTkr {
            constraint: query.version.to_string(),
            nearest: view.nearest_versions(&query.version, policy, NEAREST_VERSIONS_LIMIT),
        }),
    }
}

fn is_eligible(
    record: &TkrRecord,
    query: &Query,
    policy: &ChannelPolicy,
    allow_prerelease: bool,
) -> bool {
    let name = record.name();
    if !record.tkr.is_resolvable() {
        debug!(tkr = %name, "Skipping TKR marked invalid or incompatible");
        return false;
    }
    if !query.label_requirements.matches(record.tkr.labels()) {
        debug!(
            tkr = %name,
            requirements = %query.label_requirements,
            "Skipping TKR not matching label requirements"
        );
        return false;
    }
    if !allow_prerelease && policy.is_prerelease(record.version.channel()) {
        debug!(tkr = %name, "Skipping pre-release TKR for implicit request");
        return false;
    }
    true
}

/// Version order, then reverse name order so `max_by` prefers the first name
fn rank(a: &TkrRecord, b: &TkrRecord, policy: &ChannelPolicy) -> Ordering {
    policy
        .compare(&a.version, &b.version)
        .then_with(|| b.name().cmp(&a.name()))
}

/// Pick one OSImage per template for a TKR
///
/// Fails with `NoCompatibleOsImage` on the first template nothing satisfies;
/// no partial result is returned.
pub fn resolve_os_images(
    tkr: &TkrRecord,
    templates: &[TemplateQuery],
    view: &CatalogView<'_>,
    policy: &ChannelPolicy,
) -> Result<BTreeMap<String, Arc<OSImage>>> {
    let mut chosen = BTreeMap::new();
    for template in templates {
        let image = best_os_image(tkr, template, view, policy).ok_or_else(|| {
            Error::NoCompatibleOsImage {
                tkr: tkr.name(),
                template: template.name.clone(),
                requirements: template.os.to_string(),
            }
        })?;
        debug!(
            tkr = %tkr.name(),
            template = %template.name,
            os_image = %image.name_any(),
            "Selected OSImage"
        );
        chosen.insert(template.name.clone(), image);
    }
    Ok(chosen)
}

fn best_os_image(
    tkr: &TkrRecord,
    template: &TemplateQuery,
    view: &CatalogView<'_>,
    policy: &ChannelPolicy,
) -> Option<Arc<OSImage>> {
    let mut best: Option<(Version, Arc<OSImage>)> = None;

    // Candidates arrive in name order, so keeping the incumbent on a tie
    // picks the first name.
    for image in view.os_images_matching(&template.os) {
        if !tkr.tkr.is_compatible_with(&image) {
            continue;
        }
        let newest = newest_reference(&image, tkr, view, policy);
        let replace = match &best {
            Some((incumbent, _)) => policy.compare(&newest, incumbent) == Ordering::Greater,
            None => true,
        };
        if replace {
            best = Some((newest, image));
        }
    }
    best.map(|(_, image)| image)
}

/// Newest TKR naming the image; selector-only images count as the chosen TKR
fn newest_reference(
    image: &OSImage,
    chosen: &TkrRecord,
    view: &CatalogView<'_>,
    policy: &ChannelPolicy,
) -> Version {
    view.tkrs_referencing(&image.name_any())
        .into_iter()
        .map(|record| record.version)
        .max_by(|a, b| policy.compare(a, b))
        .unwrap_or_else(|| chosen.version.clone())
}
