//! Stories about guarantees that hold across resolution calls

use std::cmp::Ordering;
use std::sync::Arc;
use std::thread;

use tkr_resolver::version::{compare, from_label_value, satisfies, to_label_value};

use super::fixtures::*;

/// Versions in strictly ascending order under the default policy
const ASCENDING: &[&str] = &[
    "v1.21.2+vmware.1-tkg.1",
    "v1.22.8+vmware.1-tkg.2-fc.1",
    "v1.22.8+vmware.1-tkg.2-fc.2",
    "v1.22.8+vmware.1-tkg.2-rc.1",
    "v1.22.8+vmware.1-tkg.2-zshippable",
    "v1.22.8+vmware.1-tkg.2",
    "v1.22.8+vmware.1-tkg.3",
    "v1.22.8+vmware.2-tkg.1",
    "v1.22.11+vmware.2-tkg.2-rc.1",
    "v1.23.1+vmware.1-tkg.1",
];

// =============================================================================
// Ordering
// =============================================================================

/// Story: every pair of published versions compares consistently, so
/// "newest" is always well defined
#[test]
fn story_compare_is_a_strict_total_order() {
    for (i, a) in ASCENDING.iter().enumerate() {
        assert_eq!(compare(a, a).unwrap(), Ordering::Equal, "{a} == {a}");
        for (j, b) in ASCENDING.iter().enumerate() {
            let expected = i.cmp(&j);
            assert_eq!(compare(a, b).unwrap(), expected, "{a} vs {b}");
            assert_eq!(compare(b, a).unwrap(), expected.reverse(), "{b} vs {a}");
        }
    }
}

#[test]
fn test_channel_rank_for_equal_core() {
    let fc = "v1.22.8+vmware.1-tkg.2-fc.1";
    let rc = "v1.22.8+vmware.1-tkg.2-rc.1";
    let shippable = "v1.22.8+vmware.1-tkg.2-zshippable";
    assert_eq!(compare(fc, rc).unwrap(), Ordering::Less);
    assert_eq!(compare(rc, shippable).unwrap(), Ordering::Less);
}

#[test]
fn test_malformed_versions_are_errors() {
    assert!(compare("v1.22", "v1.22.8").is_err());
    assert!(compare("not-a-version", "v1.22.8").is_err());
    assert!(satisfies("v1.22.8+vmware.1", "v1.x").is_err());
}

#[test]
fn test_satisfies_prefix_semantics() {
    assert!(satisfies("v1.22.11+vmware.2-tkg.2-rc.1", "v1.22").unwrap());
    assert!(satisfies("v1.22.11+vmware.2-tkg.2-rc.1", "v1.22.11+vmware").unwrap());
    assert!(!satisfies("v1.22.11+vmware.2-tkg.2-rc.1", "v1.22.1").unwrap());
    assert!(!satisfies("v1.22.11+vmware.2-tkg.2", "v1.22.11+vmware.2-tkg.2-rc.1").unwrap());
}

// =============================================================================
// Label values
// =============================================================================

/// Published version shapes beyond the ordering set: channel with a dash,
/// build hash, channel straight after the core
const LABEL_SHAPES: &[&str] = &[
    "v1.22.11+vmware.2-tkg.2-tf-v0.26.0",
    "v1.20.12+vmware.1-tkg.1.10b2767",
    "v1.22.0-rc.1",
    "v1.23.10+vmware.3-tkg.12-zshippable",
];

fn assert_label_legal(label: &str) {
    assert!(!label.is_empty(), "empty label");
    assert!(label.len() <= 63, "{label} is {} characters", label.len());
    assert!(!label.contains('+'), "{label} keeps the build separator");
    let bytes = label.as_bytes();
    assert!(bytes[0].is_ascii_alphanumeric(), "{label} starts badly");
    assert!(bytes[bytes.len() - 1].is_ascii_alphanumeric(), "{label} ends badly");
    assert!(
        bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.')),
        "{label} has an illegal character"
    );
}

/// Story: whatever release the catalog will hand out, its version can be
/// written onto a cluster as a label and read back unchanged
#[test]
fn story_accepted_versions_have_legal_labels() {
    let versions: Vec<&str> = ASCENDING.iter().chain(LABEL_SHAPES).copied().collect();
    let catalog = catalog(&versions);
    let view = catalog.read();

    for version in versions {
        assert!(
            view.tkr_by_version(version).is_some(),
            "{version} was not accepted"
        );
        let label = to_label_value(version);
        assert_label_legal(&label);
        assert_eq!(label.matches("---").count(), version.matches('+').count());
        assert_eq!(from_label_value(&label), version);
    }

    assert_eq!(
        to_label_value("v1.22.11+vmware.2-tkg.2-tf-v0.26.0"),
        "v1.22.11---vmware.2-tkg.2-tf-v0.26.0"
    );
}

/// Story: a release whose label form would be rejected by the API server is
/// never handed out
#[test]
fn story_unlabelable_versions_are_not_accepted() {
    let too_long = format!("v1.22.8+vmware.1-tkg.2-{}", "z".repeat(50));
    let trailing_dash = "v1.22.9-rc-";
    let catalog = catalog(&[too_long.as_str(), trailing_dash]);
    assert_eq!(catalog.tkr_count(), 2);

    let view = catalog.read();
    assert!(view.tkr_by_version(&too_long).is_none());
    assert!(view.tkr_by_version(trailing_dash).is_none());
}

// =============================================================================
// Idempotence and stability
// =============================================================================

/// Story: the API server retries an admission; the second pass is a no-op
#[test]
fn story_resolution_is_idempotent() {
    let recorder = recorder(catalog(&[
        "v1.22.8+vmware.1-tkg.2-zshippable",
        "v1.22.11+vmware.2-tkg.1-zshippable",
    ]));
    let class = cluster_class();
    let mut cluster = cluster("workload", "v1.22", &[]);

    recorder.resolve_and_set_metadata(&mut cluster, &class).unwrap();
    let first = cluster.clone();
    recorder.resolve_and_set_metadata(&mut cluster, &class).unwrap();

    assert_eq!(cluster, first);
    assert_eq!(cluster.tkr_label(), Some("v1.22.11---vmware.2-tkg.1-zshippable"));
    assert_eq!(recorder.resolve_mutations(&cluster, &class).unwrap(), None);
}

/// Story: a newer compatible release is published after a cluster was
/// created; the running cluster keeps the release it was created with
#[test]
fn story_catalog_growth_does_not_upgrade_resolved_clusters() {
    let catalog = catalog(&["v1.22.8+vmware.1-tkg.1-zshippable"]);
    let recorder = recorder(Arc::clone(&catalog));
    let class = cluster_class();

    let mut cluster = cluster("workload", "v1.22.8", &[]);
    recorder.resolve_and_set_metadata(&mut cluster, &class).unwrap();
    assert_eq!(cluster.tkr_label(), Some("v1.22.8---vmware.1-tkg.1-zshippable"));

    catalog.add(tkr("v1.22.8+vmware.1-tkg.2-zshippable"));
    catalog.add(tkr("v1.22.8+vmware.2-tkg.1-zshippable"));
    catalog.add(os_image("ubuntu", "amd64", "v1.22.8+vmware.2"));

    recorder.resolve_and_set_metadata(&mut cluster, &class).unwrap();
    assert_eq!(cluster.tkr_label(), Some("v1.22.8---vmware.1-tkg.1-zshippable"));
    assert_eq!(topology_version(&cluster), "v1.22.8+vmware.1");
}

/// Story: the recorded TKR is deleted from the catalog; the cluster is
/// re-resolved within its original request instead of being rejected
#[test]
fn story_removed_tkr_is_replaced_within_request() {
    let catalog = catalog(&[
        "v1.22.8+vmware.1-tkg.1-zshippable",
        "v1.22.8+vmware.1-tkg.2-zshippable",
    ]);
    let recorder = recorder(Arc::clone(&catalog));
    let class = cluster_class();

    let mut cluster = cluster("workload", "v1.22.8+vmware.1", &[]);
    recorder.resolve_and_set_metadata(&mut cluster, &class).unwrap();
    assert_eq!(cluster.tkr_label(), Some("v1.22.8---vmware.1-tkg.2-zshippable"));

    assert!(catalog.remove_tkr("v1.22.8---vmware.1-tkg.2-zshippable"));
    recorder.resolve_and_set_metadata(&mut cluster, &class).unwrap();
    assert_eq!(cluster.tkr_label(), Some("v1.22.8---vmware.1-tkg.1-zshippable"));
}

// =============================================================================
// Determinism and concurrency
// =============================================================================

/// Story: two identical clusters admitted against the same catalog end up
/// on the same release
#[test]
fn story_identical_clusters_resolve_identically() {
    let recorder = recorder(catalog(&[
        "v1.22.8+vmware.1-tkg.2-zshippable",
        "v1.22.11+vmware.2-tkg.1-zshippable",
        "v1.23.1+vmware.1-tkg.1-zshippable",
    ]));
    let class = cluster_class();

    let mut a = cluster("a", "v1.22", &[]);
    let mut b = cluster("b", "v1.22", &[]);
    recorder.resolve_and_set_metadata(&mut a, &class).unwrap();
    recorder.resolve_and_set_metadata(&mut b, &class).unwrap();

    assert_eq!(a.tkr_label(), b.tkr_label());
    assert_eq!(topology_version(&a), topology_version(&b));
}

/// Story: the fetcher publishes releases while clusters are being admitted;
/// every admission sees a consistent catalog and picks a published release
#[test]
fn story_concurrent_publication_and_admission() {
    let base = "v1.22.1+vmware.1-tkg.1-zshippable";
    let catalog = catalog(&[base]);
    let recorder = Arc::new(recorder(Arc::clone(&catalog)));

    let publisher = {
        let catalog = Arc::clone(&catalog);
        thread::spawn(move || {
            for patch in 2..40u32 {
                let version = format!("v1.22.{patch}+vmware.1-tkg.1-zshippable");
                catalog.add(os_image("ubuntu", "amd64", &format!("v1.22.{patch}+vmware.1")));
                catalog.add(tkr(&version));
            }
        })
    };

    let admitters: Vec<_> = (0..4)
        .map(|worker| {
            let recorder = Arc::clone(&recorder);
            thread::spawn(move || {
                let class = cluster_class();
                for i in 0..25 {
                    let mut cluster = cluster(&format!("c-{worker}-{i}"), "v1.22", &[]);
                    recorder.resolve_and_set_metadata(&mut cluster, &class).unwrap();
                    let label = cluster.tkr_label().unwrap_or_default().to_string();
                    assert!(label.starts_with("v1.22."), "unexpected label {label}");
                    assert!(label.ends_with("---vmware.1-tkg.1-zshippable"));
                }
            })
        })
        .collect();

    publisher.join().unwrap();
    for admitter in admitters {
        admitter.join().unwrap();
    }

    // Once publication settles, new clusters land on the newest release
    let mut late = cluster("late", "v1.22", &[]);
    recorder
        .resolve_and_set_metadata(&mut late, &cluster_class())
        .unwrap();
    assert_eq!(
        late.tkr_label().map(str::to_string),
        Some(to_label_value("v1.22.39+vmware.1-tkg.1-zshippable"))
    );
}
