//! Resolution scenario stories
//!
//! Each story starts from a catalog as the bundle fetcher would publish it
//! and admits a cluster through the recorder, checking exactly what ends up
//! on the cluster object.

use kube::ResourceExt;

use tkr_resolver::query::{VAR_OS_ARCH, VAR_OS_NAME};
use tkr_resolver::{Error, LABEL_TKR};

use super::fixtures::*;

// =============================================================================
// Channel selection
// =============================================================================

/// Story: the v1.22 line carries feature-complete and release-candidate
/// builds plus one shippable build; an implicit v1.22 request lands on the
/// shippable one
#[test]
fn story_implicit_request_picks_shippable_build() {
    let recorder = recorder(catalog(&[
        "v1.22.11+vmware.2-tkg.2-fc.1",
        "v1.22.11+vmware.2-tkg.2-fc.2",
        "v1.22.11+vmware.2-tkg.2-rc.1",
        "v1.22.8+vmware.1-tkg.2-zshippable",
    ]));
    let mut cluster = cluster("workload", "v1.22", &[]);

    recorder
        .resolve_and_set_metadata(&mut cluster, &cluster_class())
        .unwrap();

    assert_eq!(cluster.tkr_label(), Some("v1.22.8---vmware.1-tkg.2-zshippable"));
    assert_eq!(topology_version(&cluster), "v1.22.8+vmware.1");
}

/// Story: only pre-release builds exist; the implicit request is rejected
/// and the error lists what is available
#[test]
fn story_implicit_request_never_picks_prerelease() {
    let recorder = recorder(catalog(&[
        "v1.22.11+vmware.2-tkg.2-fc.1",
        "v1.22.11+vmware.2-tkg.2-fc.2",
        "v1.22.11+vmware.2-tkg.2-rc.1",
    ]));
    let mut cluster = cluster("workload", "v1.22", &[]);
    let before = cluster.clone();

    let err = recorder
        .resolve_and_set_metadata(&mut cluster, &cluster_class())
        .unwrap_err();

    match &err {
        Error::NoCompatibleTkr { constraint, nearest } => {
            assert_eq!(constraint, "v1.22");
            assert_eq!(
                nearest,
                &vec![
                    "v1.22.11+vmware.2-tkg.2-rc.1".to_string(),
                    "v1.22.11+vmware.2-tkg.2-fc.2".to_string(),
                    "v1.22.11+vmware.2-tkg.2-fc.1".to_string(),
                ]
            );
        }
        other => panic!("expected NoCompatibleTkr, got {other}"),
    }
    assert!(err.is_user_error());
    assert_eq!(cluster, before);
}

/// Story: a tester asks for one exact release candidate and gets it
#[test]
fn story_exact_prerelease_request_is_honoured() {
    let recorder = recorder(catalog(&[
        "v1.22.11+vmware.2-tkg.2-fc.2",
        "v1.22.11+vmware.2-tkg.2-rc.1",
        "v1.22.11+vmware.2-tkg.2-zshippable",
        "v1.23.13+vmware.1-tkg.1-rc.1",
    ]));
    let mut cluster = cluster("rc-test", "v1.22.11+vmware.2-tkg.2-rc.1", &[]);

    recorder
        .resolve_and_set_metadata(&mut cluster, &cluster_class())
        .unwrap();

    assert_eq!(cluster.tkr_label(), Some("v1.22.11---vmware.2-tkg.2-rc.1"));
    assert_eq!(topology_version(&cluster), "v1.22.11+vmware.2");
}

/// Story: an operator promotes `rc` to stable; implicit requests may now
/// land on release candidates
#[test]
fn story_configured_stable_channel_widens_implicit_picks() {
    let catalog = catalog(&["v1.22.11+vmware.2-tkg.2-rc.1"]);
    let recorder = tkr_resolver::recorder::Recorder::new(
        catalog,
        tkr_resolver::version::ChannelPolicy::default().with_stable("rc"),
    );
    let mut cluster = cluster("workload", "v1.22", &[]);

    recorder
        .resolve_and_set_metadata(&mut cluster, &cluster_class())
        .unwrap();
    assert_eq!(cluster.tkr_label(), Some("v1.22.11---vmware.2-tkg.2-rc.1"));
}

// =============================================================================
// OSImage selection
// =============================================================================

/// Story: the release exists but nobody built a photon/arm64 image for it;
/// the cluster is rejected and keeps its labels
#[test]
fn story_missing_os_image_rejects_without_mutation() {
    let recorder = recorder(catalog_with(
        &["v1.22.8+vmware.1-tkg.2-zshippable"],
        &[("ubuntu", "amd64"), ("photon", "amd64")],
    ));
    let mut cluster = cluster(
        "workload",
        "v1.22",
        &[(VAR_OS_NAME, "photon"), (VAR_OS_ARCH, "arm64")],
    );
    cluster
        .labels_mut()
        .insert("team".to_string(), "platform".to_string());
    let before = cluster.clone();

    let err = recorder
        .resolve_and_set_metadata(&mut cluster, &cluster_class())
        .unwrap_err();

    match &err {
        Error::NoCompatibleOsImage {
            tkr,
            template,
            requirements,
        } => {
            assert_eq!(tkr, "v1.22.8---vmware.1-tkg.2-zshippable");
            assert_eq!(template, "controlPlane");
            assert_eq!(requirements, "os=photon/any arch=arm64 provider=aws");
        }
        other => panic!("expected NoCompatibleOsImage, got {other}"),
    }
    assert_eq!(cluster, before);
    assert!(!cluster.labels().contains_key(LABEL_TKR));
}

/// Story: an arm64 worker pool whose image is missing fails the whole
/// cluster, even though the control plane could be satisfied
#[test]
fn story_one_unsatisfied_template_fails_everything() {
    let recorder = recorder(catalog(&["v1.22.8+vmware.1-tkg.2-zshippable"]));
    let cluster = with_machine_deployment(
        cluster("workload", "v1.22", &[]),
        "md-arm",
        &[(VAR_OS_ARCH, "arm64")],
    );

    let err = recorder
        .resolve_mutations(&cluster, &cluster_class())
        .unwrap_err();
    assert!(matches!(err, Error::NoCompatibleOsImage { ref template, .. } if template == "md-arm"));
}

/// Story: mixed architectures resolve when every image exists
#[test]
fn story_mixed_architecture_cluster_resolves() {
    let recorder = recorder(catalog_with(
        &["v1.22.8+vmware.1-tkg.2-zshippable"],
        &[("ubuntu", "amd64"), ("ubuntu", "arm64")],
    ));
    let cluster = with_machine_deployment(
        cluster("workload", "v1.22", &[]),
        "md-arm",
        &[(VAR_OS_ARCH, "arm64")],
    );

    let fields = recorder
        .resolve_mutations(&cluster, &cluster_class())
        .unwrap()
        .expect("fresh cluster should be resolved");
    assert_eq!(fields.tkr_label, "v1.22.8---vmware.1-tkg.2-zshippable");
}

// =============================================================================
// Already resolved clusters
// =============================================================================

/// Story: a cluster created long ago carries a TKR label with a build hash;
/// re-admitting it against an unchanged catalog changes nothing
#[test]
fn story_previously_resolved_cluster_is_untouched() {
    let recorder = recorder(catalog(&[
        "v1.20.12+vmware.1-tkg.1.10b2767",
        "v1.20.12+vmware.1-tkg.2",
    ]));
    let mut cluster = cluster("legacy", "v1.20.12+vmware.1", &[]);
    cluster.labels_mut().insert(
        LABEL_TKR.to_string(),
        "v1.20.12---vmware.1-tkg.1.10b2767".to_string(),
    );

    recorder
        .resolve_and_set_metadata(&mut cluster, &cluster_class())
        .unwrap();

    assert_eq!(cluster.tkr_label(), Some("v1.20.12---vmware.1-tkg.1.10b2767"));
    assert_eq!(topology_version(&cluster), "v1.20.12+vmware.1");
}

/// Story: the recorded TKR object was renamed; it is still found through its
/// label-safe version
#[test]
fn story_recorded_tkr_found_by_version() {
    let catalog = catalog(&["v1.20.12+vmware.1-tkg.2"]);
    let mut renamed = tkr("v1.20.12+vmware.1-tkg.1.10b2767");
    renamed.metadata.name = Some("tkr-legacy".to_string());
    catalog.add(renamed);
    let recorder = recorder(catalog);

    let mut cluster = cluster("legacy", "v1.20.12+vmware.1", &[]);
    cluster.labels_mut().insert(
        LABEL_TKR.to_string(),
        "v1.20.12---vmware.1-tkg.1.10b2767".to_string(),
    );

    assert_eq!(
        recorder
            .resolve_mutations(&cluster, &cluster_class())
            .unwrap(),
        None
    );
}

/// Story: a cluster without a topology version cannot be resolved
#[test]
fn story_missing_topology_version_is_reported() {
    let recorder = recorder(catalog(&["v1.22.8+vmware.1-tkg.2-zshippable"]));
    let mut cluster = cluster("workload", "", &[]);

    let err = recorder
        .resolve_and_set_metadata(&mut cluster, &cluster_class())
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "missing required variable 'spec.topology.version'"
    );
}

/// Story: an OS the ClusterClass does not allow is rejected before matching
#[test]
fn story_disallowed_os_is_invalid() {
    let recorder = recorder(catalog(&["v1.22.8+vmware.1-tkg.2-zshippable"]));
    let mut cluster = cluster("workload", "v1.22", &[(VAR_OS_NAME, "windows")]);

    let err = recorder
        .resolve_and_set_metadata(&mut cluster, &cluster_class())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidVariable { ref name, .. } if name == VAR_OS_NAME));
}
