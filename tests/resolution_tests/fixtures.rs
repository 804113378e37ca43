//! Test fixtures shared by the resolution stories

use std::sync::Arc;

use serde_json::json;

use tkr_resolver::catalog::Catalog;
use tkr_resolver::crd::{
    Cluster, ClusterClass, ClusterClassSpec, ClusterClassVariable, ClusterSpec, ClusterVariable,
    KubernetesSpec, MachineDeploymentTopology, MachineDeploymentVariables, MachineImageInfo,
    OSImage, OSImageSpec, OsImageRef, OsInfo, TanzuKubernetesRelease,
    TanzuKubernetesReleaseSpec, Topology, VariableSchema, VariableSchemaProps, WorkersTopology,
};
use tkr_resolver::query::{VAR_INFRA_PROVIDER, VAR_OS_ARCH, VAR_OS_NAME, VAR_OS_VERSION};
use tkr_resolver::recorder::Recorder;
use tkr_resolver::version::{to_label_value, ChannelPolicy};

/// Kubernetes version part of a TKR version (`v1.22.8+vmware.1`)
pub fn kubernetes_version(tkr_version: &str) -> String {
    let (core, build) = tkr_version.split_once('+').unwrap_or((tkr_version, ""));
    let core = core.split('-').next().unwrap_or(core);
    match build.split('-').next() {
        Some(vendor) if !vendor.is_empty() => format!("{core}+{vendor}"),
        _ => core.to_string(),
    }
}

/// Name of the OSImage fixture for an OS/arch on a Kubernetes version
pub fn image_name(os: &str, arch: &str, k8s: &str) -> String {
    format!("{os}-{arch}-{}", to_label_value(k8s))
}

/// TKR named by its label-safe version, shipping ubuntu and photon images
pub fn tkr(version: &str) -> TanzuKubernetesRelease {
    let k8s = kubernetes_version(version);
    let k8s_ref = k8s.as_str();
    TanzuKubernetesRelease::new(
        &to_label_value(version),
        TanzuKubernetesReleaseSpec {
            version: version.to_string(),
            kubernetes: KubernetesSpec {
                version: k8s.clone(),
                image_repository: Some("projects.registry.vmware.com/tkg".to_string()),
            },
            os_images: ["ubuntu", "photon"]
                .iter()
                .flat_map(|os| {
                    ["amd64", "arm64"]
                        .iter()
                        .map(move |arch| OsImageRef::new(image_name(os, arch, k8s_ref)))
                })
                .collect(),
            os_image_selector: None,
        },
    )
}

/// OSImage for an OS/arch on a Kubernetes version (AWS)
pub fn os_image(os: &str, arch: &str, k8s: &str) -> OSImage {
    let version = if os == "ubuntu" { "20.04" } else { "3" };
    let payload = json!({"region": "us-west-2", "id": format!("ami-{os}-{arch}")});
    OSImage::new(
        &image_name(os, arch, k8s),
        OSImageSpec {
            kubernetes_version: k8s.to_string(),
            os: OsInfo {
                type_: "linux".to_string(),
                name: os.to_string(),
                version: version.to_string(),
                arch: arch.to_string(),
            },
            image: MachineImageInfo::new("aws", payload),
        },
    )
}

/// Catalog holding the given TKRs and only the listed OS/arch images
pub fn catalog_with(versions: &[&str], images: &[(&str, &str)]) -> Arc<Catalog> {
    let catalog = Arc::new(Catalog::new());
    for version in versions {
        catalog.add(tkr(version));
        let k8s = kubernetes_version(version);
        for (os, arch) in images {
            catalog.add(os_image(os, arch, &k8s));
        }
    }
    catalog
}

/// Catalog holding the given TKRs with ubuntu/amd64 images
pub fn catalog(versions: &[&str]) -> Arc<Catalog> {
    catalog_with(versions, &[("ubuntu", "amd64")])
}

/// Recorder over a catalog with the default channel policy
pub fn recorder(catalog: Arc<Catalog>) -> Recorder {
    Recorder::new(catalog, ChannelPolicy::default())
}

fn string_variable(name: &str, allowed: &[&str], default: Option<&str>) -> ClusterClassVariable {
    ClusterClassVariable {
        name: name.to_string(),
        required: false,
        schema: VariableSchema {
            open_api_v3_schema: VariableSchemaProps {
                type_: Some("string".to_string()),
                enum_: allowed.iter().map(|a| json!(a)).collect(),
                default: default.map(|d| json!(d)),
            },
        },
    }
}

/// ClusterClass declaring the OS variables with ubuntu/aws defaults
pub fn cluster_class() -> ClusterClass {
    let mut class = ClusterClass::new(
        "tkg-aws-default",
        ClusterClassSpec {
            variables: vec![
                string_variable(VAR_OS_NAME, &["ubuntu", "photon"], Some("ubuntu")),
                string_variable(VAR_OS_VERSION, &[], None),
                string_variable(VAR_OS_ARCH, &["amd64", "arm64"], Some("amd64")),
                string_variable(VAR_INFRA_PROVIDER, &["aws", "vsphere"], Some("aws")),
            ],
        },
    );
    class.metadata.namespace = Some("default".to_string());
    class
}

/// Cluster requesting a version, with optional cluster-level variables
pub fn cluster(name: &str, version: &str, variables: &[(&str, &str)]) -> Cluster {
    let mut cluster = Cluster::new(
        name,
        ClusterSpec {
            topology: Some(Topology {
                class: "tkg-aws-default".to_string(),
                version: version.to_string(),
                variables: variables
                    .iter()
                    .map(|(k, v)| ClusterVariable::new(*k, *v))
                    .collect(),
                ..Default::default()
            }),
        },
    );
    cluster.metadata.namespace = Some("default".to_string());
    cluster
}

/// Add a machine deployment with variable overrides
pub fn with_machine_deployment(
    mut cluster: Cluster,
    name: &str,
    overrides: &[(&str, &str)],
) -> Cluster {
    if let Some(topology) = cluster.spec.topology.as_mut() {
        topology
            .workers
            .get_or_insert_with(WorkersTopology::default)
            .machine_deployments
            .push(MachineDeploymentTopology {
                class: "tkg-worker".to_string(),
                name: name.to_string(),
                replicas: Some(3),
                variables: Some(MachineDeploymentVariables {
                    overrides: overrides
                        .iter()
                        .map(|(k, v)| ClusterVariable::new(*k, *v))
                        .collect(),
                }),
            });
    }
    cluster
}

/// Topology version of a cluster
pub fn topology_version(cluster: &Cluster) -> String {
    cluster
        .spec
        .topology
        .as_ref()
        .map(|t| t.version.clone())
        .unwrap_or_default()
}
