//! Custom Resource Definitions used by the resolver
//!
//! TKR and OSImage are the catalog records; Cluster and ClusterClass are the
//! Cluster API objects read (and, for Cluster, mutated) at admission time.

mod capi;
mod osimage;
mod tkr;

pub use capi::{
    Cluster, ClusterClass, ClusterClassSpec, ClusterClassVariable, ClusterSpec, ClusterVariable,
    ControlPlaneTopology, MachineDeploymentTopology, MachineDeploymentVariables, Topology,
    VariableSchema, VariableSchemaProps, WorkersTopology,
};
pub use osimage::{MachineImageInfo, OSImage, OSImageSpec, OsAttributes, OsInfo, OsSelector};
pub use tkr::{KubernetesSpec, OsImageRef, TanzuKubernetesRelease, TanzuKubernetesReleaseSpec};
