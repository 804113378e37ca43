//! Cluster API `Cluster` and `ClusterClass` (subset)
//!
//! Only the fields the resolver reads or writes are modelled. Unknown fields
//! are ignored on deserialization; the webhook never re-serializes these
//! types back to the API server, it emits JSON patches instead.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::LABEL_TKR;

/// Specification for a CAPI Cluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Cluster",
    plural = "clusters",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Managed topology; clusters without one are not resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<Topology>,
}

/// Cluster topology referencing a ClusterClass
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    /// Name of the ClusterClass in the cluster's namespace
    pub class: String,

    /// Requested version; rewritten to the resolved Kubernetes version
    #[serde(default)]
    pub version: String,

    /// Control plane topology
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane: Option<ControlPlaneTopology>,

    /// Worker topology
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<WorkersTopology>,

    /// Cluster-level variable values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<ClusterVariable>,
}

/// Control plane topology
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneTopology {
    /// Number of control plane machines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
}

/// Worker topology
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkersTopology {
    /// Machine deployments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub machine_deployments: Vec<MachineDeploymentTopology>,
}

/// A machine deployment in the topology
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineDeploymentTopology {
    /// Machine deployment class in the ClusterClass
    pub class: String,

    /// Unique name within the cluster
    pub name: String,

    /// Number of machines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Per-deployment variable overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<MachineDeploymentVariables>,
}

/// Variable overrides of a machine deployment
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineDeploymentVariables {
    /// Overridden values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<ClusterVariable>,
}

/// A named variable value
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ClusterVariable {
    /// Variable name
    pub name: String,

    /// Variable value (any JSON)
    #[serde(default)]
    pub value: Value,
}

impl ClusterVariable {
    /// Create a variable
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl Cluster {
    /// Value of the resolved-TKR label, if present
    pub fn tkr_label(&self) -> Option<&str> {
        self.labels().get(LABEL_TKR).map(String::as_str)
    }

    /// Cluster-level value of a topology variable
    pub fn topology_variable(&self, name: &str) -> Option<&Value> {
        self.spec
            .topology
            .as_ref()?
            .variables
            .iter()
            .find(|v| v.name == name)
            .map(|v| &v.value)
    }
}

/// Specification for a CAPI ClusterClass
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "ClusterClass",
    plural = "clusterclasses",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterClassSpec {
    /// Variable definitions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<ClusterClassVariable>,
}

/// A variable definition in a ClusterClass
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterClassVariable {
    /// Variable name
    pub name: String,

    /// Whether clusters must provide the variable
    #[serde(default)]
    pub required: bool,

    /// Value schema
    #[serde(default)]
    pub schema: VariableSchema,
}

/// Wrapper around the OpenAPI schema of a variable
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct VariableSchema {
    /// The OpenAPI v3 schema
    #[serde(rename = "openAPIV3Schema", default)]
    pub open_api_v3_schema: VariableSchemaProps,
}

/// Subset of OpenAPI v3 schema properties checked by the resolver
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct VariableSchemaProps {
    /// JSON type (`string`, `integer`, `number`, `boolean`, `object`, `array`)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// Allowed values
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub enum_: Vec<Value>,

    /// Default value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl VariableSchemaProps {
    /// Check a value against the declared type and enum
    ///
    /// Returns a description of the violation on failure.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        if let Some(type_) = &self.type_ {
            let ok = match type_.as_str() {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "object" => value.is_object(),
                "array" => value.is_array(),
                _ => true,
            };
            if !ok {
                return Err(format!("{value} is not of type {type_}"));
            }
        }
        if !self.enum_.is_empty() && !self.enum_.contains(value) {
            let allowed: Vec<String> = self.enum_.iter().map(Value::to_string).collect();
            return Err(format!("{value} is not one of [{}]", allowed.join(", ")));
        }
        Ok(())
    }
}

impl ClusterClass {
    /// Look up a variable definition by name
    pub fn variable(&self, name: &str) -> Option<&ClusterClassVariable> {
        self.spec.variables.iter().find(|v| v.name == name)
    }
}
