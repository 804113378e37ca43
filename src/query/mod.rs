//! Resolution query built from a cluster and its ClusterClass
//!
//! The query carries everything the matcher needs and nothing else: the
//! version request, explicit TKR label requirements, and the OS
//! requirements of every machine template (control plane plus one per
//! machine deployment).

mod labels;

pub use labels::{LabelRequirement, LabelRequirements};

use std::fmt;

use kube::ResourceExt;
use serde_json::Value;
use tracing::debug;

use crate::crd::{Cluster, ClusterClass, ClusterVariable, OsSelector};
use crate::version::VersionPrefix;
use crate::{Error, Result, ANNOTATION_RESOLVE_TKR};

/// Topology variable carrying the OS name
pub const VAR_OS_NAME: &str = "osName";
/// Topology variable carrying the OS version
pub const VAR_OS_VERSION: &str = "osVersion";
/// Topology variable carrying the CPU architecture
pub const VAR_OS_ARCH: &str = "osArch";
/// Topology variable carrying the infrastructure provider
pub const VAR_INFRA_PROVIDER: &str = "infraProvider";

/// Name of the control plane machine template
pub const CONTROL_PLANE_TEMPLATE: &str = "controlPlane";

/// Field path reported when the requested version is missing or invalid
const TOPOLOGY_VERSION: &str = "spec.topology.version";

/// OS requirements of one machine template
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateQuery {
    /// `controlPlane` or the machine deployment name
    pub name: String,
    /// Required OS attributes; unset fields mean "any"
    pub os: OsSelector,
}

/// Normalized resolution query
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    /// Requested version (exact or prefix)
    pub version: VersionPrefix,
    /// Explicit TKR label requirements
    pub label_requirements: LabelRequirements,
    /// Machine templates needing an OSImage, control plane first
    pub templates: Vec<TemplateQuery>,
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "version={}", self.version)?;
        if !self.label_requirements.is_empty() {
            write!(f, " labels={}", self.label_requirements)?;
        }
        Ok(())
    }
}

/// Build the resolution query for a cluster
///
/// Fails with `MissingVariable` when the topology version or a variable the
/// ClusterClass marks required is absent, and with `InvalidVariable` when a
/// value violates the ClusterClass schema.
pub fn build_query(cluster: &Cluster, class: &ClusterClass) -> Result<Query> {
    let topology = cluster
        .spec
        .topology
        .as_ref()
        .ok_or_else(|| Error::missing_variable(TOPOLOGY_VERSION))?;

    let requested = topology.version.trim();
    if requested.is_empty() {
        return Err(Error::missing_variable(TOPOLOGY_VERSION));
    }
    let version = VersionPrefix::parse(requested)
        .map_err(|e| Error::invalid_variable(TOPOLOGY_VERSION, e.to_string()))?;

    for variable in class.spec.variables.iter().filter(|v| v.required) {
        let provided = cluster.topology_variable(&variable.name).is_some()
            || variable.schema.open_api_v3_schema.default.is_some();
        if !provided {
            return Err(Error::missing_variable(&variable.name));
        }
    }

    let label_requirements = match cluster.annotations().get(ANNOTATION_RESOLVE_TKR) {
        Some(value) => LabelRequirements::parse(value)?,
        None => LabelRequirements::default(),
    };

    let base = os_selector(&topology.variables, class, true)?;
    let mut templates = vec![TemplateQuery {
        name: CONTROL_PLANE_TEMPLATE.to_string(),
        os: base.clone(),
    }];
    for md in topology
        .workers
        .iter()
        .flat_map(|w| w.machine_deployments.iter())
    {
        let overrides = md
            .variables
            .as_ref()
            .map(|v| v.overrides.as_slice())
            .unwrap_or_default();
        let os = base.overlay(&os_selector(overrides, class, false)?);
        templates.push(TemplateQuery {
            name: md.name.clone(),
            os,
        });
    }

    let query = Query {
        version,
        label_requirements,
        templates,
    };
    debug!(
        cluster = %cluster.name_any(),
        query = %query,
        templates = query.templates.len(),
        "Built resolution query"
    );
    Ok(query)
}

/// Read the four OS variables from a variable list
///
/// With `use_defaults`, variables not in the list take the ClusterClass
/// schema default. Overrides never default: an absent override inherits the
/// cluster-level value.
fn os_selector(
    variables: &[ClusterVariable],
    class: &ClusterClass,
    use_defaults: bool,
) -> Result<OsSelector> {
    let read = |name: &str| os_variable(variables, class, name, use_defaults);
    Ok(OsSelector {
        name: read(VAR_OS_NAME)?,
        version: read(VAR_OS_VERSION)?,
        arch: read(VAR_OS_ARCH)?,
        provider: read(VAR_INFRA_PROVIDER)?,
    })
}

fn os_variable(
    variables: &[ClusterVariable],
    class: &ClusterClass,
    name: &str,
    use_defaults: bool,
) -> Result<Option<String>> {
    let provided = variables.iter().find(|v| v.name == name).map(|v| &v.value);
    let definition = class.variable(name);

    let value = match (provided, definition) {
        (Some(value), None) => {
            return Err(Error::invalid_variable(
                name,
                format!(
                    "not declared by ClusterClass '{}' (got {value})",
                    class.name_any()
                ),
            ));
        }
        (Some(value), Some(def)) => {
            def.schema
                .open_api_v3_schema
                .validate(value)
                .map_err(|message| Error::invalid_variable(name, message))?;
            value
        }
        (None, Some(def)) if use_defaults => match &def.schema.open_api_v3_schema.default {
            Some(default) => default,
            None => return Ok(None),
        },
        (None, _) => return Ok(None),
    };

    match value {
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Null => Ok(None),
        other => Err(Error::invalid_variable(
            name,
            format!("{other} is not a string"),
        )),
    }
}
