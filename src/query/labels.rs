//! TKR label requirements
//!
//! Clusters may restrict which TKRs are acceptable through the
//! `run.tanzu.vmware.com/resolve-tkr` annotation. The value is a comma
//! separated list of requirements:
//!
//! - `key` - label must be present
//! - `!key` - label must be absent
//! - `key=value` - label must be present with that value
//! - `key!=value` - label must be absent or carry another value

use std::collections::BTreeMap;
use std::fmt;

use crate::{Error, Result, ANNOTATION_RESOLVE_TKR};

/// One label requirement
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LabelRequirement {
    /// `key`
    Exists(String),
    /// `!key`
    DoesNotExist(String),
    /// `key=value`
    Equals(String, String),
    /// `key!=value`
    NotEquals(String, String),
}

impl LabelRequirement {
    /// Returns true if the label map satisfies this requirement
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Self::Exists(key) => labels.contains_key(key),
            Self::DoesNotExist(key) => !labels.contains_key(key),
            Self::Equals(key, value) => labels.get(key) == Some(value),
            Self::NotEquals(key, value) => labels.get(key) != Some(value),
        }
    }
}

impl fmt::Display for LabelRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exists(key) => write!(f, "{key}"),
            Self::DoesNotExist(key) => write!(f, "!{key}"),
            Self::Equals(key, value) => write!(f, "{key}={value}"),
            Self::NotEquals(key, value) => write!(f, "{key}!={value}"),
        }
    }
}

/// A conjunction of label requirements; empty accepts everything
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelRequirements(Vec<LabelRequirement>);

impl LabelRequirements {
    /// Parse an annotation value
    pub fn parse(input: &str) -> Result<Self> {
        let mut requirements = Vec::new();
        for term in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            requirements.push(parse_term(term)?);
        }
        Ok(Self(requirements))
    }

    /// Returns true if every requirement holds
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.0.iter().all(|r| r.matches(labels))
    }

    /// Returns true if there are no requirements
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The individual requirements
    pub fn requirements(&self) -> &[LabelRequirement] {
        &self.0
    }
}

impl fmt::Display for LabelRequirements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", terms.join(","))
    }
}

fn parse_term(term: &str) -> Result<LabelRequirement> {
    let invalid = |message: &str| {
        Error::invalid_variable(ANNOTATION_RESOLVE_TKR, format!("'{term}': {message}"))
    };

    let requirement = if let Some((key, value)) = term.split_once("!=") {
        LabelRequirement::NotEquals(key.trim().to_string(), value.trim().to_string())
    } else if let Some((key, value)) = term.split_once('=') {
        LabelRequirement::Equals(key.trim().to_string(), value.trim().to_string())
    } else if let Some(key) = term.strip_prefix('!') {
        LabelRequirement::DoesNotExist(key.trim().to_string())
    } else {
        LabelRequirement::Exists(term.to_string())
    };

    let key = match &requirement {
        LabelRequirement::Exists(k)
        | LabelRequirement::DoesNotExist(k)
        | LabelRequirement::Equals(k, _)
        | LabelRequirement::NotEquals(k, _) => k,
    };
    if key.is_empty() {
        return Err(invalid("empty label key"));
    }
    if key.contains(['!', '=', ' ']) {
        return Err(invalid("label key contains an operator"));
    }
    Ok(requirement)
}
