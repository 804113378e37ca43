//! Release channels and the policy that ranks them
//!
//! A channel is the maturity tag at the end of a TKR version (`fc.2`, `rc.1`,
//! `zshippable`). Which channels exist, how they rank against each other and
//! which of them count as stable is deployment policy, so it lives in a value
//! constructed at startup rather than in the parser.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::{Identifier, Version};
use crate::{Error, Result};

/// Rank given to channels missing from the rank table
pub const UNKNOWN_CHANNEL_RANK: u32 = 0;

/// Feature-complete pre-release channel
pub const CHANNEL_FEATURE_COMPLETE: &str = "fc";
/// Release-candidate pre-release channel
pub const CHANNEL_RELEASE_CANDIDATE: &str = "rc";
/// Stable channel marker used by published bundles
pub const CHANNEL_SHIPPABLE: &str = "zshippable";

/// A release channel suffix: a name plus optional dot-separated qualifiers
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Channel {
    name: String,
    qualifiers: Vec<Identifier>,
}

impl Channel {
    /// Parse a channel suffix such as `rc.1` or `zshippable`
    ///
    /// `whole` is the complete version string, used for error messages.
    pub(crate) fn parse(input: &str, whole: &str) -> Result<Self> {
        let mut parts = input.split('.');
        let name = parts.next().unwrap_or_default();
        if name.is_empty() {
            return Err(Error::malformed_version(whole, "empty channel name"));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(Error::malformed_version(
                whole,
                format!("invalid channel name '{name}'"),
            ));
        }
        let qualifiers = parts
            .map(|p| Identifier::parse(p, whole))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: name.to_string(),
            qualifiers,
        })
    }

    /// Channel name (`rc`, `fc`, `zshippable`, ...)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Qualifiers following the name (`1` in `rc.1`)
    pub fn qualifiers(&self) -> &[Identifier] {
        &self.qualifiers
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for q in &self.qualifiers {
            write!(f, ".{q}")?;
        }
        Ok(())
    }
}

/// Channel rank table and stable-channel set
///
/// Versions without a channel ("final") always order above every channel and
/// are always stable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelPolicy {
    ranks: BTreeMap<String, u32>,
    stable: BTreeSet<String>,
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self::new(
            [
                (CHANNEL_FEATURE_COMPLETE.to_string(), 10),
                (CHANNEL_RELEASE_CANDIDATE.to_string(), 20),
                (CHANNEL_SHIPPABLE.to_string(), 30),
            ],
            [CHANNEL_SHIPPABLE.to_string()],
        )
    }
}

impl ChannelPolicy {
    /// Create a policy from an explicit rank table and stable set
    pub fn new(
        ranks: impl IntoIterator<Item = (String, u32)>,
        stable: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            ranks: ranks.into_iter().collect(),
            stable: stable.into_iter().collect(),
        }
    }

    /// Set the rank of a channel and return self for chaining
    pub fn with_rank(mut self, name: impl Into<String>, rank: u32) -> Self {
        self.ranks.insert(name.into(), rank);
        self
    }

    /// Mark a channel as stable and return self for chaining
    pub fn with_stable(mut self, name: impl Into<String>) -> Self {
        self.stable.insert(name.into());
        self
    }

    /// Rank of a channel; unknown channels get [`UNKNOWN_CHANNEL_RANK`]
    pub fn rank(&self, channel: &Channel) -> u32 {
        self.ranks
            .get(channel.name())
            .copied()
            .unwrap_or(UNKNOWN_CHANNEL_RANK)
    }

    /// Returns true if the channel is stable (or absent)
    pub fn is_stable(&self, channel: Option<&Channel>) -> bool {
        channel.is_none_or(|c| self.stable.contains(c.name()))
    }

    /// Returns true if the channel is present and not stable
    pub fn is_prerelease(&self, channel: Option<&Channel>) -> bool {
        !self.is_stable(channel)
    }

    /// Order two optional channels: rank, then name, then qualifiers
    pub fn compare_channels(&self, a: Option<&Channel>, b: Option<&Channel>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => self
                .rank(a)
                .cmp(&self.rank(b))
                .then_with(|| a.name().cmp(b.name()))
                .then_with(|| a.qualifiers().cmp(b.qualifiers())),
        }
    }

    /// Total order over versions
    ///
    /// Core numbers first, then vendor identifiers, then release identifiers,
    /// then channel.
    pub fn compare(&self, a: &Version, b: &Version) -> Ordering {
        a.core()
            .cmp(&b.core())
            .then_with(|| a.vendor().cmp(b.vendor()))
            .then_with(|| a.release().cmp(b.release()))
            .then_with(|| self.compare_channels(a.channel(), b.channel()))
    }
}
