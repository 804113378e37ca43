//! Vendor-flavoured semantic versions used by TKRs
//!
//! TKR versions look like `v1.22.11+vmware.2-tkg.2-rc.1`:
//!
//! - `1.22.11` - Kubernetes core version
//! - `vmware.2` - vendor build identifiers
//! - `tkg.2` - release identifiers (may carry a build hash, `tkg.1.10b2767`)
//! - `rc.1` - optional release channel
//!
//! A channel may also sit directly after the core (`v1.22.0-rc.1`).
//! [`Version`] is a fully specified version; [`VersionPrefix`] is a request
//! that may stop early (`v1.22`, `v1.22.11+vmware.2`) and matches every
//! version it is a component-wise prefix of.

mod channel;

pub use channel::{
    Channel, ChannelPolicy, CHANNEL_FEATURE_COMPLETE, CHANNEL_RELEASE_CANDIDATE,
    CHANNEL_SHIPPABLE, UNKNOWN_CHANNEL_RANK,
};

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Label-legal replacement for the `+` build separator
pub const LABEL_SAFE_BUILD_SEPARATOR: &str = "---";

/// Longest value a Kubernetes label may carry
pub const MAX_LABEL_VALUE_LEN: usize = 63;

/// Registry image tags use `_` in place of `+`
pub const IMAGE_TAG_BUILD_SEPARATOR: char = '_';

/// A dot-separated identifier inside vendor, release or channel segments
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// All-digit identifier, compared numerically
    Numeric(u64),
    /// Any other identifier, compared lexically
    Alpha(String),
}

impl Identifier {
    fn parse(input: &str, whole: &str) -> Result<Self> {
        if input.is_empty() {
            return Err(Error::malformed_version(whole, "empty identifier"));
        }
        if !input.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::malformed_version(
                whole,
                format!("invalid identifier '{input}'"),
            ));
        }
        if input.chars().all(|c| c.is_ascii_digit()) {
            input
                .parse()
                .map(Self::Numeric)
                .map_err(|e| Error::malformed_version(whole, format!("'{input}': {e}")))
        } else {
            Ok(Self::Alpha(input.to_string()))
        }
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => a.cmp(b),
            (Self::Numeric(_), Self::Alpha(_)) => Ordering::Less,
            (Self::Alpha(_), Self::Numeric(_)) => Ordering::Greater,
            (Self::Alpha(a), Self::Alpha(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Alpha(s) => write!(f, "{s}"),
        }
    }
}

fn parse_identifiers(segment: &str, whole: &str) -> Result<Vec<Identifier>> {
    segment
        .split('.')
        .map(|p| Identifier::parse(p, whole))
        .collect()
}

fn write_identifiers(f: &mut fmt::Formatter<'_>, ids: &[Identifier]) -> fmt::Result {
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            write!(f, ".")?;
        }
        write!(f, "{id}")?;
    }
    Ok(())
}

/// Components shared by the version and prefix parsers
struct Parts {
    core: Vec<u64>,
    vendor: Option<Vec<Identifier>>,
    release: Option<Vec<Identifier>>,
    channel: Option<Channel>,
}

fn parse_parts(input: &str) -> Result<Parts> {
    let trimmed = input.trim();
    let body = trimmed.strip_prefix('v').unwrap_or(trimmed);
    if body.is_empty() {
        return Err(Error::malformed_version(input, "empty version"));
    }

    let (head, build) = match body.split_once('+') {
        Some((head, build)) => (head, Some(build)),
        None => (body, None),
    };
    let (core, pre) = match head.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (head, None),
    };

    let core = core
        .split('.')
        .map(|c| {
            if c.is_empty() || !c.chars().all(|ch| ch.is_ascii_digit()) {
                return Err(Error::malformed_version(
                    input,
                    format!("'{c}' is not a number"),
                ));
            }
            c.parse::<u64>()
                .map_err(|e| Error::malformed_version(input, format!("'{c}': {e}")))
        })
        .collect::<Result<Vec<_>>>()?;
    if core.len() > 3 {
        return Err(Error::malformed_version(
            input,
            "core version has more than three components",
        ));
    }
    if core.len() < 3 && (pre.is_some() || build.is_some()) {
        return Err(Error::malformed_version(
            input,
            "channel and build metadata require MAJOR.MINOR.PATCH",
        ));
    }

    let mut channel = pre.map(|p| Channel::parse(p, input)).transpose()?;
    let mut vendor = None;
    let mut release = None;

    if let Some(build) = build {
        let mut segments = build.splitn(3, '-');
        vendor = Some(parse_identifiers(
            segments.next().unwrap_or_default(),
            input,
        )?);
        release = segments
            .next()
            .map(|s| parse_identifiers(s, input))
            .transpose()?;
        if let Some(rest) = segments.next() {
            if channel.is_some() {
                return Err(Error::malformed_version(input, "channel specified twice"));
            }
            channel = Some(Channel::parse(rest, input)?);
        }
    }

    Ok(Parts {
        core,
        vendor,
        release,
        channel,
    })
}

/// A fully specified TKR version
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Version {
    major: u64,
    minor: u64,
    patch: u64,
    vendor: Vec<Identifier>,
    release: Vec<Identifier>,
    channel: Option<Channel>,
}

impl Version {
    /// Parse a version string, failing with `MalformedVersion`
    pub fn parse(input: &str) -> Result<Self> {
        let parts = parse_parts(input)?;
        let [major, minor, patch] = parts.core[..] else {
            return Err(Error::malformed_version(
                input,
                "expected MAJOR.MINOR.PATCH",
            ));
        };
        Ok(Self {
            major,
            minor,
            patch,
            vendor: parts.vendor.unwrap_or_default(),
            release: parts.release.unwrap_or_default(),
            channel: parts.channel,
        })
    }

    /// Core version as a tuple
    pub fn core(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }

    /// Vendor build identifiers (`vmware.2`)
    pub fn vendor(&self) -> &[Identifier] {
        &self.vendor
    }

    /// Release identifiers (`tkg.2`)
    pub fn release(&self) -> &[Identifier] {
        &self.release
    }

    /// Release channel, if any
    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    /// Index keys for every core prefix: `v1`, `v1.22`, `v1.22.11`
    pub fn core_prefix_keys(&self) -> [String; 3] {
        [
            format!("v{}", self.major),
            format!("v{}.{}", self.major, self.minor),
            format!("v{}.{}.{}", self.major, self.minor, self.patch),
        ]
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)?;
        // A channel only fits after the release segment when both build
        // segments exist; otherwise it goes in the pre-release position.
        let trailing_channel = !self.vendor.is_empty() && !self.release.is_empty();
        if let (Some(channel), false) = (&self.channel, trailing_channel) {
            write!(f, "-{channel}")?;
        }
        if !self.vendor.is_empty() {
            write!(f, "+")?;
            write_identifiers(f, &self.vendor)?;
        }
        if !self.release.is_empty() {
            write!(f, "-")?;
            write_identifiers(f, &self.release)?;
        }
        if let (Some(channel), true) = (&self.channel, trailing_channel) {
            write!(f, "-{channel}")?;
        }
        Ok(())
    }
}

/// A version request: exact version or component-wise prefix
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionPrefix {
    raw: String,
    core: Vec<u64>,
    vendor: Option<Vec<Identifier>>,
    release: Option<Vec<Identifier>>,
    channel: Option<Channel>,
}

impl VersionPrefix {
    /// Parse a version request
    pub fn parse(input: &str) -> Result<Self> {
        let parts = parse_parts(input)?;
        Ok(Self {
            raw: input.trim().to_string(),
            core: parts.core,
            vendor: parts.vendor,
            release: parts.release,
            channel: parts.channel,
        })
    }

    /// The request as written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Specified core components (one to three)
    pub fn core(&self) -> &[u64] {
        &self.core
    }

    /// Channel named by the request, if any
    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    /// Returns true if the request names a pre-release channel explicitly
    pub fn is_exact_prerelease(&self, policy: &ChannelPolicy) -> bool {
        policy.is_prerelease(self.channel())
    }

    /// Index key for the specified core prefix (`v1.22`)
    pub fn core_key(&self) -> String {
        let parts: Vec<String> = self.core.iter().map(u64::to_string).collect();
        format!("v{}", parts.join("."))
    }

    /// Returns true if `version` satisfies this request
    ///
    /// The last specified segment matches as an identifier prefix; segments
    /// followed by a further specified segment must match exactly.
    pub fn matches(&self, version: &Version) -> bool {
        let core = [version.major, version.minor, version.patch];
        if self.core.iter().zip(core.iter()).any(|(want, have)| want != have) {
            return false;
        }

        if let Some(vendor) = &self.vendor {
            let is_last = self.release.is_none() && self.channel.is_none();
            if !segment_matches(vendor, &version.vendor, is_last) {
                return false;
            }
        }
        if let Some(release) = &self.release {
            if !segment_matches(release, &version.release, self.channel.is_none()) {
                return false;
            }
        }
        match &self.channel {
            Some(channel) => version.channel.as_ref() == Some(channel),
            None => true,
        }
    }
}

fn segment_matches(want: &[Identifier], have: &[Identifier], prefix: bool) -> bool {
    if prefix {
        have.starts_with(want)
    } else {
        have == want
    }
}

impl FromStr for VersionPrefix {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Compare two version strings under the default channel policy
pub fn compare(a: &str, b: &str) -> Result<Ordering> {
    Ok(ChannelPolicy::default().compare(&Version::parse(a)?, &Version::parse(b)?))
}

/// Returns true if `candidate` satisfies the `constraint` request
pub fn satisfies(candidate: &str, constraint: &str) -> Result<bool> {
    Ok(VersionPrefix::parse(constraint)?.matches(&Version::parse(candidate)?))
}

/// Rewrite a version into a label-legal value (`+` becomes `---`)
pub fn to_label_value(version: &str) -> String {
    version.replace('+', LABEL_SAFE_BUILD_SEPARATOR)
}

/// Returns true if `value` can be stored as a Kubernetes label value
///
/// Non-empty values must begin and end with an alphanumeric character and
/// contain only alphanumerics, `-`, `_` and `.` in between.
pub fn is_label_value(value: &str) -> bool {
    if value.len() > MAX_LABEL_VALUE_LEN {
        return false;
    }
    let bytes = value.as_bytes();
    match (bytes.first(), bytes.last()) {
        (None, _) | (_, None) => true,
        (Some(first), Some(last)) => {
            first.is_ascii_alphanumeric()
                && last.is_ascii_alphanumeric()
                && bytes
                    .iter()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        }
    }
}

/// Inverse of [`to_label_value`]
pub fn from_label_value(label: &str) -> String {
    label.replace(LABEL_SAFE_BUILD_SEPARATOR, "+")
}

/// Version encoded in a registry image tag (`v1.22.11_vmware.2-tkg.2`)
pub fn from_image_tag(tag: &str) -> String {
    tag.replace(IMAGE_TAG_BUILD_SEPARATOR, "+")
}
