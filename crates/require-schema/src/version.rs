//! Version comparison between an installed build and a caller's request.
//!
//! A numeric version has up to three dot-separated integers
//! (`major[.minor[.patch]]`). Anything else (`test`, `2.1-beta`, a user
//! name) is a *test version*: it can be loaded, but never silently.
//!
//! A request ending in `+` accepts newer builds with the same major version:
//! `1.2.3+` is satisfied by `1.2.7` and `1.4.0`, while `1.2+` is satisfied by
//! any `1.2.x` and only reports `1.3.0` as [`VersionMatch::Higher`].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Outcome of comparing a found version against a requested one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionMatch {
    /// Not interchangeable. Fatal to resolution.
    Mismatch,
    /// Textually identical.
    Exact,
    /// Compatible with the request.
    Match,
    /// The found version is not numeric; accepted with a warning.
    TestVersion,
    /// The found version is newer than requested and the request did not
    /// allow it with `+`; accepted with a warning.
    Higher,
}

impl VersionMatch {
    /// Whether resolution may proceed with this candidate.
    pub fn is_acceptable(self) -> bool {
        self != Self::Mismatch
    }

    /// Whether the candidate is accepted only with a warning.
    pub fn needs_warning(self) -> bool {
        matches!(self, Self::TestVersion | Self::Higher)
    }

    /// Preference used when several candidates are acceptable. Larger is better.
    pub fn rank(self) -> u8 {
        match self {
            Self::Mismatch => 0,
            Self::TestVersion => 1,
            Self::Higher => 2,
            Self::Match => 3,
            Self::Exact => 4,
        }
    }
}

impl fmt::Display for VersionMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Mismatch => "mismatch",
            Self::Exact => "exact",
            Self::Match => "match",
            Self::TestVersion => "test version",
            Self::Higher => "higher",
        };
        f.write_str(s)
    }
}

/// A version string parsed as `major[.minor[.patch]][+]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NumericVersion {
    /// Leading component; must always match between found and requested.
    pub major: u32,
    /// Second component, if given.
    pub minor: Option<u32>,
    /// Third component, if given.
    pub patch: Option<u32>,
    /// Trailing `+`: "this version or newer".
    pub or_newer: bool,
}

impl NumericVersion {
    /// Parse a version string. Returns `None` for test versions.
    ///
    /// ```
    /// use require_schema::version::NumericVersion;
    ///
    /// let v = NumericVersion::parse("1.2+").unwrap();
    /// assert_eq!((v.major, v.minor, v.patch, v.or_newer), (1, Some(2), None, true));
    /// assert!(NumericVersion::parse("test").is_none());
    /// assert!(NumericVersion::parse("1.2.3.4").is_none());
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        let (body, or_newer) = match s.strip_suffix('+') {
            Some(body) => (body, true),
            None => (s, false),
        };
        let mut parts = body.split('.');
        let major = parse_component(parts.next()?)?;
        let minor = match parts.next() {
            Some(p) => Some(parse_component(p)?),
            None => None,
        };
        let patch = match parts.next() {
            Some(p) => Some(parse_component(p)?),
            None => None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            major,
            minor,
            patch,
            or_newer,
        })
    }

    /// Components with missing parts read as zero, for ordering candidates.
    pub fn triple(&self) -> (u32, u32, u32) {
        (self.major, self.minor.unwrap_or(0), self.patch.unwrap_or(0))
    }
}

fn parse_component(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Whether a version string is numeric (a "release" rather than a test build).
pub fn is_numeric(version: &str) -> bool {
    NumericVersion::parse(version).is_some_and(|v| !v.or_newer)
}

/// Compare a `found` version against a `requested` version spec.
///
/// The request may be empty (anything goes, releases preferred), a literal
/// version, or a numeric version with a trailing `+`.
///
/// ```
/// use require_schema::version::{compare_versions, VersionMatch};
///
/// assert_eq!(compare_versions("1.2.3", "1.2.3+"), VersionMatch::Match);
/// assert_eq!(compare_versions("1.2.2", "1.2.3+"), VersionMatch::Mismatch);
/// assert_eq!(compare_versions("mybranch", ""), VersionMatch::TestVersion);
/// ```
pub fn compare_versions(found: &str, requested: &str) -> VersionMatch {
    if requested.is_empty() {
        return if is_numeric(found) {
            VersionMatch::Match
        } else {
            VersionMatch::TestVersion
        };
    }
    if found == requested {
        return VersionMatch::Exact;
    }

    let found_num = NumericVersion::parse(found).filter(|v| !v.or_newer);
    let (Some(found_num), Some(req)) = (found_num, NumericVersion::parse(requested)) else {
        if requested.ends_with('+') && found_num.is_none() {
            return VersionMatch::TestVersion;
        }
        return VersionMatch::Mismatch;
    };

    if found_num.major != req.major {
        return VersionMatch::Mismatch;
    }
    let Some(req_minor) = req.minor else {
        return VersionMatch::Match;
    };
    let found_minor = found_num.minor.unwrap_or(0);
    match found_minor.cmp(&req_minor) {
        Ordering::Less => return VersionMatch::Mismatch,
        // A newer minor line satisfies `+` only when a patch level was pinned:
        // `1.2+` stays within the 1.2 line.
        Ordering::Greater if req.patch.is_some() && req.or_newer => return VersionMatch::Match,
        Ordering::Greater => return VersionMatch::Higher,
        Ordering::Equal => {}
    }
    let Some(req_patch) = req.patch else {
        return VersionMatch::Match;
    };
    let found_patch = found_num.patch.unwrap_or(0);
    match found_patch.cmp(&req_patch) {
        Ordering::Less => VersionMatch::Mismatch,
        Ordering::Greater if req.or_newer => VersionMatch::Match,
        Ordering::Greater => VersionMatch::Higher,
        Ordering::Equal => VersionMatch::Match,
    }
}

/// Order two acceptable candidates of the same [`VersionMatch`] rank.
///
/// Releases beat test versions; among releases the larger triple wins;
/// test versions compare by name so that the choice is deterministic.
pub fn newer_candidate(a: &str, b: &str) -> Ordering {
    match (NumericVersion::parse(a), NumericVersion::parse(b)) {
        (Some(x), Some(y)) => x.triple().cmp(&y.triple()),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

/// A caller's version request, as accepted by the resolver's entry point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionSpec {
    /// No version given: any build, releases preferred over test builds.
    Any,
    /// A literal version or a numeric version ending in `+`.
    Request(String),
    /// `ifexists`: resolve if a build is loaded or available, otherwise
    /// succeed without loading anything.
    IfExists,
    /// `none`: skip resolution entirely.
    Skip,
}

impl VersionSpec {
    /// Parse the version argument of a require request.
    ///
    /// ```
    /// use require_schema::version::VersionSpec;
    ///
    /// assert_eq!(VersionSpec::parse(None), VersionSpec::Any);
    /// assert_eq!(VersionSpec::parse(Some("  ")), VersionSpec::Any);
    /// assert_eq!(VersionSpec::parse(Some("none")), VersionSpec::Skip);
    /// assert_eq!(VersionSpec::parse(Some("2.1+")), VersionSpec::Request("2.1+".into()));
    /// ```
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Self::Any,
            Some("ifexists") => Self::IfExists,
            Some("none") => Self::Skip,
            Some(v) => Self::Request(v.to_string()),
        }
    }

    /// The request string handed to [`compare_versions`].
    pub fn as_request(&self) -> &str {
        match self {
            Self::Request(v) => v,
            Self::Any | Self::IfExists | Self::Skip => "",
        }
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any version"),
            Self::Request(v) => f.write_str(v),
            Self::IfExists => f.write_str("ifexists"),
            Self::Skip => f.write_str("none"),
        }
    }
}
