//! Semantic version triple and bump rules.
//!
//! Versions are parsed strictly: only `X.Y.Z` with ASCII digits is accepted.
//! Anything else is a [`VersionError::Format`], never a best-effort coercion.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

static STRICT_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+$").expect("valid version regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("malformed version '{found}' in {origin} (expected X.Y.Z)")]
    Format { origin: String, found: String },
    #[error("no version assignment found in {0}")]
    NoAssignment(String),
    #[error("invalid version argument '{0}' (expected patch, minor, major, or X.Y.Z)")]
    InvalidBump(String),
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },
    #[error("cannot apply a {kind} bump to {version}: component out of range")]
    Overflow { version: String, kind: String },
}

/// A `major.minor.patch` version. Field order gives the lexicographic `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a version token, attributing failures to `origin` (usually a file path).
    pub fn parse_from(input: &str, origin: &str) -> Result<Self, VersionError> {
        let format_err = || VersionError::Format {
            origin: origin.to_owned(),
            found: input.to_owned(),
        };

        if !STRICT_VERSION.is_match(input) {
            return Err(format_err());
        }

        let mut parts = input.split('.').map(str::parse::<u64>);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(Ok(major)), Some(Ok(minor)), Some(Ok(patch))) => {
                Ok(Self::new(major, minor, patch))
            }
            // digits-only but out of u64 range
            _ => Err(format_err()),
        }
    }

    /// Derive the next version. Fails when the bumped component is already `u64::MAX`.
    pub fn bump(self, kind: BumpKind) -> Result<Self, VersionError> {
        let next = |n: u64| {
            n.checked_add(1).ok_or_else(|| VersionError::Overflow {
                version: self.to_string(),
                kind: kind.to_string(),
            })
        };
        match kind {
            BumpKind::Patch => Ok(Self::new(self.major, self.minor, next(self.patch)?)),
            BumpKind::Minor => Ok(Self::new(self.major, next(self.minor)?, 0)),
            BumpKind::Major => Ok(Self::new(next(self.major)?, 0, 0)),
            BumpKind::Explicit(v) => Ok(v),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_from(s, "input")
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How the next version is derived from the current one.
///
/// `Explicit` replaces the version verbatim. No ordering check is made, so an
/// explicit version may repeat or move backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BumpKind {
    #[default]
    Patch,
    Minor,
    Major,
    Explicit(Version),
}

impl FromStr for BumpKind {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "patch" => Ok(Self::Patch),
            "minor" => Ok(Self::Minor),
            "major" => Ok(Self::Major),
            _ => Version::parse_from(trimmed, "version argument")
                .map(Self::Explicit)
                .map_err(|_| VersionError::InvalidBump(s.to_owned())),
        }
    }
}

impl fmt::Display for BumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patch => f.write_str("patch"),
            Self::Minor => f.write_str("minor"),
            Self::Major => f.write_str("major"),
            Self::Explicit(v) => write!(f, "{v}"),
        }
    }
}
