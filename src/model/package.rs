//! Package identity for dependency analysis.

use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use packageurl::PackageUrl;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{DepscanError, Result, ValidationErrorKind};

/// A package reference extracted from an SBOM, identified by purl.
///
/// Equality and hashing use the namespace-qualified `name` only. Two
/// versions of the same package compare equal; contexts that must keep
/// distinct versions apart (the dependency tree, issue maps, cache keys)
/// key by the full [`PackageRef::ref_str`] string instead.
#[derive(Clone)]
pub struct PackageRef {
    purl: String,
    name: String,
    version: String,
}

impl PackageRef {
    /// Parse a purl string into a package reference.
    ///
    /// The purl must carry both a name and a version; anything else cannot
    /// be matched against vulnerability data.
    pub fn parse(locator: &str) -> Result<Self> {
        let purl = PackageUrl::from_str(locator).map_err(|e| invalid_purl(locator, e))?;
        let version = purl
            .version()
            .ok_or_else(|| invalid_purl(locator, "missing version"))?
            .to_string();
        let name = match purl.namespace() {
            Some(ns) => format!("{ns}:{}", purl.name()),
            None => purl.name().to_string(),
        };
        Ok(Self {
            purl: purl.to_string(),
            name,
            version,
        })
    }

    /// Build a synthetic `pkg:generic` reference for components without a purl.
    pub fn generic(name: &str, version: &str) -> Result<Self> {
        Self::parse(&format!("pkg:generic/{name}@{version}"))
    }

    /// The canonical purl string. This is the identity used as a map and
    /// cache key, and the coordinate sent to providers.
    #[must_use]
    pub fn ref_str(&self) -> &str {
        &self.purl
    }

    /// Namespace-qualified package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The `name@version` short form.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

fn invalid_purl(locator: &str, reason: impl ToString) -> DepscanError {
    DepscanError::validation(
        "parsing package reference",
        ValidationErrorKind::InvalidPurl {
            purl: locator.to_string(),
            reason: reason.to_string(),
        },
    )
}

impl PartialEq for PackageRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for PackageRef {}

impl Hash for PackageRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Display for PackageRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.purl)
    }
}

impl Debug for PackageRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.purl)
    }
}

impl Serialize for PackageRef {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.purl)
    }
}

impl<'de> Deserialize<'de> for PackageRef {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(PackageRefVisitor)
    }
}

struct PackageRefVisitor;

impl Visitor<'_> for PackageRefVisitor {
    type Value = PackageRef;

    fn expecting(&self, formatter: &mut Formatter) -> fmt::Result {
        formatter.write_str("a purl string")
    }

    fn visit_str<E>(self, v: &str) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        PackageRef::parse(v).map_err(E::custom)
    }
}

impl FromStr for PackageRef {
    type Err = DepscanError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
