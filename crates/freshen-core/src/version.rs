//! Four-part dotted release versions (`major.minor.revision.build`).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const COMPONENTS: usize = 4;

/// A release version compared component by component.
///
/// Parsing never fails: unparseable components read as `0` and missing
/// trailing components default to `0`, so `"1.0"` equals `"1.0.0.0"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VersionTag {
    major: u32,
    minor: u32,
    revision: u32,
    build: u32,
}

impl VersionTag {
    #[must_use]
    pub const fn new(major: u32, minor: u32, revision: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            revision,
            build,
        }
    }

    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut parts = [0_u32; COMPONENTS];
        for (slot, component) in parts.iter_mut().zip(text.split('.')) {
            *slot = component.trim().parse().unwrap_or(0);
        }
        let [major, minor, revision, build] = parts;
        Self::new(major, minor, revision, build)
    }

    #[must_use]
    pub const fn major(&self) -> u32 {
        self.major
    }

    #[must_use]
    pub const fn minor(&self) -> u32 {
        self.minor
    }

    #[must_use]
    pub const fn revision(&self) -> u32 {
        self.revision
    }

    #[must_use]
    pub const fn build(&self) -> u32 {
        self.build
    }

    #[must_use]
    pub fn compare_to(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    #[must_use]
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.compare_to(other) == Ordering::Greater
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.revision, self.build
        )
    }
}

impl FromStr for VersionTag {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl Serialize for VersionTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::parse(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_comparison() {
        let v = VersionTag::parse;
        assert!(v("1.2.3.4").is_newer_than(&v("1.2.3.3")));
        assert!(v("2.0.0.0").is_newer_than(&v("1.9.9.9")));
        assert!(v("1.1").is_newer_than(&v("1.0.99.99")));
        assert!(v("1.0.0.10").is_newer_than(&v("1.0.0.9")));
        assert!(!v("1.0").is_newer_than(&v("1.0.0.0")));
        assert!(!v("1.0.0.0").is_newer_than(&v("1.0")));
        assert!(!v("0.9.9.9").is_newer_than(&v("1.0.0.0")));
    }

    #[test]
    fn missing_components_default_to_zero() {
        assert_eq!(VersionTag::parse("3"), VersionTag::new(3, 0, 0, 0));
        assert_eq!(VersionTag::parse("3.1"), VersionTag::parse("3.1.0.0"));
        assert_eq!(VersionTag::parse(""), VersionTag::default());
    }

    #[test]
    fn unparseable_components_read_as_zero() {
        assert_eq!(VersionTag::parse("1.x.3.4"), VersionTag::new(1, 0, 3, 4));
        assert_eq!(VersionTag::parse("-1.2"), VersionTag::new(0, 2, 0, 0));
        assert_eq!(VersionTag::parse("1.2.3-beta"), VersionTag::new(1, 2, 0, 0));
        assert_eq!(VersionTag::parse(" 4 . 5 "), VersionTag::new(4, 5, 0, 0));
    }

    #[test]
    fn components_beyond_four_are_ignored() {
        assert_eq!(VersionTag::parse("1.2.3.4.5.6"), VersionTag::new(1, 2, 3, 4));
    }

    #[test]
    fn compare_to_reports_all_orderings() {
        let low = VersionTag::parse("1.2.3.4");
        let high = VersionTag::parse("1.2.4");
        assert_eq!(low.compare_to(&high), Ordering::Less);
        assert_eq!(high.compare_to(&low), Ordering::Greater);
        assert_eq!(low.compare_to(&VersionTag::new(1, 2, 3, 4)), Ordering::Equal);
    }

    #[test]
    fn display_always_renders_four_components() {
        assert_eq!(VersionTag::parse("7.1").to_string(), "7.1.0.0");
    }

    #[test]
    fn serde_uses_dotted_string() {
        let json = serde_json::to_string(&VersionTag::new(1, 0, 0, 1))
            .expect("version should serialize");
        assert_eq!(json, "\"1.0.0.1\"");

        let parsed: VersionTag =
            serde_json::from_str("\"2.5\"").expect("version string should deserialize");
        assert_eq!(parsed, VersionTag::new(2, 5, 0, 0));
    }
}
