//! OSGi versions, version ranges and version masks.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{HeaderError, HeaderResult};

static VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,9})(\.(\d{1,9})(\.(\d{1,9})(\.([-\w]+))?)?)?$").expect("invalid version regex")
});

static VERSION_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([\[(])\s*([^,\s]+)\s*,\s*([^,\s\])]+)\s*([\])])\s*$").expect("invalid range regex")
});

static FUZZY_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^(\d+)(\.(\d+)(\.(\d+))?)?([^a-zA-Z0-9](.*))?$").expect("invalid fuzzy version regex")
});

static FUZZY_VERSION_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^(\(|\[)\s*([-\da-zA-Z.]+)\s*,\s*([-\da-zA-Z.]+)\s*(\]|\))$")
        .expect("invalid fuzzy range regex")
});

static FUZZY_MODIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^(\d+[.-])*(.*)$").expect("invalid fuzzy modifier regex"));

static RANGE_MASK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\[|\()([-+=~0-9]{0,3}[=~]?),([-+=~0-9]{0,3}[=~]?)(\]|\))$").expect("invalid range mask regex")
});

/// An OSGi version, `major.minor.micro.qualifier`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    pub qualifier: String,
}

impl Version {
    pub const LOWEST: Version = Version {
        major: 0,
        minor: 0,
        micro: 0,
        qualifier: String::new(),
    };

    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    /// Parses a strict OSGi version.
    pub fn parse(text: &str) -> HeaderResult<Self> {
        let text = text.trim();
        let caps = VERSION
            .captures(text)
            .ok_or_else(|| HeaderError::InvalidVersion(text.to_string()))?;
        let number = |i: usize| -> HeaderResult<u32> {
            caps.get(i)
                .map(|m| m.as_str().parse::<u32>())
                .transpose()
                .map(|n| n.unwrap_or(0))
                .map_err(|_| HeaderError::InvalidVersion(text.to_string()))
        };
        Ok(Self {
            major: number(1)?,
            minor: number(3)?,
            micro: number(5)?,
            qualifier: caps.get(7).map(|m| m.as_str().to_string()).unwrap_or_default(),
        })
    }

    pub fn is_version(text: &str) -> bool {
        VERSION.is_match(text.trim())
    }

    /// Component by position: 0 major, 1 minor, 2 micro.
    pub fn get(&self, position: usize) -> i64 {
        match position {
            0 => self.major as i64,
            1 => self.minor as i64,
            2 => self.micro as i64,
            _ => 0,
        }
    }

    /// The version without its qualifier.
    pub fn without_qualifier(&self) -> Version {
        Version::new(self.major, self.minor, self.micro)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.micro, &self.qualifier).cmp(&(
            other.major,
            other.minor,
            other.micro,
            &other.qualifier,
        ))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Version {
    type Err = HeaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

/// A version range such as `[1.2,2)`, or a bare version meaning "at least".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub floor_inclusive: bool,
    pub floor: Version,
    pub ceiling: Option<Version>,
    pub ceiling_inclusive: bool,
}

impl VersionRange {
    pub fn parse(text: &str) -> HeaderResult<Self> {
        if let Some(caps) = VERSION_RANGE.captures(text) {
            let floor = Version::parse(&caps[2])?;
            let ceiling = Version::parse(&caps[3])?;
            if ceiling < floor {
                return Err(HeaderError::InvalidRange(text.to_string()));
            }
            return Ok(Self {
                floor_inclusive: &caps[1] == "[",
                floor,
                ceiling: Some(ceiling),
                ceiling_inclusive: &caps[4] == "]",
            });
        }
        let floor = Version::parse(text).map_err(|_| HeaderError::InvalidRange(text.to_string()))?;
        Ok(Self {
            floor_inclusive: true,
            floor,
            ceiling: None,
            ceiling_inclusive: false,
        })
    }

    pub fn is_range(text: &str) -> bool {
        VersionRange::parse(text).is_ok()
    }

    pub fn includes(&self, version: &Version) -> bool {
        let above_floor = match version.cmp(&self.floor) {
            Ordering::Greater => true,
            Ordering::Equal => self.floor_inclusive,
            Ordering::Less => false,
        };
        let below_ceiling = match &self.ceiling {
            None => true,
            Some(ceiling) => match version.cmp(ceiling) {
                Ordering::Less => true,
                Ordering::Equal => self.ceiling_inclusive,
                Ordering::Greater => false,
            },
        };
        above_floor && below_ceiling
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ceiling {
            None => write!(f, "{}", self.floor),
            Some(ceiling) => write!(
                f,
                "{}{},{}{}",
                if self.floor_inclusive { '[' } else { '(' },
                self.floor,
                ceiling,
                if self.ceiling_inclusive { ']' } else { ')' }
            ),
        }
    }
}

/// Normalizes near-miss versions, `1.0-beta` becomes `1.0.0.beta`.
///
/// Valid versions and strings that cannot be repaired are returned as is.
pub fn cleanup_version(version: &str) -> String {
    let version = version.trim();
    if Version::is_version(version) {
        return version.to_string();
    }
    if let Some(caps) = FUZZY_VERSION_RANGE.captures(version) {
        return format!(
            "{}{},{}{}",
            &caps[1],
            cleanup_version(&caps[2]),
            cleanup_version(&caps[3]),
            &caps[4]
        );
    }
    let Some(caps) = FUZZY_VERSION.captures(version) else {
        return version.to_string();
    };

    let major = remove_leading_zeroes(&caps[1]);
    let minor = caps.get(3).map(|m| remove_leading_zeroes(m.as_str()));
    let micro = caps.get(5).map(|m| remove_leading_zeroes(m.as_str()));
    let qualifier = caps.get(7).map(|m| m.as_str());

    let mut result = major;
    match (minor, micro, qualifier) {
        (Some(minor), Some(micro), qualifier) => {
            result.push('.');
            result.push_str(&minor);
            result.push('.');
            result.push_str(&micro);
            if let Some(qualifier) = qualifier {
                result.push('.');
                cleanup_modifier(&mut result, qualifier);
            }
        }
        (Some(minor), None, qualifier) => {
            result.push('.');
            result.push_str(&minor);
            if let Some(qualifier) = qualifier {
                result.push_str(".0.");
                cleanup_modifier(&mut result, qualifier);
            }
        }
        (None, _, Some(qualifier)) => {
            result.push_str(".0.0.");
            cleanup_modifier(&mut result, qualifier);
        }
        (None, _, None) => {}
    }
    result
}

fn remove_leading_zeroes(number: &str) -> String {
    let trimmed = number.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn cleanup_modifier(result: &mut String, modifier: &str) {
    let modifier = FUZZY_MODIFIER
        .captures(modifier)
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str())
        .unwrap_or(modifier);
    result.extend(
        modifier
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-'),
    );
}

/// Applies a version mask such as `==+` to a version.
///
/// Position by position, `=` keeps the component, `+` increments it, `-`
/// decrements it, a digit replaces it and `~` drops it. A fourth position
/// keeps the qualifier.
pub fn apply_mask(mask: &str, version: &Version) -> String {
    let mut parts: Vec<String> = Vec::new();
    for (i, c) in mask.chars().enumerate() {
        if c == '~' {
            continue;
        }
        let part = if i == 3 {
            if version.qualifier.is_empty() {
                continue;
            }
            version.qualifier.clone()
        } else if c.is_ascii_digit() {
            c.to_string()
        } else {
            let mut x = version.get(i);
            match c {
                '+' => x += 1,
                '-' => x -= 1,
                _ => {}
            }
            x.to_string()
        };
        parts.push(part);
    }
    parts.join(".")
}

/// Builds a range from a range mask such as `[==,+)`.
///
/// # Example
///
/// ```rust
/// use bundlescope::header::version::{range_from_mask, Version};
///
/// let version = Version::parse("1.2.3").unwrap();
/// assert_eq!(range_from_mask("[==,+)", &version).unwrap(), "[1.2,2)");
/// assert_eq!(range_from_mask("[==,=+)", &version).unwrap(), "[1.2,1.3)");
/// ```
pub fn range_from_mask(mask: &str, version: &Version) -> HeaderResult<String> {
    let caps = RANGE_MASK
        .captures(mask.trim())
        .ok_or_else(|| HeaderError::InvalidRangeMask(mask.to_string()))?;
    let floor = apply_mask(&caps[2], version);
    let ceiling = apply_mask(&caps[3], version);
    let range = format!("{}{},{}{}", &caps[1], floor, ceiling, &caps[4]);
    VersionRange::parse(&range)?;
    Ok(range)
}
