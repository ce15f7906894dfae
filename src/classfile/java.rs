//! Mapping from class-file major versions to OSGi execution environments.

use std::fmt;

/// First major version in the table, `JRE-1.1`.
pub const FIRST_MAJOR: u16 = 45;
/// Last major version with a known execution environment.
pub const LAST_KNOWN_MAJOR: u16 = 94;

const KNOWN: usize = (LAST_KNOWN_MAJOR - FIRST_MAJOR + 1) as usize;

/// Execution environment implied by a class-file major version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExecutionEnvironment {
    /// Position in the known table, 0 for `JRE-1.1`.
    Known(u16),
    Unknown,
}

impl ExecutionEnvironment {
    pub fn from_major(major: u16) -> Self {
        if (FIRST_MAJOR..=LAST_KNOWN_MAJOR).contains(&major) {
            ExecutionEnvironment::Known(major - FIRST_MAJOR)
        } else {
            ExecutionEnvironment::Unknown
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ExecutionEnvironment::Unknown)
    }

    pub fn major(&self) -> Option<u16> {
        match self {
            ExecutionEnvironment::Known(ordinal) => Some(ordinal + FIRST_MAJOR),
            ExecutionEnvironment::Unknown => None,
        }
    }

    /// Execution environment name, e.g. `JavaSE-1.8` or `JavaSE-17`.
    pub fn name(&self) -> String {
        match self {
            ExecutionEnvironment::Known(0) => "JRE-1.1".to_string(),
            ExecutionEnvironment::Known(n @ 1..=4) => format!("J2SE-1.{}", n + 1),
            ExecutionEnvironment::Known(n @ 5..=7) => format!("JavaSE-1.{}", n + 1),
            ExecutionEnvironment::Known(n) => format!("JavaSE-{}", n + 1),
            ExecutionEnvironment::Unknown => "<UNKNOWN>".to_string(),
        }
    }

    /// The `osgi.ee` requirement filter for this environment.
    pub fn filter(&self) -> String {
        match self {
            ExecutionEnvironment::Known(0) => "(&(osgi.ee=JRE)(version=1.1))".to_string(),
            ExecutionEnvironment::Known(n @ 1..=7) => ee_filter(&format!("1.{}", n + 1)),
            ExecutionEnvironment::Known(n) => ee_filter(&(n + 1).to_string()),
            ExecutionEnvironment::Unknown => "(osgi.ee=UNKNOWN)".to_string(),
        }
    }
}

impl fmt::Display for ExecutionEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn ee_filter(version: &str) -> String {
    format!("(&(osgi.ee=JavaSE)(version={version}))")
}

/// Builds an `osgi.ee` filter for any major version.
///
/// Majors past the known table still get a deterministic `JavaSE` filter
/// whose version is the distance from major 45.
///
/// # Example
///
/// ```rust
/// use bundlescope::classfile::java::lenient_filter;
///
/// assert_eq!(lenient_filter(52), "(&(osgi.ee=JavaSE)(version=1.8))");
/// assert_eq!(lenient_filter(10000), "(&(osgi.ee=JavaSE)(version=9955))");
/// ```
pub fn lenient_filter(major: u32) -> String {
    let version = major as i64 - FIRST_MAJOR as i64;
    if version < 0 {
        ee_filter("UNKNOWN")
    } else if version >= KNOWN as i64 {
        ee_filter(&version.to_string())
    } else {
        ExecutionEnvironment::Known(version as u16).filter()
    }
}
