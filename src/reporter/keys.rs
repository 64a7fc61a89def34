//! Correlation identities: spec keys derived from degraded runner metadata and
//! full titles derived from nested title paths.

use serde::{Deserialize, Deserializer};
use std::fmt;

pub const UNKNOWN_SPEC: &str = "unknown.spec";
pub const TITLE_SEPARATOR: &str = " > ";
const DEFAULT_TITLE: &str = "test";

/// Stable identifier of a spec file. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpecKey(String);

impl SpecKey {
    /// First non-blank of relative path, name, and absolute path, else `unknown.spec`.
    pub fn derive(relative: Option<&str>, name: Option<&str>, absolute: Option<&str>) -> Self {
        let key = [relative, name, absolute]
            .into_iter()
            .flatten()
            .find(|candidate| !candidate.trim().is_empty())
            .unwrap_or(UNKNOWN_SPEC);
        Self(key.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SpecKey {
    fn from(value: &str) -> Self {
        Self::derive(Some(value), None, None)
    }
}

impl fmt::Display for SpecKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered segments of a test's nested describe/it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitlePath(Vec<String>);

impl Default for TitlePath {
    fn default() -> Self {
        Self(vec![DEFAULT_TITLE.to_owned()])
    }
}

impl TitlePath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Innermost segment, or `test` for an empty path.
    pub fn title(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or(DEFAULT_TITLE)
    }

    pub fn full_title(&self) -> String {
        self.0.join(TITLE_SEPARATOR)
    }
}

impl<'de> Deserialize<'de> for TitlePath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawTitle {
            Path(Vec<String>),
            Single(String),
        }

        Ok(match Option::<RawTitle>::deserialize(deserializer)? {
            Some(RawTitle::Path(segments)) => Self(segments),
            Some(RawTitle::Single(title)) => Self(vec![title]),
            None => Self::default(),
        })
    }
}

/// Correlation identity of a case: its spec key and full title.
///
/// Kept as a structured pair so spec keys or titles containing any separator
/// character cannot collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaseKey {
    pub spec: SpecKey,
    pub full_title: String,
}

impl CaseKey {
    pub fn new(spec: SpecKey, full_title: impl Into<String>) -> Self {
        Self {
            spec,
            full_title: full_title.into(),
        }
    }
}

impl fmt::Display for CaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.spec, self.full_title)
    }
}
