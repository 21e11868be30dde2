use std::fmt;

use serde::{Deserialize, Serialize};

pub fn normalize(raw: Option<&str>) -> String {
    raw.map(|value| value.trim().to_uppercase())
        .unwrap_or_default()
}

pub fn is_valid(raw: Option<&str>) -> bool {
    !normalize(raw).is_empty()
}

/// Officer identifier (RCN) in normalized form. An empty value means no
/// officer is signed in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfficerId(String);

impl OfficerId {
    pub fn new(raw: &str) -> Self {
        Self(normalize(Some(raw)))
    }

    pub fn unset() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unset(&self) -> bool {
        self.0.is_empty()
    }

    /// True when both sides are set and equal after normalization.
    pub fn matches(&self, other: &str) -> bool {
        let other = normalize(Some(other));
        !self.is_unset() && !other.is_empty() && self.0 == other
    }
}

impl fmt::Display for OfficerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Option<&str>> for OfficerId {
    fn from(raw: Option<&str>) -> Self {
        Self(normalize(raw))
    }
}
