//! Core types for the location subsystem.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Top-level administrative division (e.g. "Metropolitana de Santiago").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub code: String,
    pub name: String,
}

/// Second-level division. Its code is only unique within the parent region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commune {
    pub code: String,
    pub name: String,
}

impl Region {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self { code: code.into(), name: name.into() }
    }
}

impl Commune {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self { code: code.into(), name: name.into() }
    }
}

/// Where a resolved list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationSource {
    Cache,
    Remote,
    Fallback,
    /// A single synthesized commune for a region the static table does not know.
    Placeholder,
    /// Nothing available and placeholders are disabled.
    Empty,
}

impl fmt::Display for LocationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "Cache"),
            Self::Remote => write!(f, "DPA"),
            Self::Fallback => write!(f, "Built-in"),
            Self::Placeholder => write!(f, "Placeholder"),
            Self::Empty => write!(f, "Empty"),
        }
    }
}

/// A list together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved<T> {
    pub items: Vec<T>,
    pub source: LocationSource,
}

impl<T> Resolved<T> {
    pub(crate) fn new(items: Vec<T>, source: LocationSource) -> Self {
        Self { items, source }
    }
}

/// A region/commune pair confirmed against the offered options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub region: Region,
    pub commune: Commune,
}

/// Remote source failures. These never leave the resolver; every variant
/// sends the lookup down the fallback path.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("invalid API response: {0}")]
    InvalidResponse(String),
    #[error("API returned an empty list")]
    Empty,
    #[error("remote source disabled (offline)")]
    Offline,
}

/// Why a submitted region/commune pair was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("no region selected")]
    MissingRegion,
    #[error("no commune selected")]
    MissingCommune,
    #[error("unknown region '{0}'")]
    UnknownRegion(String),
    #[error("commune '{commune}' is not offered for region '{region}'")]
    UnknownCommune { region: String, commune: String },
}
