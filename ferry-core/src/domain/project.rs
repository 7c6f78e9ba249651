//! Project domain types

use serde::{Deserialize, Serialize};

use crate::error::ResolutionError;

/// How the target project is identified
///
/// A numeric id is authoritative. A name has to be resolved to an id
/// through the registry's project search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectIdentity {
    Id(u64),
    Name(String),
}

impl ProjectIdentity {
    /// Builds an identity from the two optional configuration inputs
    ///
    /// The numeric id wins when both are present. A blank name counts as absent.
    pub fn from_parts(id: Option<u64>, name: Option<&str>) -> Result<Self, ResolutionError> {
        if let Some(id) = id {
            return Ok(Self::Id(id));
        }

        match name.map(str::trim) {
            Some(name) if !name.is_empty() => Ok(Self::Name(name.to_string())),
            _ => Err(ResolutionError::MissingIdentity),
        }
    }
}

impl std::fmt::Display for ProjectIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "#{}", id),
            Self::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// Project entry returned by the registry's project search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub path_with_namespace: Option<String>,
}

impl Project {
    /// Returns true if any of the project's names equals `term` exactly
    pub fn matches_exactly(&self, term: &str) -> bool {
        [&self.name, &self.path, &self.path_with_namespace]
            .into_iter()
            .flatten()
            .any(|candidate| candidate == term)
    }
}
