use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A project idea being turned into a roadmap.
///
/// Title and description are fixed once refinement starts. The optional
/// `repository` names where commit evidence for progress checks comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub repository: Option<RepositoryRef>,
    pub created_at: DateTime<Utc>,
}

/// A versioned repository in `owner/name` form.
///
/// Serialized as the plain `owner/name` string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
}

impl RepositoryRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepositoryRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner, name) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("repository must be 'owner/name', got '{}'", s))?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(format!("repository must be 'owner/name', got '{}'", s));
        }
        Ok(Self::new(owner, name))
    }
}

impl TryFrom<String> for RepositoryRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RepositoryRef> for String {
    fn from(value: RepositoryRef) -> Self {
        value.to_string()
    }
}

/// Input for creating a new project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectInput {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub repository: Option<RepositoryRef>,
}

/// Input for attaching (or replacing) the evidence repository of a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRepositoryInput {
    pub repository: RepositoryRef,
}

/// Difficulty level requested from the idea generator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IdeaLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl IdeaLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

/// Input for asking the generator for a fresh project idea.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestIdeaInput {
    #[serde(default)]
    pub level: IdeaLevel,
}

/// A generated project idea. Not persisted until the user creates a project from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectIdea {
    pub title: String,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_ref_parses_owner_and_name() {
        let repo: RepositoryRef = "rocket-tycoon/roadmapper".parse().unwrap();
        assert_eq!(repo.owner, "rocket-tycoon");
        assert_eq!(repo.name, "roadmapper");
        assert_eq!(repo.to_string(), "rocket-tycoon/roadmapper");
    }

    #[test]
    fn repository_ref_rejects_malformed_values() {
        assert!("no-slash".parse::<RepositoryRef>().is_err());
        assert!("/name".parse::<RepositoryRef>().is_err());
        assert!("owner/".parse::<RepositoryRef>().is_err());
        assert!("a/b/c".parse::<RepositoryRef>().is_err());
    }

    #[test]
    fn repository_ref_serializes_as_string() {
        let json = serde_json::to_string(&RepositoryRef::new("a", "b")).unwrap();
        assert_eq!(json, "\"a/b\"");
        let back: RepositoryRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RepositoryRef::new("a", "b"));
    }
}
