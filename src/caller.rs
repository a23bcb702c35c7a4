use serde::{Deserialize, Serialize};

/// Identity and credentials supplied by the caller for one request.
///
/// The engine never reads process-wide session state; whatever the
/// transport layer authenticated is passed in explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallerContext {
    /// Opaque caller identity, used for logging.
    pub caller_id: Option<String>,
    /// Token for the versioned-repository service, forwarded when fetching
    /// commit evidence.
    #[serde(skip_serializing)]
    pub repository_token: Option<String>,
}

impl CallerContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_repository_token(mut self, token: impl Into<String>) -> Self {
        self.repository_token = Some(token.into());
        self
    }

    pub fn caller(&self) -> &str {
        self.caller_id.as_deref().unwrap_or("anonymous")
    }
}
