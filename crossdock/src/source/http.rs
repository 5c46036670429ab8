//! HTTP-backed revision source.
//!
//! Fetches the head of a branch from a forge-style JSON API. The auth token
//! is looked up per request through the secret source, never held in the
//! trigger configuration.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::{RepoIdentity, Revision, RevisionSource};
use crate::errors::SourceError;
use crate::secrets::SecretSource;

#[derive(Debug, Deserialize)]
struct BranchHead {
    commit: CommitRef,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: String,
}

/// Revision source backed by a forge HTTP API.
pub struct HttpRevisionSource {
    identity: RepoIdentity,
    endpoint: String,
    token_secret: String,
    secrets: Arc<dyn SecretSource>,
    client: reqwest::Client,
}

impl HttpRevisionSource {
    /// Creates a source for `identity` against `endpoint`.
    ///
    /// `token_secret` names the secret holding the API token.
    #[must_use]
    pub fn new(
        identity: RepoIdentity,
        endpoint: impl Into<String>,
        token_secret: impl Into<String>,
        secrets: Arc<dyn SecretSource>,
    ) -> Self {
        Self {
            identity,
            endpoint: endpoint.into(),
            token_secret: token_secret.into(),
            secrets,
            client: reqwest::Client::new(),
        }
    }

    fn branch_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/branches/{}",
            self.endpoint, self.identity.owner, self.identity.repo, self.identity.branch
        )
    }
}

impl std::fmt::Debug for HttpRevisionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRevisionSource")
            .field("identity", &self.identity)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl RevisionSource for HttpRevisionSource {
    fn identity(&self) -> &RepoIdentity {
        &self.identity
    }

    async fn head(&self) -> Result<Revision, SourceError> {
        let token = self.secrets.secret(&self.token_secret)?;

        let response = self
            .client
            .get(self.branch_url())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SourceError::Unreachable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(SourceError::Auth(format!(
                "{} returned {}",
                self.identity,
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Unreachable(e.to_string()))?;
        let head: BranchHead = serde_json::from_slice(&body)
            .map_err(|e| SourceError::Unreachable(format!("malformed head response: {e}")))?;

        Ok(Revision {
            id: head.commit.sha,
            payload: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::StaticSecretSource;

    #[test]
    fn test_branch_url_shape() {
        let secrets = Arc::new(StaticSecretSource::new().with_secret("scm-token", "t"));
        let source = HttpRevisionSource::new(
            RepoIdentity::new("acme", "webapp", "main"),
            "https://forge.example.com",
            "scm-token",
            secrets,
        );

        assert_eq!(
            source.branch_url(),
            "https://forge.example.com/repos/acme/webapp/branches/main"
        );
    }

    #[tokio::test]
    async fn test_missing_token_fails_before_request() {
        let secrets = Arc::new(StaticSecretSource::new());
        let source = HttpRevisionSource::new(
            RepoIdentity::new("acme", "webapp", "main"),
            "https://forge.invalid",
            "scm-token",
            secrets,
        );

        let err = source.head().await.unwrap_err();
        assert!(matches!(err, SourceError::MissingSecret { .. }));
    }
}
