//! Clients for the recommendation and moderation HTTP services.
//!
//! Both degrade instead of failing the request: an unreachable recommender
//! means a chronological feed, an unreachable moderator means the post is
//! held for review. There are no retries.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response from service: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Serialize)]
struct RecommendRequest {
    user_id: i64,
    limit: u32,
    offset: u32,
}

#[derive(Debug, Deserialize)]
struct RecommendResponse {
    post_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
struct ModerateRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ModerateResponse {
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

/// What to do with new content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Rejected(Option<String>),
    /// The service could not give an answer
    Unavailable,
}

pub struct ExternalServices {
    client: Client,
    recommender_url: String,
    moderation_url: String,
}

impl ExternalServices {
    pub fn new(recommender_url: impl Into<String>, moderation_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
            warn!("Falling back to default HTTP client: {}", e);
            Client::new()
        });

        Self {
            client,
            recommender_url: recommender_url.into(),
            moderation_url: moderation_url.into(),
        }
    }

    /// Personalized post ids for `user_id`, best first.
    pub async fn recommend(&self, user_id: i64, limit: u32, offset: u32) -> Result<Vec<i64>, ServiceError> {
        let response = self
            .client
            .post(&self.recommender_url)
            .json(&RecommendRequest { user_id, limit, offset })
            .send()
            .await?
            .error_for_status()?;

        let body: RecommendResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
        Ok(body.post_ids)
    }

    /// Ask the moderation service about `content`. Never fails: any
    /// transport or format problem becomes `Verdict::Unavailable`.
    pub async fn moderate(&self, content: &str) -> Verdict {
        match self.try_moderate(content).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!("Moderation service unavailable, holding content for review: {}", e);
                Verdict::Unavailable
            }
        }
    }

    async fn try_moderate(&self, content: &str) -> Result<Verdict, ServiceError> {
        let response = self
            .client
            .post(&self.moderation_url)
            .json(&ModerateRequest { content })
            .send()
            .await?
            .error_for_status()?;

        let body: ModerateResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;

        parse_verdict(body)
    }
}

fn parse_verdict(body: ModerateResponse) -> Result<Verdict, ServiceError> {
    match body.status.as_str() {
        "approved" => Ok(Verdict::Approved),
        "rejected" => Ok(Verdict::Rejected(body.reason)),
        other => Err(ServiceError::InvalidResponse(format!("unknown status '{}'", other))),
    }
}
