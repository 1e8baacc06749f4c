//! Async HTTP client for the Orrange REST API.

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use orrange_types::api::{
    BookmarkResponse, CreateCommentRequest, ErrorBody, LikeResponse, LoginRequest, LoginResponse,
};
use orrange_types::models::{Comment, Post};

/// Default server URL
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("Not logged in")]
    NotAuthenticated,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_URL)
    }
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Reuse a token from an earlier session.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Log in and keep the returned token for later calls.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<LoginResponse, ClientError> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let request = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&body);
        let response: LoginResponse = Self::send(request).await?;

        debug!("Logged in as {} ({})", response.username, response.user_id);
        self.token = Some(response.token.clone());
        Ok(response)
    }

    pub async fn feed(&self, page: u32, limit: u32) -> Result<Vec<Post>, ClientError> {
        let request = self
            .authed(Method::GET, "/api/posts")?
            .query(&[("page", page), ("limit", limit)]);
        Self::send(request).await
    }

    pub async fn toggle_like(&self, post_id: i64) -> Result<LikeResponse, ClientError> {
        let request = self.authed(Method::POST, &format!("/api/posts/{post_id}/like"))?;
        Self::send(request).await
    }

    pub async fn toggle_bookmark(&self, post_id: i64) -> Result<BookmarkResponse, ClientError> {
        let request = self.authed(Method::POST, &format!("/api/posts/{post_id}/bookmark"))?;
        Self::send(request).await
    }

    pub async fn add_comment(&self, post_id: i64, content: &str) -> Result<Comment, ClientError> {
        let body = CreateCommentRequest {
            content: content.to_string(),
        };
        let request = self
            .authed(Method::POST, &format!("/api/posts/{post_id}/comments"))?
            .json(&body);
        Self::send(request).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let token = self.token.as_deref().ok_or(ClientError::NotAuthenticated)?;
        Ok(self.http.request(method, self.url(path)).bearer_auth(token))
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Error bodies are `{message}`; fall back to the status text.
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.message,
            Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
        };
        Err(ClientError::Api { status, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn protected_calls_need_a_token() {
        let client = ApiClient::new("http://127.0.0.1:9/");
        assert!(matches!(client.feed(1, 20).await, Err(ClientError::NotAuthenticated)));
        assert!(matches!(client.toggle_like(1).await, Err(ClientError::NotAuthenticated)));
    }

    #[test]
    fn base_url_is_normalized() {
        let client = ApiClient::new("http://localhost:5000/").with_token("abc");
        assert_eq!(client.url("/api/posts"), "http://localhost:5000/api/posts");
        assert_eq!(client.token(), Some("abc"));
    }
}
