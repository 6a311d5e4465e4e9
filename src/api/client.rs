//! Authenticated HTTP client for the library REST API
//!
//! Wraps reqwest::Client with base-URL resolution and bearer token injection.

use serde::Serialize;

use crate::config::Config;
use crate::error::{ChatError, Result};

/// Client for the chat history and file endpoints.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, bearer_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.server.api_base_url.clone(),
            config.server.bearer_token.clone(),
        )
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// GET `path` with query parameters. Status is not checked.
    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        let url = self.url(path);
        tracing::debug!("GET {}", url);

        self.authorize(self.http.get(&url).query(query))
            .send()
            .await
            .map_err(|e| ChatError::network(&url, e))
    }

    /// POST a JSON body to `path`. Status is not checked.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        let url = self.url(path);
        tracing::debug!("POST {}", url);

        self.authorize(self.http.post(&url).json(body))
            .send()
            .await
            .map_err(|e| ChatError::network(&url, e))
    }

    /// DELETE `path`. Status is not checked.
    pub async fn delete(&self, path: &str) -> Result<reqwest::Response> {
        let url = self.url(path);
        tracing::debug!("DELETE {}", url);

        self.authorize(self.http.delete(&url))
            .send()
            .await
            .map_err(|e| ChatError::network(&url, e))
    }
}

/// Turn a non-success status into a network error carrying the body.
pub async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if !status.is_success() {
        let url = resp.url().to_string();
        let body = resp.text().await.unwrap_or_default();
        return Err(ChatError::network(
            &url,
            format!("HTTP {}: {}", status.as_u16(), body.trim()),
        ));
    }
    Ok(resp)
}
