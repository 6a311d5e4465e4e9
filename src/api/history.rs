//! Chat history and read-receipt endpoints

use async_trait::async_trait;
use serde::Serialize;

use super::client::{check_response, ApiClient};
use super::ChatHistoryApi;
use crate::error::{ChatError, Result};
use crate::models::{ChatMessage, UserType};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkReadRequest<'a> {
    receiver_id: &'a str,
    receiver_type: UserType,
    sender_id: &'a str,
    sender_type: UserType,
}

/// Stateless helpers over `/chat/*`.
#[derive(Clone)]
pub struct HistoryClient {
    api: ApiClient,
}

impl HistoryClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ChatHistoryApi for HistoryClient {
    async fn get_chat_history(
        &self,
        self_id: &str,
        self_type: UserType,
        other_id: &str,
        other_type: UserType,
    ) -> Result<Vec<ChatMessage>> {
        let resp = self
            .api
            .get(
                "/chat/history",
                &[
                    ("userId1", self_id),
                    ("userType1", self_type.as_str()),
                    ("userId2", other_id),
                    ("userType2", other_type.as_str()),
                ],
            )
            .await?;
        let resp = check_response(resp).await?;
        let url = resp.url().to_string();

        resp.json()
            .await
            .map_err(|e| ChatError::network(&url, format!("invalid history payload: {}", e)))
    }

    async fn mark_as_read(
        &self,
        receiver_id: &str,
        receiver_type: UserType,
        sender_id: &str,
        sender_type: UserType,
    ) -> Result<()> {
        let body = MarkReadRequest {
            receiver_id,
            receiver_type,
            sender_id,
            sender_type,
        };
        let resp = self.api.post_json("/chat/read", &body).await?;
        check_response(resp).await?;
        Ok(())
    }
}
