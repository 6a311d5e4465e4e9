//! Attachment upload, download and metadata endpoints

use async_trait::async_trait;
use base64::Engine;

use super::client::{check_response, ApiClient};
use super::FileApi;
use crate::error::{ChatError, Result};
use crate::models::{ChatFile, UploadRequest, UploadResponse, UserType};

const UPLOAD_FALLBACK: &str = "Failed to upload file";

/// Stateless helpers over `/files/*`.
#[derive(Clone)]
pub struct FileClient {
    api: ApiClient,
    max_upload_bytes: u64,
}

impl FileClient {
    pub fn new(api: ApiClient, max_upload_bytes: u64) -> Self {
        Self {
            api,
            max_upload_bytes,
        }
    }
}

#[async_trait]
impl FileApi for FileClient {
    async fn upload_file(
        &self,
        file_name: &str,
        data: &[u8],
        uploader_id: &str,
        uploader_type: UserType,
        description: Option<&str>,
    ) -> Result<UploadResponse> {
        if data.len() as u64 > self.max_upload_bytes {
            return Err(ChatError::Upload(format!(
                "{} is {}, the limit is {}",
                file_name,
                format_file_size(data.len() as u64),
                format_file_size(self.max_upload_bytes)
            )));
        }

        let body = UploadRequest {
            file_name: file_name.to_string(),
            file_data: base64::engine::general_purpose::STANDARD.encode(data),
            uploader_id: uploader_id.to_string(),
            uploader_type,
            description: description.map(String::from),
        };

        let resp = self.api.post_json("/files/upload", &body).await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let parsed: Option<UploadResponse> = serde_json::from_str(&text).ok();

        match parsed {
            Some(result) if status.is_success() && result.success => {
                tracing::info!(
                    "Uploaded {} as file {}",
                    file_name,
                    result.file_id.unwrap_or_default()
                );
                Ok(result)
            }
            Some(result) => Err(ChatError::Upload(
                result
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| UPLOAD_FALLBACK.to_string()),
            )),
            None => Err(ChatError::Upload(UPLOAD_FALLBACK.to_string())),
        }
    }

    async fn download_file(&self, file_id: i64) -> Result<Vec<u8>> {
        let resp = self
            .api
            .get(&format!("/files/download/{}", file_id), &[])
            .await?;
        if !resp.status().is_success() {
            return Err(ChatError::NotFound(format!("file {}", file_id)));
        }
        let url = resp.url().to_string();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ChatError::network(&url, e))?;
        Ok(bytes.to_vec())
    }

    async fn get_file_info(&self, file_id: i64) -> Result<ChatFile> {
        let resp = self.api.get(&format!("/files/{}", file_id), &[]).await?;
        if !resp.status().is_success() {
            return Err(ChatError::NotFound(format!("file {}", file_id)));
        }
        let url = resp.url().to_string();
        resp.json()
            .await
            .map_err(|e| ChatError::network(&url, format!("invalid file info: {}", e)))
    }

    async fn list_files(&self, uploader: Option<(&str, UserType)>) -> Result<Vec<ChatFile>> {
        let query: Vec<(&str, &str)> = match uploader {
            Some((id, user_type)) => {
                vec![("uploaderId", id), ("uploaderType", user_type.as_str())]
            }
            None => Vec::new(),
        };
        let resp = check_response(self.api.get("/files/list", &query).await?).await?;
        let url = resp.url().to_string();
        resp.json()
            .await
            .map_err(|e| ChatError::network(&url, format!("invalid file list: {}", e)))
    }

    async fn delete_file(&self, file_id: i64) -> Result<()> {
        let resp = self.api.delete(&format!("/files/{}", file_id)).await?;
        check_response(resp).await?;
        Ok(())
    }
}

/// Human-readable size in 1024-based units with at most two decimals,
/// e.g. `2500000` → `"2.38 MB"`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    let mut scale = 1u64;
    while unit + 1 < UNITS.len() && bytes >= scale * 1024 {
        scale *= 1024;
        unit += 1;
    }

    let value = format!("{:.2}", bytes as f64 / scale as f64);
    let value = value.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::super::test_http::TestHttp;
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(2_500_000), "2.38 MB");
        assert_eq!(format_file_size(5 * 1024 * 1024 * 1024), "5 GB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024 * 1024), "3072 GB");
    }

    #[tokio::test]
    async fn test_upload_encodes_base64() {
        let mut server = TestHttp::json(
            200,
            serde_json::json!({
                "success": true,
                "fileId": 10,
                "fileName": "notes.txt",
                "fileSize": 5,
                "message": "File uploaded successfully"
            }),
        )
        .await;
        let client = FileClient::new(ApiClient::new(&server.base_url, None), 1024);

        let result = client
            .upload_file("notes.txt", b"hello", "M1", UserType::Member, Some("draft"))
            .await
            .unwrap();
        assert_eq!(result.file_id, Some(10));

        let req = server.next_request().await;
        assert_eq!(req.target, "/api/files/upload");
        let body = req.json();
        assert_eq!(body["fileName"], "notes.txt");
        assert_eq!(body["fileData"], "aGVsbG8=");
        assert_eq!(body["uploaderType"], "MEMBER");
        assert_eq!(body["description"], "draft");
    }

    #[tokio::test]
    async fn test_upload_surfaces_server_message() {
        let server = TestHttp::json(
            500,
            serde_json::json!({"success": false, "message": "FTP server unreachable"}),
        )
        .await;
        let client = FileClient::new(ApiClient::new(&server.base_url, None), 1024);

        let err = client
            .upload_file("a.pdf", b"%PDF", "42", UserType::Admin, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "FTP server unreachable");
    }

    #[tokio::test]
    async fn test_upload_generic_fallback() {
        let server = TestHttp::serve(vec![(
            400,
            "text/plain",
            b"Missing required parameters".to_vec(),
        )])
        .await;
        let client = FileClient::new(ApiClient::new(&server.base_url, None), 1024);

        let err = client
            .upload_file("a.pdf", b"%PDF", "42", UserType::Admin, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), UPLOAD_FALLBACK);
    }

    #[tokio::test]
    async fn test_oversized_upload_never_hits_network() {
        let client = FileClient::new(ApiClient::new("http://127.0.0.1:9/api", None), 4);
        let err = client
            .upload_file("big.bin", b"12345", "42", UserType::Admin, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Upload(_)));
    }

    #[tokio::test]
    async fn test_download_and_info_not_found() {
        let server = TestHttp::serve(vec![
            (404, "text/plain", b"File not found".to_vec()),
            (404, "text/plain", b"File not found".to_vec()),
        ])
        .await;
        let client = FileClient::new(ApiClient::new(&server.base_url, None), 1024);

        assert!(matches!(
            client.download_file(3).await,
            Err(ChatError::NotFound(_))
        ));
        assert!(matches!(
            client.get_file_info(3).await,
            Err(ChatError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_download_returns_bytes() {
        let mut server =
            TestHttp::serve(vec![(200, "application/octet-stream", vec![0, 159, 146, 150])]).await;
        let client = FileClient::new(ApiClient::new(&server.base_url, None), 1024);

        assert_eq!(client.download_file(7).await.unwrap(), vec![0, 159, 146, 150]);
        assert_eq!(server.next_request().await.target, "/api/files/download/7");
    }

    #[tokio::test]
    async fn test_list_files_filter_only_with_both_parts() {
        let mut server = TestHttp::serve(vec![
            (200, "application/json", b"[]".to_vec()),
            (200, "application/json", b"[]".to_vec()),
        ])
        .await;
        let client = FileClient::new(ApiClient::new(&server.base_url, None), 1024);

        client.list_files(None).await.unwrap();
        assert_eq!(server.next_request().await.target, "/api/files/list");

        client
            .list_files(Some(("M1", UserType::Member)))
            .await
            .unwrap();
        assert_eq!(
            server.next_request().await.target,
            "/api/files/list?uploaderId=M1&uploaderType=MEMBER"
        );
    }
}
