//! REST clients for the chat history and attachment endpoints

pub mod client;
pub mod files;
pub mod history;

#[cfg(test)]
pub(crate) mod test_http;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::conversation::grouping::{group_by_day, message_line};
use crate::error::Result as ChatResult;
use crate::models::{ChatFile, ChatMessage, UploadResponse, UserType};
pub use client::ApiClient;
pub use files::{format_file_size, FileClient};
pub use history::HistoryClient;

/// Conversation history and read receipts.
#[async_trait]
pub trait ChatHistoryApi: Send + Sync {
    /// Full ordered conversation between two identities.
    async fn get_chat_history(
        &self,
        self_id: &str,
        self_type: UserType,
        other_id: &str,
        other_type: UserType,
    ) -> ChatResult<Vec<ChatMessage>>;

    /// Mark everything `sender` sent to `receiver` as read.
    async fn mark_as_read(
        &self,
        receiver_id: &str,
        receiver_type: UserType,
        sender_id: &str,
        sender_type: UserType,
    ) -> ChatResult<()>;
}

/// Attachment storage.
#[async_trait]
pub trait FileApi: Send + Sync {
    async fn upload_file(
        &self,
        file_name: &str,
        data: &[u8],
        uploader_id: &str,
        uploader_type: UserType,
        description: Option<&str>,
    ) -> ChatResult<UploadResponse>;

    async fn download_file(&self, file_id: i64) -> ChatResult<Vec<u8>>;

    async fn get_file_info(&self, file_id: i64) -> ChatResult<ChatFile>;

    /// All files, or only `uploader`'s.
    async fn list_files(&self, uploader: Option<(&str, UserType)>) -> ChatResult<Vec<ChatFile>>;

    async fn delete_file(&self, file_id: i64) -> ChatResult<()>;
}

fn file_client(config: &Config) -> FileClient {
    FileClient::new(ApiClient::from_config(config), config.chat.max_upload_bytes)
}

/// Print the conversation between two identities (stdout).
pub async fn show_history(
    config: &Config,
    self_id: &str,
    self_type: UserType,
    other_id: &str,
    other_type: UserType,
) -> Result<()> {
    let client = HistoryClient::new(ApiClient::from_config(config));
    let messages = client
        .get_chat_history(self_id, self_type, other_id, other_type)
        .await
        .context("Failed to fetch chat history")?;

    println!(
        "\nConversation {} {} <-> {} {}",
        self_type, self_id, other_type, other_id
    );
    println!("{:-<60}", "");

    if messages.is_empty() {
        println!("  (no messages)");
        return Ok(());
    }

    let today = chrono::Local::now().date_naive();
    for group in group_by_day(&messages, today) {
        println!("\n[{}]", group.label);
        for msg in &group.messages {
            println!("{}", message_line(msg));
        }
    }

    Ok(())
}

/// Mark messages as read and report the outcome.
pub async fn mark_read(
    config: &Config,
    receiver_id: &str,
    receiver_type: UserType,
    sender_id: &str,
    sender_type: UserType,
) -> Result<()> {
    let client = HistoryClient::new(ApiClient::from_config(config));
    client
        .mark_as_read(receiver_id, receiver_type, sender_id, sender_type)
        .await
        .context("Failed to mark messages as read")?;
    println!(
        "Marked messages from {} {} to {} {} as read.",
        sender_type, sender_id, receiver_type, receiver_id
    );
    Ok(())
}

/// Upload a local file.
pub async fn upload(
    config: &Config,
    path: &Path,
    uploader_id: &str,
    uploader_type: UserType,
    description: Option<&str>,
) -> Result<()> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("Path has no file name")?;

    let result = file_client(config)
        .upload_file(file_name, &data, uploader_id, uploader_type, description)
        .await
        .context("Upload failed")?;

    println!(
        "Uploaded {} ({}) as file {}",
        file_name,
        format_file_size(data.len() as u64),
        result.file_id.map_or_else(|| "?".to_string(), |id| id.to_string())
    );
    Ok(())
}

/// Download a file to `output`, or to its original name in the current directory.
pub async fn download(config: &Config, file_id: i64, output: Option<&Path>) -> Result<()> {
    let client = file_client(config);
    let target = match output {
        Some(path) => path.to_path_buf(),
        None => {
            let info = client
                .get_file_info(file_id)
                .await
                .context("Failed to get file info")?;
            Path::new(&info.original_file_name)
                .file_name()
                .map(PathBuf::from)
                .context("File has no usable name")?
        }
    };

    let bytes = client
        .download_file(file_id)
        .await
        .context("Download failed")?;
    tokio::fs::write(&target, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", target.display()))?;

    println!(
        "Saved file {} to {} ({})",
        file_id,
        target.display(),
        format_file_size(bytes.len() as u64)
    );
    Ok(())
}

/// Print metadata for one file.
pub async fn file_info(config: &Config, file_id: i64) -> Result<()> {
    let file = file_client(config)
        .get_file_info(file_id)
        .await
        .context("Failed to get file info")?;

    println!("{}", file.original_file_name);
    println!("  ID:       {}", file.id);
    println!("  Stored:   {}", file.file_name);
    println!("  Type:     {} ({})", file.file_type, file.kind().label());
    println!("  Size:     {}", format_file_size(file.file_size));
    println!("  Uploader: {} {}", file.uploader_type, file.uploaded_by);
    if let Some(ref date) = file.upload_date {
        println!("  Uploaded: {}", date);
    }
    if let Some(ref desc) = file.description {
        println!("  Note:     {}", desc);
    }
    println!(
        "  Open:     {}",
        if file.is_previewable() {
            "preview"
        } else {
            "download"
        }
    );
    Ok(())
}

/// List files, optionally restricted to one uploader.
pub async fn list_files(config: &Config, uploader: Option<(&str, UserType)>) -> Result<()> {
    let files = file_client(config)
        .list_files(uploader)
        .await
        .context("Failed to list files")?;

    println!("\nFiles:");
    println!("{:-<60}", "");

    if files.is_empty() {
        println!("  (no files found)");
        return Ok(());
    }

    for file in files.iter().filter(|f| f.active) {
        println!(
            "{:>6}  {:<32} {:>10}  {:<12} {} {}",
            file.id,
            file.original_file_name,
            format_file_size(file.file_size),
            file.kind().label(),
            file.uploader_type,
            file.uploaded_by
        );
    }
    Ok(())
}

/// Delete a file.
pub async fn delete_file(config: &Config, file_id: i64) -> Result<()> {
    file_client(config)
        .delete_file(file_id)
        .await
        .context("Failed to delete file")?;
    println!("Deleted file {}", file_id);
    Ok(())
}
