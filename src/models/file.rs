//! Attachment models

use serde::{Deserialize, Deserializer, Serialize};

use super::UserType;

/// Metadata for an uploaded attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatFile {
    pub id: i64,
    /// Stored (unique) name on the file server.
    pub file_name: String,
    pub original_file_name: String,
    #[serde(default)]
    pub file_path: String,
    /// Extension, lowercase without the dot.
    #[serde(default)]
    pub file_type: String,
    pub file_size: u64,
    pub uploaded_by: String,
    pub uploader_type: UserType,
    #[serde(default, deserialize_with = "lenient_date")]
    pub upload_date: Option<String>,
    #[serde(default = "default_active", alias = "isActive")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_active() -> bool {
    true
}

fn lenient_date<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) if !other.is_null() => Some(other.to_string()),
        _ => None,
    })
}

impl ChatFile {
    pub fn kind(&self) -> FileKind {
        if self.file_type.is_empty() {
            FileKind::from_file_name(&self.original_file_name)
        } else {
            FileKind::from_extension(&self.file_type)
        }
    }

    /// Images and PDFs open inline; everything else is a forced download.
    pub fn is_previewable(&self) -> bool {
        self.kind().is_previewable()
    }
}

/// Broad category of an attachment, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Image,
    Pdf,
    Document,
    Spreadsheet,
    Presentation,
    Text,
    Archive,
    Audio,
    Video,
    Other,
}

impl FileKind {
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "svg" | "webp" => FileKind::Image,
            "pdf" => FileKind::Pdf,
            "doc" | "docx" => FileKind::Document,
            "xls" | "xlsx" => FileKind::Spreadsheet,
            "ppt" | "pptx" => FileKind::Presentation,
            "txt" => FileKind::Text,
            "zip" | "rar" | "7z" => FileKind::Archive,
            "mp3" | "wav" | "ogg" => FileKind::Audio,
            "mp4" | "avi" | "mov" => FileKind::Video,
            _ => FileKind::Other,
        }
    }

    pub fn from_file_name(name: &str) -> Self {
        match name.rsplit_once('.') {
            Some((_, ext)) => Self::from_extension(ext),
            None => FileKind::Other,
        }
    }

    pub fn is_previewable(self) -> bool {
        matches!(self, FileKind::Image | FileKind::Pdf)
    }

    pub fn label(self) -> &'static str {
        match self {
            FileKind::Image => "image",
            FileKind::Pdf => "pdf",
            FileKind::Document => "document",
            FileKind::Spreadsheet => "spreadsheet",
            FileKind::Presentation => "presentation",
            FileKind::Text => "text",
            FileKind::Archive => "archive",
            FileKind::Audio => "audio",
            FileKind::Video => "video",
            FileKind::Other => "file",
        }
    }
}

/// Body of `POST /files/upload`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub file_name: String,
    /// Base64 file content, no data-URL prefix.
    pub file_data: String,
    pub uploader_id: String,
    pub uploader_type: UserType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Response of `POST /files/upload`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub file_id: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_file_from_backend_json() {
        let json = r#"{
            "id": 10,
            "fileName": "a1b2_report.pdf",
            "originalFileName": "report.pdf",
            "filePath": "/uploads/member/M1/a1b2_report.pdf",
            "fileType": "pdf",
            "fileSize": 2500000,
            "uploadedBy": "M1",
            "uploaderType": "MEMBER",
            "uploadDate": "2025-03-01T10:00:00",
            "active": true
        }"#;
        let file: ChatFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.id, 10);
        assert_eq!(file.kind(), FileKind::Pdf);
        assert!(file.is_previewable());
        assert!(file.description.is_none());
    }

    #[test]
    fn test_preview_policy() {
        assert!(FileKind::from_extension("PNG").is_previewable());
        assert!(FileKind::from_extension(".pdf").is_previewable());
        assert!(!FileKind::from_extension("docx").is_previewable());
        assert!(!FileKind::from_file_name("notes").is_previewable());
        assert_eq!(FileKind::from_file_name("song.mp3"), FileKind::Audio);
    }
}
