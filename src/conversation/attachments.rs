//! Attachment markers, metadata cache and legacy file lookup

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::api::format_file_size;
use crate::models::ChatFile;

static MARKER_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

fn marker_regex() -> Option<&'static Regex> {
    MARKER_REGEX
        .get_or_init(|| {
            // "📎 report.pdf (2.38 MB)", older clients wrote "📎 File: report.pdf"
            Regex::new(r"^📎\s*(?:File:\s*)?(.+?)(?:\s*\((\d+(?:\.\d+)?\s*(?:Bytes|KB|MB|GB))\))?\s*$")
                .ok()
        })
        .as_ref()
}

/// Text body of a file message.
pub fn file_message_text(file_name: &str, size: u64) -> String {
    format!("📎 {} ({})", file_name, format_file_size(size))
}

/// File name and size parsed back out of a file message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMarker {
    pub file_name: String,
    pub size: Option<String>,
}

pub fn parse_file_marker(text: &str) -> Option<FileMarker> {
    let caps = marker_regex()?.captures(text.trim())?;
    let file_name = caps.get(1)?.as_str().trim().to_string();
    if file_name.is_empty() {
        return None;
    }
    Some(FileMarker {
        file_name,
        size: caps.get(2).map(|m| m.as_str().to_string()),
    })
}

/// Lowercase alphanumerics only, so "Annual Report.pdf" and
/// "annual_report.pdf" compare equal.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Find the stored file a message without a `fileId` most likely refers to.
///
/// Exact name matches win, then normalized equality, then normalized
/// containment in either direction.
pub fn match_legacy_file<'a>(file_name: &str, files: &'a [ChatFile]) -> Option<&'a ChatFile> {
    if let Some(f) = files
        .iter()
        .find(|f| f.original_file_name == file_name || f.file_name == file_name)
    {
        return Some(f);
    }

    let wanted = normalize(file_name);
    if wanted.is_empty() {
        return None;
    }

    let normalized: Vec<(String, String, &ChatFile)> = files
        .iter()
        .map(|f| (normalize(&f.original_file_name), normalize(&f.file_name), f))
        .collect();

    normalized
        .iter()
        .find(|(orig, stored, _)| *orig == wanted || *stored == wanted)
        .or_else(|| {
            normalized.iter().find(|(orig, stored, _)| {
                let hit = |n: &String| {
                    !n.is_empty() && (n.contains(&wanted) || wanted.contains(n.as_str()))
                };
                hit(orig) || hit(stored)
            })
        })
        .map(|(_, _, f)| *f)
}

/// Cached metadata lookup result.
#[derive(Debug, PartialEq)]
pub enum Lookup<'a> {
    Missing,
    /// Fetched before and failed.
    Unavailable,
    Ready(&'a ChatFile),
}

/// Per-session memo of `file_id -> metadata`.
#[derive(Debug, Default)]
pub struct FileInfoCache {
    entries: HashMap<i64, Option<ChatFile>>,
}

impl FileInfoCache {
    pub fn lookup(&self, file_id: i64) -> Lookup<'_> {
        match self.entries.get(&file_id) {
            None => Lookup::Missing,
            Some(None) => Lookup::Unavailable,
            Some(Some(file)) => Lookup::Ready(file),
        }
    }

    pub fn insert(&mut self, file_id: i64, file: Option<ChatFile>) {
        self.entries.insert(file_id, file);
    }

    #[cfg(test)]
    pub fn contains(&self, file_id: i64) -> bool {
        self.entries.contains_key(&file_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// How a front end should open an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Preview,
    Download,
}

impl Disposition {
    pub fn for_file(file: &ChatFile) -> Self {
        if file.is_previewable() {
            Disposition::Preview
        } else {
            Disposition::Download
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_file(id: i64, original: &str, stored: &str) -> ChatFile {
    use crate::models::UserType;
    ChatFile {
        id,
        file_name: stored.to_string(),
        original_file_name: original.to_string(),
        file_path: format!("/uploads/{}", stored),
        file_type: original.rsplit('.').next().unwrap_or_default().to_string(),
        file_size: 2_500_000,
        uploaded_by: "42".to_string(),
        uploader_type: UserType::Admin,
        upload_date: Some("2025-03-01T10:00:00".to_string()),
        active: true,
        description: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_text_and_parse() {
        let text = file_message_text("report.pdf", 2_500_000);
        assert_eq!(text, "📎 report.pdf (2.38 MB)");
        assert_eq!(
            parse_file_marker(&text),
            Some(FileMarker {
                file_name: "report.pdf".to_string(),
                size: Some("2.38 MB".to_string()),
            })
        );
    }

    #[test]
    fn test_parse_legacy_forms() {
        let marker = parse_file_marker("📎 File: scan (1).png").unwrap();
        assert_eq!(marker.file_name, "scan (1).png");
        assert_eq!(marker.size, None);

        assert_eq!(parse_file_marker("see attached"), None);
        assert_eq!(parse_file_marker("📎 "), None);
    }

    #[test]
    fn test_match_exact_then_fuzzy() {
        let files = vec![
            sample_file(1, "Annual Report 2024.pdf", "a1b2_annual_report_2024.pdf"),
            sample_file(2, "notes.txt", "c3d4_notes.txt"),
        ];

        assert_eq!(match_legacy_file("notes.txt", &files).map(|f| f.id), Some(2));
        assert_eq!(
            match_legacy_file("annual_report_2024.pdf", &files).map(|f| f.id),
            Some(1)
        );
        assert_eq!(match_legacy_file("Report 2024", &files).map(|f| f.id), Some(1));
        assert_eq!(match_legacy_file("budget.xlsx", &files), None);
        assert_eq!(match_legacy_file("!!!", &files), None);
    }

    #[test]
    fn test_cache_states() {
        let mut cache = FileInfoCache::default();
        assert_eq!(cache.lookup(10), Lookup::Missing);

        cache.insert(11, None);
        assert_eq!(cache.lookup(11), Lookup::Unavailable);
        assert!(cache.contains(11));
        assert!(!cache.contains(10));

        let file = sample_file(10, "report.pdf", "x_report.pdf");
        cache.insert(10, Some(file.clone()));
        assert_eq!(cache.lookup(10), Lookup::Ready(&file));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_disposition() {
        assert_eq!(
            Disposition::for_file(&sample_file(1, "cover.png", "c.png")),
            Disposition::Preview
        );
        assert_eq!(
            Disposition::for_file(&sample_file(2, "data.xlsx", "d.xlsx")),
            Disposition::Download
        );
    }
}
