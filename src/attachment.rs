//! Attachment staging and reading.
//!
//! A file is classified once, when the user selects it. Only files that pass
//! classification are ever read, and reading happens at send time.

use crate::error::{ChatError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How an attachment is transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeCategory {
    /// Sent as base64 of the raw bytes
    Image,
    /// Sent as the decoded text, verbatim
    Text,
    Unsupported,
}

impl MimeCategory {
    /// Classify a declared media type. Parameters such as `; charset=utf-8`
    /// are ignored.
    pub fn classify(mime_type: &str) -> Self {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "image/png" | "image/jpeg" => MimeCategory::Image,
            "text/plain" => MimeCategory::Text,
            _ => MimeCategory::Unsupported,
        }
    }

    pub fn is_supported(self) -> bool {
        self != MimeCategory::Unsupported
    }
}

/// Guess a media type from the file extension
pub fn guess_mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "json" => "application/json",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// A file the user selected, not yet sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub path: PathBuf,
    pub name: String,
    pub mime_type: String,
    pub category: MimeCategory,
    pub size_bytes: u64,
}

impl Attachment {
    /// Describe a file on disk, with its media type guessed from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mime_type = guess_mime_type(path);
        Self::with_mime_type(path, mime_type).await
    }

    /// Describe a file on disk with an explicitly declared media type.
    pub async fn with_mime_type(path: impl AsRef<Path>, mime_type: &str) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| ChatError::read(path.display().to_string(), e.to_string()))?;

        if !metadata.is_file() {
            return Err(ChatError::validation(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(Self {
            path: path.to_path_buf(),
            name,
            mime_type: mime_type.to_string(),
            category: MimeCategory::classify(mime_type),
            size_bytes: metadata.len(),
        })
    }

    /// Transcript text used in place of an empty user message
    pub fn placeholder(&self) -> String {
        format!("[Attached file: {}]", self.name)
    }
}

/// Converts a validated attachment into its wire payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttachmentReader;

impl AttachmentReader {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, mime_type: &str) -> MimeCategory {
        MimeCategory::classify(mime_type)
    }

    /// Read the file behind `attachment`. Images come back as plain base64
    /// (no data-URI prefix); text comes back verbatim.
    pub async fn read(&self, attachment: &Attachment) -> Result<String> {
        let path_display = attachment.path.display().to_string();

        if !attachment.category.is_supported() {
            return Err(ChatError::validation(format!(
                "Unsupported file type: {}",
                attachment.mime_type
            )));
        }

        let bytes = tokio::fs::read(&attachment.path)
            .await
            .map_err(|e| ChatError::read(&path_display, e.to_string()))?;
        debug!(path = %path_display, bytes = bytes.len(), "attachment read");

        if attachment.category == MimeCategory::Image {
            Ok(BASE64_STANDARD.encode(&bytes))
        } else {
            String::from_utf8(bytes).map_err(|e| ChatError::read(&path_display, e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_accepts_only_png_jpeg_and_plain_text() {
        assert_eq!(MimeCategory::classify("image/png"), MimeCategory::Image);
        assert_eq!(MimeCategory::classify("IMAGE/JPEG"), MimeCategory::Image);
        assert_eq!(
            MimeCategory::classify("text/plain; charset=utf-8"),
            MimeCategory::Text
        );
        assert_eq!(
            MimeCategory::classify("application/pdf"),
            MimeCategory::Unsupported
        );
        assert_eq!(MimeCategory::classify("image/gif"), MimeCategory::Unsupported);
        assert_eq!(MimeCategory::classify(""), MimeCategory::Unsupported);
    }

    #[test]
    fn extension_guessing() {
        assert_eq!(guess_mime_type(Path::new("a/photo.JPG")), "image/jpeg");
        assert_eq!(guess_mime_type(Path::new("notes.txt")), "text/plain");
        assert_eq!(guess_mime_type(Path::new("report.pdf")), "application/pdf");
        assert_eq!(guess_mime_type(Path::new("noext")), "application/octet-stream");
    }

    #[tokio::test]
    async fn image_is_base64_without_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixel.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let attachment = Attachment::from_path(&path).await.unwrap();
        assert_eq!(attachment.category, MimeCategory::Image);
        assert_eq!(attachment.size_bytes, 4);
        assert_eq!(attachment.name, "pixel.png");

        let payload = AttachmentReader::new().read(&attachment).await.unwrap();
        assert_eq!(payload, "iVBORw==");
        assert!(!payload.starts_with("data:"));
    }

    #[tokio::test]
    async fn text_is_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "line one\nlíne two\n").unwrap();

        let attachment = Attachment::from_path(&path).await.unwrap();
        let payload = AttachmentReader::new().read(&attachment).await.unwrap();
        assert_eq!(payload, "line one\nlíne two\n");
    }

    #[tokio::test]
    async fn vanished_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();
        let attachment = Attachment::from_path(&path).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        let err = AttachmentReader::new().read(&attachment).await.unwrap_err();
        assert!(matches!(err, ChatError::Read { .. }));
    }

    #[tokio::test]
    async fn invalid_utf8_text_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.txt");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();

        let attachment = Attachment::from_path(&path).await.unwrap();
        let err = AttachmentReader::new().read(&attachment).await.unwrap_err();
        assert!(matches!(err, ChatError::Read { .. }));
    }

    #[tokio::test]
    async fn unsupported_file_is_never_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, "%PDF").unwrap();

        let attachment = Attachment::from_path(&path).await.unwrap();
        assert_eq!(attachment.category, MimeCategory::Unsupported);
        let err = AttachmentReader::new().read(&attachment).await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }
}
