use axum::body::Bytes;
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Content types accepted for relay. Anything else is rejected before its
/// body is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllowedMimeType {
    Pdf,
    Png,
    Jpeg,
}

impl AllowedMimeType {
    pub const ALL: [AllowedMimeType; 3] = [Self::Pdf, Self::Png, Self::Jpeg];

    /// Match a part's `Content-Type`, ignoring parameters and case.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "application/pdf" => Some(Self::Pdf),
            "image/png" => Some(Self::Png),
            "image/jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Png | Self::Jpeg)
    }
}

impl fmt::Display for AllowedMimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the uploaded bytes live for the duration of the request.
#[derive(Debug)]
pub enum FileContent {
    Memory(Bytes),
    /// Removed from disk when dropped.
    Spooled(NamedTempFile),
}

/// The single file extracted from an upload request. Owned by the request
/// handler and dropped, together with any spool file, when it returns.
#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub mime_type: AllowedMimeType,
    pub size: u64,
    content: FileContent,
}

impl UploadedFile {
    pub fn in_memory(filename: impl Into<String>, mime_type: AllowedMimeType, data: Bytes) -> Self {
        Self {
            filename: filename.into(),
            mime_type,
            size: data.len() as u64,
            content: FileContent::Memory(data),
        }
    }

    pub fn spooled(
        filename: impl Into<String>,
        mime_type: AllowedMimeType,
        file: NamedTempFile,
        size: u64,
    ) -> Self {
        Self {
            filename: filename.into(),
            mime_type,
            size,
            content: FileContent::Spooled(file),
        }
    }

    pub fn content(&self) -> &FileContent {
        &self.content
    }

    pub fn spool_path(&self) -> Option<&Path> {
        match &self.content {
            FileContent::Memory(_) => None,
            FileContent::Spooled(file) => Some(file.path()),
        }
    }

    pub fn is_spooled(&self) -> bool {
        self.spool_path().is_some()
    }

    /// Load the full contents, reading the spool file if there is one.
    pub async fn read_bytes(&self) -> std::io::Result<Bytes> {
        match &self.content {
            FileContent::Memory(data) => Ok(data.clone()),
            FileContent::Spooled(file) => tokio::fs::read(file.path()).await.map(Bytes::from),
        }
    }
}

/// `scan.png` -> `scan.jpg`; names without an extension gain one. A leading
/// dot does not start an extension, so `.png` becomes `.png.jpg`.
pub fn jpeg_filename(filename: &str) -> String {
    PathBuf::from(filename)
        .with_extension("jpg")
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn content_type_matching_ignores_case_and_parameters() {
        assert_eq!(
            AllowedMimeType::from_content_type("Image/PNG"),
            Some(AllowedMimeType::Png)
        );
        assert_eq!(
            AllowedMimeType::from_content_type("application/pdf; name=report.pdf"),
            Some(AllowedMimeType::Pdf)
        );
        assert_eq!(AllowedMimeType::from_content_type("text/plain"), None);
        assert_eq!(AllowedMimeType::from_content_type("image/gif"), None);
        assert_eq!(AllowedMimeType::from_content_type(""), None);
    }

    #[test]
    fn only_png_and_jpeg_are_images() {
        let images: Vec<_> = AllowedMimeType::ALL
            .iter()
            .filter(|m| m.is_image())
            .collect();
        assert_eq!(images, vec![&AllowedMimeType::Png, &AllowedMimeType::Jpeg]);
    }

    #[test]
    fn jpeg_filename_replaces_extension() {
        assert_eq!(jpeg_filename("scan.png"), "scan.jpg");
        assert_eq!(jpeg_filename("photo.JPEG"), "photo.jpg");
        assert_eq!(jpeg_filename("receipt"), "receipt.jpg");
        assert_eq!(jpeg_filename("archive.2024.png"), "archive.2024.jpg");
    }

    #[test]
    fn jpeg_filename_keeps_dotfile_stem() {
        assert_eq!(jpeg_filename(".png"), ".png.jpg");
        assert_eq!(jpeg_filename(".hidden.png"), ".hidden.jpg");
    }

    #[tokio::test]
    async fn spool_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let mut spool = tempfile::Builder::new()
            .prefix("upload-")
            .tempfile_in(dir.path())
            .unwrap();
        spool.write_all(b"%PDF-1.7").unwrap();
        let path = spool.path().to_path_buf();

        let file = UploadedFile::spooled("doc.pdf", AllowedMimeType::Pdf, spool, 8);
        assert_eq!(&file.read_bytes().await.unwrap()[..], b"%PDF-1.7");
        assert!(path.exists());

        drop(file);
        assert!(!path.exists());
    }
}
