use std::path::{Path, PathBuf};

/// Which slot a file fills in the upload form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Video,
    Thumbnail,
}

impl FileKind {
    /// Fallback content type when neither the caller nor the extension says
    /// otherwise.
    pub fn default_content_type(self) -> &'static str {
        match self {
            Self::Video => "video/mp4",
            Self::Thumbnail => "image/jpeg",
        }
    }
}

/// A local file staged for upload, with its eventual `Content-Type`.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    kind: FileKind,
    content_type: Option<String>,
}

impl FileSource {
    pub fn video(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileKind::Video,
            content_type: None,
        }
    }

    pub fn thumbnail(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileKind::Thumbnail,
            content_type: None,
        }
    }

    /// Override the detected content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// File name sent to the presign endpoint.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_owned())
    }

    /// Content type, in priority order: explicit override, extension lookup,
    /// per-kind default.
    pub fn content_type(&self) -> String {
        if let Some(explicit) = &self.content_type {
            return explicit.clone();
        }
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(content_type_for_extension)
            .unwrap_or(self.kind.default_content_type())
            .to_owned()
    }
}

fn content_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => Some("video/mp4"),
        "mov" => Some("video/quicktime"),
        "webm" => Some("video/webm"),
        "mkv" => Some("video/x-matroska"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_drives_content_type() {
        assert_eq!(FileSource::video("clip.mov").content_type(), "video/quicktime");
        assert_eq!(
            FileSource::thumbnail("cover.PNG").content_type(),
            "image/png"
        );
    }

    #[test]
    fn unknown_extension_falls_back_per_kind() {
        assert_eq!(FileSource::video("clip.raw").content_type(), "video/mp4");
        assert_eq!(
            FileSource::thumbnail("cover.raw").content_type(),
            "image/jpeg"
        );
        assert_eq!(FileSource::video("noext").content_type(), "video/mp4");
    }

    #[test]
    fn explicit_content_type_wins() {
        let source = FileSource::video("clip.mov").with_content_type("video/x-custom");
        assert_eq!(source.content_type(), "video/x-custom");
    }

    #[test]
    fn file_name_is_the_last_component() {
        assert_eq!(
            FileSource::video("/data/uploads/clip.mp4").file_name(),
            "clip.mp4"
        );
    }
}
