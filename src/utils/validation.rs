use serde::Serialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Maximum sanitized filename length in bytes
pub const MAX_FILENAME_LEN: usize = 255;

/// Accepted extensions, partitioned by media category
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "3gp", "mts", "m2ts",
    "mxf",
];
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "aac", "flac", "ogg", "m4a", "wma", "aiff"];
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp"];
pub const PROJECT_EXTENSIONS: &[&str] = &["prproj", "aep", "fcpxml", "drp", "veg"];
pub const CAMERA_RAW_EXTENSIONS: &[&str] = &["r3d", "braw", "ari", "dng", "cr2", "cr3", "nef", "arw"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaCategory {
    Video,
    Audio,
    Image,
    Project,
    CameraRaw,
}

impl MediaCategory {
    pub const ALL: [MediaCategory; 5] = [
        MediaCategory::Video,
        MediaCategory::Audio,
        MediaCategory::Image,
        MediaCategory::Project,
        MediaCategory::CameraRaw,
    ];

    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            MediaCategory::Video => VIDEO_EXTENSIONS,
            MediaCategory::Audio => AUDIO_EXTENSIONS,
            MediaCategory::Image => IMAGE_EXTENSIONS,
            MediaCategory::Project => PROJECT_EXTENSIONS,
            MediaCategory::CameraRaw => CAMERA_RAW_EXTENSIONS,
        }
    }

    /// Case-insensitive lookup of an extension (without the leading dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.extensions().contains(&ext.as_str()))
    }
}

impl fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaCategory::Video => "video",
            MediaCategory::Audio => "audio",
            MediaCategory::Image => "image",
            MediaCategory::Project => "project",
            MediaCategory::CameraRaw => "camera_raw",
        };
        f.write_str(name)
    }
}

/// Reasons the gateway refuses an upload. Display strings are the API messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No file part")]
    NoFilePart,

    #[error("No file selected")]
    NoFileSelected,

    #[error("File type not allowed")]
    FileTypeNotAllowed,
}

/// A filename that passed sanitization and the allow-list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedFile {
    pub filename: String,
    pub category: MediaCategory,
}

/// Strips path components and unsafe characters from a client-supplied name.
/// Returns an empty string when nothing usable remains.
pub fn sanitize_filename(filename: &str) -> String {
    // Split on both separators so Windows-style paths lose their directories too
    let name = filename.rsplit(['/', '\\']).next().unwrap_or("");

    if name.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path components stripped from upload name: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c.is_whitespace()
                || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';')
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Hidden files and "." / ".." never make it to disk
    let sanitized = sanitized.trim_start_matches('.');

    if sanitized.len() <= MAX_FILENAME_LEN {
        return sanitized.to_string();
    }

    // Shorten the stem so the extension survives the cap
    match sanitized.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() < MAX_FILENAME_LEN - 1 => {
            let stem = truncate_on_char_boundary(stem, MAX_FILENAME_LEN - ext.len() - 1);
            format!("{stem}.{ext}")
        }
        _ => truncate_on_char_boundary(sanitized, MAX_FILENAME_LEN).to_string(),
    }
}

fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// True for names like ".mp4" that carry an extension but no name
fn is_bare_extension(filename: &str) -> bool {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or("");
    name.starts_with('.') && !name.trim_start_matches('.').contains('.')
}

pub fn allowed_category(filename: &str) -> Option<MediaCategory> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .and_then(MediaCategory::from_extension)
}

/// Gateway validation: non-empty name, sanitized, extension on the allow-list
pub fn validate_upload_name(filename: &str) -> Result<AcceptedFile, ValidationError> {
    if filename.trim().is_empty() {
        return Err(ValidationError::NoFileSelected);
    }

    let sanitized = sanitize_filename(filename);
    if sanitized.is_empty() || is_bare_extension(filename) {
        return Err(ValidationError::NoFileSelected);
    }

    let category = allowed_category(&sanitized).ok_or(ValidationError::FileTypeNotAllowed)?;

    Ok(AcceptedFile {
        filename: sanitized,
        category,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("clip.mp4"), "clip.mp4");
        assert_eq!(sanitize_filename("my clip.mov"), "my_clip.mov");
        assert_eq!(sanitize_filename("take<1>.mp4"), "take_1_.mp4");
        assert_eq!(sanitize_filename("日本語.mp4"), "日本語.mp4");

        // Path traversal
        assert_eq!(sanitize_filename("../../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("..\\..\\windows\\clip.avi"), "clip.avi");
        assert_eq!(sanitize_filename(".."), "");
        assert_eq!(sanitize_filename("dir/"), "");

        // Hidden files
        assert_eq!(sanitize_filename(".hidden.mp4"), "hidden.mp4");
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        let long = format!("{}.mp4", "é".repeat(200));
        let sanitized = sanitize_filename(&long);
        assert!(sanitized.len() <= MAX_FILENAME_LEN);
        assert!(sanitized.is_char_boundary(sanitized.len()));
        assert!(sanitized.ends_with(".mp4"));
    }

    #[test]
    fn test_sanitize_keeps_extension_of_long_names() {
        let long = format!("{}.mp4", "a".repeat(300));
        let sanitized = sanitize_filename(&long);
        assert_eq!(sanitized.len(), MAX_FILENAME_LEN);
        assert_eq!(sanitized, format!("{}.mp4", "a".repeat(251)));

        let accepted = validate_upload_name(&long).unwrap();
        assert_eq!(accepted.category, MediaCategory::Video);

        // No extension to keep: plain cut
        assert_eq!(sanitize_filename(&"b".repeat(300)), "b".repeat(MAX_FILENAME_LEN));
    }

    #[test]
    fn test_allow_list_categories() {
        assert_eq!(MediaCategory::from_extension("mp4"), Some(MediaCategory::Video));
        assert_eq!(MediaCategory::from_extension("MOV"), Some(MediaCategory::Video));
        assert_eq!(MediaCategory::from_extension("wav"), Some(MediaCategory::Audio));
        assert_eq!(MediaCategory::from_extension("png"), Some(MediaCategory::Image));
        assert_eq!(MediaCategory::from_extension("prproj"), Some(MediaCategory::Project));
        assert_eq!(MediaCategory::from_extension("braw"), Some(MediaCategory::CameraRaw));
        assert_eq!(MediaCategory::from_extension("exe"), None);
        assert_eq!(MediaCategory::from_extension(""), None);
    }

    #[test]
    fn test_allow_list_has_no_overlap() {
        for (i, a) in MediaCategory::ALL.iter().enumerate() {
            for b in &MediaCategory::ALL[i + 1..] {
                for ext in a.extensions() {
                    assert!(!b.extensions().contains(ext), "{} in {} and {}", ext, a, b);
                }
            }
        }
    }

    #[test]
    fn test_validate_upload_name() {
        let accepted = validate_upload_name("Holiday Trip.MP4").unwrap();
        assert_eq!(accepted.filename, "Holiday_Trip.MP4");
        assert_eq!(accepted.category, MediaCategory::Video);

        assert_eq!(validate_upload_name(""), Err(ValidationError::NoFileSelected));
        assert_eq!(validate_upload_name("   "), Err(ValidationError::NoFileSelected));
        assert_eq!(validate_upload_name("../"), Err(ValidationError::NoFileSelected));
        assert_eq!(
            validate_upload_name("movie.exe"),
            Err(ValidationError::FileTypeNotAllowed)
        );
        assert_eq!(
            validate_upload_name("noextension"),
            Err(ValidationError::FileTypeNotAllowed)
        );
        assert_eq!(validate_upload_name(".mp4"), Err(ValidationError::NoFileSelected));
        assert_eq!(validate_upload_name("clips/..MOV"), Err(ValidationError::NoFileSelected));
        assert_eq!(validate_upload_name(".hidden.mp4").unwrap().filename, "hidden.mp4");
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(ValidationError::NoFilePart.to_string(), "No file part");
        assert_eq!(ValidationError::NoFileSelected.to_string(), "No file selected");
        assert_eq!(
            ValidationError::FileTypeNotAllowed.to_string(),
            "File type not allowed"
        );
    }
}
