//! Document image discovery and loading.
//!
//! Candidate images are the immediate files of an input directory whose name
//! contains a marker substring and whose extension is on an allow-list. Both
//! checks are case-insensitive. Results are sorted by path so that pair order
//! and report order are reproducible across runs and filesystems. PDF files
//! are represented by their rasterized first page.

pub mod pdf;

pub use pdf::{PdfRasterizer, DEFAULT_PDF_COMMAND};

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{ComparisonError, FormdiffError};

/// Default marker used for historical Form 1042 scans.
pub const DEFAULT_MARKER: &str = "f1042";

/// Default accepted image extensions.
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "pdf"];

/// Image encoding of a loaded document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::Jpeg => write!(f, "jpeg"),
            ImageFormat::Png => write!(f, "png"),
        }
    }
}

/// Payload of a document, or the reason it has none.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageContent {
    /// Raw encoded bytes.
    Encoded { bytes: Vec<u8>, format: ImageFormat },
    Unreadable(String),
}

/// A scanned document page held in memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentImage {
    /// Stable identifier (the file name).
    pub id: String,
    /// Location the image was read from.
    pub path: PathBuf,
    pub content: ImageContent,
}

impl DocumentImage {
    /// An image that could not be read; pairs involving it fail.
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl Into<String>) -> DocumentImage {
        let path = path.into();
        DocumentImage {
            id: file_name(&path),
            path,
            content: ImageContent::Unreadable(reason.into()),
        }
    }

    /// Encoded bytes and format, or why they are missing.
    pub fn encoded(&self) -> Result<(&[u8], ImageFormat), ComparisonError> {
        match &self.content {
            ImageContent::Encoded { bytes, format } => Ok((bytes, *format)),
            ImageContent::Unreadable(reason) => Err(ComparisonError::UnreadableImage {
                id: self.id.clone(),
                reason: reason.clone(),
            }),
        }
    }

    /// Build an image from bytes already in memory, sniffing the format.
    pub fn from_bytes(
        path: impl Into<PathBuf>,
        bytes: Vec<u8>,
    ) -> Result<DocumentImage, FormdiffError> {
        let path = path.into();
        let format = sniff_format(&bytes).ok_or_else(|| FormdiffError::Input {
            path: path.clone(),
            message: "content is not a JPEG or PNG image".to_string(),
        })?;

        Ok(DocumentImage {
            id: file_name(&path),
            path,
            content: ImageContent::Encoded { bytes, format },
        })
    }
}

/// Filter options for image discovery.
#[derive(Clone, Debug)]
pub struct SourceOptions {
    /// Substring the file name must contain; empty matches everything.
    pub marker: String,
    /// Extensions without the leading dot.
    pub extensions: Vec<String>,
    /// Used for files with a `.pdf` extension.
    pub rasterizer: PdfRasterizer,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            rasterizer: PdfRasterizer::default(),
        }
    }
}

impl SourceOptions {
    /// Returns true if `path` passes the marker and extension filters.
    pub fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };

        let ext = ext.trim_start_matches('.');
        let ext_ok = self
            .extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext));

        ext_ok
            && name
                .to_ascii_lowercase()
                .contains(&self.marker.to_ascii_lowercase())
    }
}

/// List matching files in `dir`, sorted by path.
///
/// Fails with an input error when the directory is missing or fewer than two
/// files match, since a comparison needs at least one pair.
pub fn enumerate_images(
    dir: &Path,
    opts: &SourceOptions,
) -> Result<Vec<PathBuf>, FormdiffError> {
    let files = collect_matching_files(dir, opts)?;

    if files.len() < 2 {
        return Err(FormdiffError::Input {
            path: dir.to_path_buf(),
            message: format!(
                "at least two matching images are required for comparison, \
                 found {} (marker '{}', extensions {})",
                files.len(),
                opts.marker,
                opts.extensions.join(", ")
            ),
        });
    }

    tracing::debug!(count = files.len(), dir = %dir.display(), "enumerated images");
    Ok(files)
}

/// List matching files in `dir`, sorted by path, without a minimum count.
pub fn collect_matching_files(
    dir: &Path,
    opts: &SourceOptions,
) -> Result<Vec<PathBuf>, FormdiffError> {
    if !dir.is_dir() {
        return Err(FormdiffError::Input {
            path: dir.to_path_buf(),
            message: "directory does not exist".to_string(),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        let entry = entry.map_err(|source| FormdiffError::Input {
            path: dir.to_path_buf(),
            message: format!("failed while listing directory: {source}"),
        })?;

        if entry.file_type().is_file() && opts.matches(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

/// Read every path into a [`DocumentImage`], one per path and in order.
///
/// A file that cannot be read, rasterized or recognised becomes an
/// unreadable image instead of failing the whole load.
pub fn load_images(paths: &[PathBuf], opts: &SourceOptions) -> Vec<DocumentImage> {
    paths
        .iter()
        .map(|path| match load_image(path, &opts.rasterizer) {
            Ok(image) => image,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "image is unreadable");
                let reason = match err {
                    FormdiffError::Input { message, .. }
                    | FormdiffError::Extract { message, .. } => message,
                    other => other.to_string(),
                };
                DocumentImage::unreadable(path.clone(), reason)
            }
        })
        .collect()
}

fn load_image(path: &Path, rasterizer: &PdfRasterizer) -> Result<DocumentImage, FormdiffError> {
    let bytes = if pdf::is_pdf(path) {
        rasterizer.first_page_jpeg(path)?
    } else {
        std::fs::read(path).map_err(|source| FormdiffError::Input {
            path: path.to_path_buf(),
            message: format!("failed to read image: {source}"),
        })?
    };
    DocumentImage::from_bytes(path, bytes)
}

fn sniff_format(bytes: &[u8]) -> Option<ImageFormat> {
    match imagesize::image_type(bytes).ok()? {
        imagesize::ImageType::Jpeg => Some(ImageFormat::Jpeg),
        imagesize::ImageType::Png => Some(ImageFormat::Png),
        _ => None,
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const PNG_HEADER: &[u8] = &[
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13, b'I', b'H', b'D', b'R', 0, 0,
        0, 1, 0, 0, 0, 1, 8, 2, 0, 0, 0, 0x90, 0x77, 0x53, 0xDE,
    ];
    const JPEG_HEADER: &[u8] = &[
        0xFF, 0xD8, 0xFF, 0xE0, 0, 16, b'J', b'F', b'I', b'F', 0, 1, 1, 0, 0, 1, 0, 1, 0, 0,
    ];

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), PNG_HEADER).expect("write fixture");
    }

    #[test]
    fn matches_marker_and_extension_case_insensitively() {
        let opts = SourceOptions::default();
        assert!(opts.matches(Path::new("scans/F1042-1994.JPG")));
        assert!(opts.matches(Path::new("f1042_2004.jpeg")));
        assert!(!opts.matches(Path::new("f1040-2004.png")));
        assert!(opts.matches(Path::new("f1042-2004.pdf")));
        assert!(!opts.matches(Path::new("f1042-2004.gif")));
        assert!(!opts.matches(Path::new("f1042")));
    }

    #[test]
    fn enumerate_sorts_and_filters() {
        let tmp = tempfile::tempdir().expect("tempdir");
        touch(tmp.path(), "f1042-2012.png");
        touch(tmp.path(), "f1042-1994.png");
        touch(tmp.path(), "notes.txt");
        touch(tmp.path(), "f1099-2000.png");
        touch(tmp.path(), "f1042-2004.png");

        let files = enumerate_images(tmp.path(), &SourceOptions::default()).expect("enumerate");
        let names: Vec<String> = files.iter().map(|p| file_name(p)).collect();
        assert_eq!(
            names,
            vec!["f1042-1994.png", "f1042-2004.png", "f1042-2012.png"]
        );
    }

    #[test]
    fn enumerate_ignores_subdirectories() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::create_dir(tmp.path().join("f1042-nested.png")).expect("mkdir");
        touch(tmp.path(), "f1042-a.png");
        touch(tmp.path(), "f1042-b.png");

        let files = enumerate_images(tmp.path(), &SourceOptions::default()).expect("enumerate");
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn fewer_than_two_matches_is_an_input_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        touch(tmp.path(), "f1042-only.png");

        let err = enumerate_images(tmp.path(), &SourceOptions::default()).unwrap_err();
        assert!(matches!(err, FormdiffError::Input { .. }));
        assert!(err.to_string().contains("found 1"));
    }

    #[test]
    fn missing_directory_is_an_input_error() {
        let err = enumerate_images(
            Path::new("/definitely/not/a/real/dir"),
            &SourceOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, FormdiffError::Input { .. }));
    }

    #[test]
    fn empty_marker_matches_everything_with_allowed_extension() {
        let opts = SourceOptions {
            marker: String::new(),
            ..Default::default()
        };
        assert!(opts.matches(Path::new("anything.png")));
    }

    #[test]
    fn from_bytes_sniffs_format() {
        let png = DocumentImage::from_bytes("a/f1042-1.png", PNG_HEADER.to_vec()).expect("png");
        assert_eq!(png.encoded().map(|(_, f)| f), Ok(ImageFormat::Png));
        assert_eq!(png.id, "f1042-1.png");

        let jpeg = DocumentImage::from_bytes("f1042-2.jpg", JPEG_HEADER.to_vec()).expect("jpeg");
        assert_eq!(jpeg.encoded().map(|(_, f)| f), Ok(ImageFormat::Jpeg));

        let err = DocumentImage::from_bytes("f1042-3.png", b"not an image".to_vec()).unwrap_err();
        assert!(matches!(err, FormdiffError::Input { .. }));
    }

    #[test]
    fn load_keeps_unreadable_files_in_place() {
        let tmp = tempfile::tempdir().expect("tempdir");
        touch(tmp.path(), "f1042-1994.png");
        fs::write(tmp.path().join("f1042-2020.png"), b"truncated scan").expect("write");
        touch(tmp.path(), "f1042-2024.png");
        let opts = SourceOptions {
            rasterizer: PdfRasterizer {
                command: "formdiff-missing-rasterizer".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        fs::write(tmp.path().join("f1042-2025.pdf"), b"%PDF-1.4").expect("write");

        let paths = enumerate_images(tmp.path(), &opts).expect("enumerate");
        let images = load_images(&paths, &opts);

        let ids: Vec<&str> = images.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["f1042-1994.png", "f1042-2020.png", "f1042-2024.png", "f1042-2025.pdf"]
        );
        assert!(images[0].encoded().is_ok());
        assert!(images[2].encoded().is_ok());
        assert_eq!(
            images[1].encoded().unwrap_err(),
            ComparisonError::UnreadableImage {
                id: "f1042-2020.png".to_string(),
                reason: "content is not a JPEG or PNG image".to_string(),
            }
        );
        let err = images[3].encoded().unwrap_err().to_string();
        assert!(err.contains("could not run 'formdiff-missing-rasterizer'"), "{err}");
    }
}
