//! First-page rasterization of PDF documents.

use std::path::Path;
use std::process::Command;

use crate::error::FormdiffError;

/// Default rasterizer executable (poppler-utils).
pub const DEFAULT_PDF_COMMAND: &str = "pdftoppm";

/// Renders page one of a PDF to JPEG by running a `pdftoppm`-compatible
/// command and reading the image from its stdout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PdfRasterizer {
    pub command: String,
    pub dpi: u32,
}

impl Default for PdfRasterizer {
    fn default() -> Self {
        Self {
            command: DEFAULT_PDF_COMMAND.to_string(),
            dpi: 200,
        }
    }
}

impl PdfRasterizer {
    pub fn first_page_jpeg(&self, path: &Path) -> Result<Vec<u8>, FormdiffError> {
        let output = Command::new(&self.command)
            .args(["-jpeg", "-r", &self.dpi.to_string(), "-f", "1", "-l", "1", "-singlefile"])
            .arg(path)
            .output()
            .map_err(|source| FormdiffError::Extract {
                path: path.to_path_buf(),
                message: format!("could not run '{}': {source}", self.command),
            })?;

        if !output.status.success() {
            return Err(FormdiffError::Extract {
                path: path.to_path_buf(),
                message: format!(
                    "'{}' exited with {}: {}",
                    self.command,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        if output.stdout.is_empty() {
            return Err(FormdiffError::Extract {
                path: path.to_path_buf(),
                message: format!("'{}' produced no image", self.command),
            });
        }

        tracing::debug!(
            path = %path.display(),
            bytes = output.stdout.len(),
            "rasterized first page"
        );
        Ok(output.stdout)
    }
}

/// Returns true for `.pdf` paths, ignoring case.
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
