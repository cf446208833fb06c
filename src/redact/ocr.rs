//! Text extraction through an external OCR command.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use crate::error::FormdiffError;
use crate::source::pdf::{is_pdf, PdfRasterizer};

use super::TextExtractor;

/// Default OCR executable.
pub const DEFAULT_OCR_COMMAND: &str = "tesseract";

/// Runs a Tesseract-compatible command as `<command> <image> stdout -l <lang>`.
///
/// Files with a `.txt` extension are taken to be text that was already
/// extracted and are read as-is. PDFs are rasterized first and the page image
/// is piped in as `<command> stdin stdout -l <lang>`.
#[derive(Clone, Debug)]
pub struct OcrExtractor {
    pub command: String,
    pub language: String,
    pub rasterizer: PdfRasterizer,
}

impl Default for OcrExtractor {
    fn default() -> Self {
        Self {
            command: DEFAULT_OCR_COMMAND.to_string(),
            language: "eng".to_string(),
            rasterizer: PdfRasterizer::default(),
        }
    }
}

impl OcrExtractor {
    fn run_on_file(&self, path: &Path) -> std::io::Result<Output> {
        Command::new(&self.command)
            .arg(path)
            .arg("stdout")
            .args(["-l", &self.language])
            .output()
    }

    fn run_on_bytes(&self, image: &[u8]) -> std::io::Result<Output> {
        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "-l", &self.language])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(image)?;
        }
        child.wait_with_output()
    }
}

impl TextExtractor for OcrExtractor {
    fn extract(&self, path: &Path) -> Result<String, FormdiffError> {
        let is_text = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
        if is_text {
            return std::fs::read_to_string(path).map_err(|source| FormdiffError::Extract {
                path: path.to_path_buf(),
                message: source.to_string(),
            });
        }

        let output = if is_pdf(path) {
            let page = self.rasterizer.first_page_jpeg(path)?;
            self.run_on_bytes(&page)
        } else {
            self.run_on_file(path)
        }
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

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::info!(path = %path.display(), chars = text.chars().count(), "extracted text");
        Ok(text)
    }
}
