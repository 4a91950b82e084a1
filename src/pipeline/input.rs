//! Input resolution: validate user-supplied local files before use.
//!
//! pdfium gives an unhelpful error for a missing or non-PDF file, and a JSON
//! parser says nothing about permissions. Checking existence, read access and
//! (for PDFs) the `%PDF` magic bytes up front gives the caller an actionable
//! [`ExtractError`] instead.

use crate::error::ExtractError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Open `path` for reading, mapping failures to input errors.
fn open(path: &Path) -> Result<std::fs::File, ExtractError> {
    if !path.exists() {
        return Err(ExtractError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ExtractError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ExtractError::FileNotFound {
            path: path.to_path_buf(),
        },
    })
}

/// Validate a local PDF: it exists, is readable and starts with `%PDF`.
pub fn resolve_pdf(path: impl AsRef<Path>) -> Result<PathBuf, ExtractError> {
    let path = path.as_ref().to_path_buf();
    let mut f = open(&path)?;
    let mut magic = [0u8; 4];
    if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
        return Err(ExtractError::NotAPdf { path, magic });
    }
    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

/// Read a UTF-8 input file (OCR dump, markdown, ground truth).
pub fn read_text(path: impl AsRef<Path>) -> Result<String, ExtractError> {
    let path = path.as_ref();
    let mut f = open(path)?;
    let mut text = String::new();
    f.read_to_string(&mut text)
        .map_err(|e| ExtractError::InvalidInputFile {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_not_found() {
        let err = resolve_pdf("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound { .. }));
    }

    #[test]
    fn non_pdf_is_rejected_with_magic() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"{\"json\": true}").unwrap();
        match resolve_pdf(f.path()).unwrap_err() {
            ExtractError::NotAPdf { magic, .. } => assert_eq!(&magic, b"{\"js"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn pdf_magic_is_accepted() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%PDF-1.7\n").unwrap();
        assert_eq!(resolve_pdf(f.path()).unwrap(), f.path());
    }

    #[test]
    fn reads_text_files() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all("héllo".as_bytes()).unwrap();
        assert_eq!(read_text(f.path()).unwrap(), "héllo");
    }
}
