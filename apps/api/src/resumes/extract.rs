//! Upload validation and text extraction for PDF resumes.

use crate::errors::AppError;

/// Largest accepted resume upload.
pub const MAX_RESUME_BYTES: usize = 10 * 1024 * 1024;
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Rejects empty, oversized and non-PDF uploads.
pub fn validate_pdf(bytes: &[u8], content_type: Option<&str>) -> Result<(), AppError> {
    if bytes.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".to_string()));
    }
    if bytes.len() > MAX_RESUME_BYTES {
        return Err(AppError::Validation(format!(
            "Resume exceeds the {} MiB limit",
            MAX_RESUME_BYTES / (1024 * 1024)
        )));
    }
    let declared_pdf = content_type.is_some_and(|ct| ct.eq_ignore_ascii_case("application/pdf"));
    let looks_like_pdf = bytes.starts_with(PDF_MAGIC);
    if !looks_like_pdf {
        return Err(AppError::Validation(if declared_pdf {
            "File is labelled as PDF but is not a valid PDF".to_string()
        } else {
            "Only PDF resumes are accepted".to_string()
        }));
    }
    Ok(())
}

/// Extracts plain text off the async runtime. Scanned PDFs without a text
/// layer yield `None` rather than an error, so the upload still succeeds.
pub async fn extract_text(bytes: Vec<u8>) -> Option<String> {
    let result = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes)).await;
    match result {
        Ok(Ok(text)) => normalize_text(&text),
        Ok(Err(e)) => {
            tracing::warn!("PDF text extraction failed: {e}");
            None
        }
        Err(e) => {
            tracing::warn!("PDF extraction task panicked: {e}");
            None
        }
    }
}

/// Collapses runs of blank lines and trailing whitespace left by extraction.
fn normalize_text(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0;
    for line in raw.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    let trimmed = out.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_pdf() {
        let err = validate_pdf(b"PK\x03\x04 zip", Some("application/zip")).unwrap_err();
        assert!(err.to_string().contains("Only PDF"));
    }

    #[test]
    fn test_rejects_mislabelled_pdf() {
        let err = validate_pdf(b"hello", Some("application/pdf")).unwrap_err();
        assert!(err.to_string().contains("not a valid PDF"));
    }

    #[test]
    fn test_accepts_pdf_magic_without_content_type() {
        assert!(validate_pdf(b"%PDF-1.7\n...", None).is_ok());
    }

    #[test]
    fn test_rejects_empty_and_oversized() {
        assert!(validate_pdf(b"", None).is_err());
        let mut big = PDF_MAGIC.to_vec();
        big.resize(MAX_RESUME_BYTES + 1, b' ');
        assert!(validate_pdf(&big, None).is_err());
    }

    #[test]
    fn test_normalize_text_collapses_blank_lines() {
        let raw = "Ada Lovelace  \n\n\n\nEngineer\n   \n";
        assert_eq!(normalize_text(raw).as_deref(), Some("Ada Lovelace\n\nEngineer"));
        assert_eq!(normalize_text(" \n \n"), None);
    }
}
