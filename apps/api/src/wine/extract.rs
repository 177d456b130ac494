//! Page text extraction.
//!
//! `AppState` holds an `Arc<dyn PageTextExtractor>`; the default backend is
//! [`PdfTextExtractor`]. Tests swap in fixed-text extractors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{0}")]
    Unreadable(String),
}

/// Turns document bytes into one text string per page, in document order.
///
/// Implementations are synchronous and CPU-bound; callers run them on the
/// blocking pool.
pub trait PageTextExtractor: Send + Sync {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractError>;
}

/// Default extractor backed by `pdf-extract`.
pub struct PdfTextExtractor;

impl PageTextExtractor for PdfTextExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
            .map_err(|e| ExtractError::Unreadable(e.to_string()))
    }
}

/// True when no page carries any non-whitespace text (e.g. a scanned PDF).
pub fn is_blank(pages: &[String]) -> bool {
    pages.iter().all(|p| p.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINE_LIST: &[u8] =
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/wine_list.pdf"));

    #[test]
    fn test_pdf_pages_come_back_in_order() {
        let pages = PdfTextExtractor.extract_pages(WINE_LIST).unwrap();
        assert_eq!(pages.len(), 2);
        assert!(pages[0].contains("Opus One Napa $150"), "page 1: {:?}", pages[0]);
        assert!(pages[1].contains("Chablis Burgundy $40"), "page 2: {:?}", pages[1]);
        assert!(!is_blank(&pages));
    }

    #[test]
    fn test_non_pdf_bytes_are_unreadable() {
        let err = PdfTextExtractor.extract_pages(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Unreadable(_)));
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(&[]));
        assert!(is_blank(&["  \n".to_string(), "\t".to_string()]));
        assert!(!is_blank(&["".to_string(), "シャブリ ¥4000".to_string()]));
    }
}
