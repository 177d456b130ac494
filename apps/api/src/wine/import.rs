//! PDF import pipeline: extract, parse, then fold into the session library.
//!
//! Every uploaded file is extracted and parsed before anything touches the
//! library, so a failing file aborts the import with the library unchanged.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};

use crate::wine::dedup::{Deduplicator, ImportReport, PendingSuggestions};
use crate::wine::extract::{is_blank, ExtractError, PageTextExtractor};
use crate::wine::library::WineLibrary;
use crate::wine::models::WineRecord;
use crate::wine::parser::parse_candidates;
use crate::wine::similarity::Similarity;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("'{file}' has no extractable text (scanned or image-only PDF?)")]
    ExtractionEmpty { file: String },

    #[error("'{file}' could not be read: {reason}")]
    Unreadable { file: String, reason: String },

    #[error("No wine entries were recognised in '{file}'")]
    NoCandidatesFound { file: String },
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Bytes,
}

/// Candidates parsed out of one file, tagged with its name.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub file: String,
    pub candidates: Vec<WineRecord>,
    pub dropped_fields: usize,
}

/// Extracts and parses one document. CPU-bound.
pub fn parse_document(
    extractor: &dyn PageTextExtractor,
    file: &str,
    bytes: &[u8],
) -> Result<ParsedFile, ImportError> {
    let pages = extractor
        .extract_pages(bytes)
        .map_err(|ExtractError::Unreadable(reason)| ImportError::Unreadable {
            file: file.to_string(),
            reason,
        })?;

    if is_blank(&pages) {
        return Err(ImportError::ExtractionEmpty {
            file: file.to_string(),
        });
    }

    let mut candidates = Vec::new();
    let mut dropped_fields = 0;
    for page in &pages {
        let mut parsed = parse_candidates(page);
        for mut record in parsed.by_ref() {
            record.source_files.push(file.to_string());
            candidates.push(record);
        }
        dropped_fields += parsed.dropped_fields();
    }

    if candidates.is_empty() {
        return Err(ImportError::NoCandidatesFound {
            file: file.to_string(),
        });
    }

    Ok(ParsedFile {
        file: file.to_string(),
        candidates,
        dropped_fields,
    })
}

/// Parses every upload on the blocking pool, in upload order.
pub async fn parse_uploads(
    extractor: Arc<dyn PageTextExtractor>,
    files: Vec<UploadedFile>,
) -> Result<Vec<ParsedFile>, ImportError> {
    let mut parsed = Vec::with_capacity(files.len());
    for upload in files {
        let extractor = Arc::clone(&extractor);
        let name = upload.name.clone();
        let result = tokio::task::spawn_blocking(move || {
            parse_document(extractor.as_ref(), &upload.name, &upload.bytes)
        })
        .await
        .map_err(|e| ImportError::Unreadable {
            file: name.clone(),
            reason: format!("extraction task failed: {e}"),
        })?;

        match result {
            Ok(file) => {
                info!(
                    file = %file.file,
                    candidates = file.candidates.len(),
                    dropped_fields = file.dropped_fields,
                    "parsed upload"
                );
                parsed.push(file);
            }
            Err(e) => {
                warn!(file = %name, error = %e, "import aborted");
                return Err(e);
            }
        }
    }
    Ok(parsed)
}

/// Folds parsed candidates into the library. Cannot fail.
pub fn apply(
    library: &mut WineLibrary,
    pending: &mut PendingSuggestions,
    threshold: Similarity,
    parsed: Vec<ParsedFile>,
) -> ImportReport {
    let dropped_fields: usize = parsed.iter().map(|p| p.dropped_fields).sum();
    let mut dedup = Deduplicator::new(library, pending, threshold);
    for file in parsed {
        for candidate in file.candidates {
            dedup.offer(candidate);
        }
    }
    ImportReport {
        dropped_fields,
        ..dedup.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wine::extract::PdfTextExtractor;

    /// Returns fixed pages regardless of input.
    struct FixedPages(Vec<&'static str>);

    impl PageTextExtractor for FixedPages {
        fn extract_pages(&self, _bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
            Ok(self.0.iter().map(|p| p.to_string()).collect())
        }
    }

    struct Broken;

    impl PageTextExtractor for Broken {
        fn extract_pages(&self, _bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
            Err(ExtractError::Unreadable("bad xref table".to_string()))
        }
    }

    const MENU: &str = "白ワイン\nシャトー・マルゴー  ボルドー  ¥8000\n\n赤ワイン\nオーパス・ワン  ナパ  ¥15000";

    fn upload(name: &str) -> UploadedFile {
        UploadedFile {
            name: name.to_string(),
            bytes: Bytes::from_static(b"%PDF-1.7"),
        }
    }

    const WINE_LIST: &[u8] =
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/wine_list.pdf"));

    #[test]
    fn test_real_pdf_yields_one_candidate_per_wine_line() {
        let parsed = parse_document(&PdfTextExtractor, "wine_list.pdf", WINE_LIST).unwrap();
        let summary: Vec<_> = parsed
            .candidates
            .iter()
            .map(|c| (c.name.as_str(), c.region.as_deref(), c.vintage, c.price))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Opus One", Some("Napa"), None, Some(150.0)),
                ("Chateau Margaux", Some("Bordeaux"), Some(2015), Some(300.0)),
                ("Chablis", Some("Burgundy"), None, Some(40.0)),
            ]
        );
        assert!(parsed
            .candidates
            .iter()
            .all(|c| c.source_files == vec!["wine_list.pdf".to_string()]));
        assert_eq!(parsed.dropped_fields, 0);
    }

    #[tokio::test]
    async fn test_reimporting_real_pdf_merges_everything() {
        let mut library = WineLibrary::new();
        let mut pending = PendingSuggestions::default();
        let extractor: Arc<dyn PageTextExtractor> = Arc::new(PdfTextExtractor);
        let file = || UploadedFile {
            name: "wine_list.pdf".to_string(),
            bytes: Bytes::from_static(WINE_LIST),
        };

        let first = parse_uploads(Arc::clone(&extractor), vec![file()]).await.unwrap();
        let report = apply(&mut library, &mut pending, Similarity::from_ratio(0.8), first);
        assert_eq!(report.added, 3);
        let snapshot = library.records().to_vec();

        let second = parse_uploads(extractor, vec![file()]).await.unwrap();
        let report = apply(&mut library, &mut pending, Similarity::from_ratio(0.8), second);
        assert_eq!((report.added, report.merged, report.flagged), (0, 3, 0));
        assert_eq!(library.records(), snapshot.as_slice());
        assert!(pending.list().is_empty());
    }

    #[test]
    fn test_parse_document_tags_source_file() {
        let parsed = parse_document(&FixedPages(vec![MENU]), "menu.pdf", b"").unwrap();
        assert_eq!(parsed.candidates.len(), 2);
        assert!(parsed
            .candidates
            .iter()
            .all(|c| c.source_files == vec!["menu.pdf".to_string()]));
    }

    #[test]
    fn test_parse_document_reads_every_page() {
        let extractor = FixedPages(vec![
            "シャブリ  ¥4000",
            "",
            "ムルソー  ¥9000\nバローロ  ¥ASK  イタリア",
        ]);
        let parsed = parse_document(&extractor, "list.pdf", b"").unwrap();
        let names: Vec<_> = parsed.candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["シャブリ", "ムルソー", "バローロ"]);
        assert_eq!(parsed.dropped_fields, 1);
    }

    #[test]
    fn test_image_only_pdf_is_extraction_empty() {
        let err = parse_document(&FixedPages(vec!["", "  \n "]), "scan.pdf", b"").unwrap_err();
        assert_eq!(
            err,
            ImportError::ExtractionEmpty {
                file: "scan.pdf".to_string()
            }
        );
    }

    #[test]
    fn test_text_without_wines_is_no_candidates() {
        let err = parse_document(&FixedPages(vec!["ご来店ありがとうございます"]), "x.pdf", b"")
            .unwrap_err();
        assert!(matches!(err, ImportError::NoCandidatesFound { .. }));
    }

    #[test]
    fn test_unreadable_carries_reason() {
        let err = parse_document(&Broken, "bad.pdf", b"").unwrap_err();
        assert_eq!(
            err,
            ImportError::Unreadable {
                file: "bad.pdf".to_string(),
                reason: "bad xref table".to_string()
            }
        );
    }

    /// Treats the upload bytes as already-extracted UTF-8 page text.
    struct PlainText;

    impl PageTextExtractor for PlainText {
        fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
            Ok(String::from_utf8_lossy(bytes)
                .split('\x0C')
                .map(str::to_string)
                .collect())
        }
    }

    #[tokio::test]
    async fn test_one_bad_file_aborts_whole_import() {
        let files = vec![
            UploadedFile {
                name: "menu.pdf".to_string(),
                bytes: Bytes::from_static(MENU.as_bytes()),
            },
            UploadedFile {
                name: "scan.pdf".to_string(),
                bytes: Bytes::from_static(b" \x0C "),
            },
        ];
        let extractor: Arc<dyn PageTextExtractor> = Arc::new(PlainText);
        let result = parse_uploads(extractor, files).await;
        assert_eq!(
            result.unwrap_err(),
            ImportError::ExtractionEmpty {
                file: "scan.pdf".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_parse_and_apply_reports_counts() {
        let mut library = WineLibrary::new();
        let mut pending = PendingSuggestions::default();
        let extractor: Arc<dyn PageTextExtractor> =
            Arc::new(FixedPages(vec!["シャブリ  ¥4000\nシャブリ  ¥4000  ¥時価"]));

        let parsed = parse_uploads(extractor, vec![upload("a.pdf"), upload("b.pdf")])
            .await
            .unwrap();
        let report = apply(&mut library, &mut pending, Similarity::from_ratio(0.8), parsed);

        assert_eq!(library.records().len(), 1);
        assert_eq!(report.added, 1);
        assert_eq!(report.merged, 3);
        assert_eq!(report.dropped_fields, 2);
        assert_eq!(library.records()[0].source_files, vec!["a.pdf", "b.pdf"]);
    }
}
