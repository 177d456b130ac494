// Wine record extraction and deduplication.
// Implements: page text extraction, candidate parsing, identity-key and fuzzy
// dedup, the session library, export and selection.
// PDF extraction is CPU-bound and runs inside tokio::task::spawn_blocking.

pub mod dedup;
pub mod export;
pub mod extract;
pub mod handlers;
pub mod import;
pub mod library;
pub mod models;
pub mod parser;
pub mod script;
pub mod selection;
pub mod similarity;

pub use extract::{PageTextExtractor, PdfTextExtractor};
pub use models::{RecordSource, WineRecord};
