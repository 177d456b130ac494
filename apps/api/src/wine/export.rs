use std::fmt::Write as _;

use anyhow::Context;
use serde::Deserialize;

use crate::wine::models::WineRecord;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Markdown,
    Json,
    Csv,
}

const CSV_HEADER: [&str; 10] = [
    "Name",
    "Producer",
    "Country",
    "Region",
    "Grape Variety",
    "Vintage",
    "Price",
    "Alcohol Content",
    "Description",
    "Source File",
];

/// Renders records as a Markdown document, one section per wine with only
/// the fields that are set.
pub fn to_markdown(wines: &[&WineRecord]) -> String {
    if wines.is_empty() {
        return "# Wine Information\n\nNo wines selected.".to_string();
    }

    let mut out = String::from("# Selected Wines Information\n\n");
    for (i, wine) in wines.iter().enumerate() {
        let _ = write!(out, "## Wine {}: {}\n\n", i + 1, wine.name);

        let fields = [
            ("Producer", wine.producer.clone()),
            ("Country", wine.country.clone()),
            ("Region", wine.region.clone()),
            ("Grape Variety", wine.grape_variety.clone()),
            ("Vintage", wine.vintage.map(|v| v.to_string())),
            ("Price", wine.price.map(format_price)),
            ("Alcohol Content", wine.alcohol_content.clone()),
        ];
        for (label, value) in fields {
            if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
                let _ = write!(out, "**{label}:** {value}\n\n");
            }
        }
        if let Some(notes) = wine.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            let _ = write!(out, "**Notes:**\n{notes}\n\n");
        }
        if !wine.source_files.is_empty() {
            let _ = write!(out, "**Source File(s):** {}\n\n", wine.source_files.join(", "));
        }

        if i + 1 < wines.len() {
            out.push_str("---\n\n");
        }
    }
    out
}

/// Whole amounts print without a fractional part.
fn format_price(price: f64) -> String {
    if price.fract() == 0.0 && price.abs() < 1e15 {
        format!("{}", price as i64)
    } else {
        format!("{price:.2}")
    }
}

pub fn to_json(wines: &[&WineRecord]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(wines)
}

/// One row per wine; unset fields are empty cells.
pub fn to_csv(wines: &[&WineRecord]) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for wine in wines {
        writer.write_record([
            wine.name.clone(),
            wine.producer.clone().unwrap_or_default(),
            wine.country.clone().unwrap_or_default(),
            wine.region.clone().unwrap_or_default(),
            wine.grape_variety.clone().unwrap_or_default(),
            wine.vintage.map(|v| v.to_string()).unwrap_or_default(),
            wine.price.map(format_price).unwrap_or_default(),
            wine.alcohol_content.clone().unwrap_or_default(),
            wine.notes.clone().unwrap_or_default(),
            wine.source_files.join("; "),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .context("flushing CSV export")?;
    String::from_utf8(bytes).context("CSV export is not UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wine::models::RecordSource;

    #[test]
    fn test_empty_markdown() {
        assert_eq!(to_markdown(&[]), "# Wine Information\n\nNo wines selected.");
    }

    #[test]
    fn test_markdown_lists_only_present_fields() {
        let mut a = WineRecord::new("シャトー・マルゴー", RecordSource::PdfImport);
        a.region = Some("ボルドー".to_string());
        a.price = Some(8000.0);
        a.source_files = vec!["menu.pdf".to_string()];
        let mut b = WineRecord::new("Opus One", RecordSource::Manual);
        b.vintage = Some(2018);
        b.price = Some(149.5);
        b.notes = Some("cassis".to_string());

        let md = to_markdown(&[&a, &b]);
        assert!(md.starts_with("# Selected Wines Information\n\n## Wine 1: シャトー・マルゴー\n\n"));
        assert!(md.contains("**Region:** ボルドー\n\n**Price:** 8000\n\n**Source File(s):** menu.pdf\n\n---\n\n"));
        assert!(md.contains("## Wine 2: Opus One\n\n**Vintage:** 2018\n\n**Price:** 149.50\n\n**Notes:**\ncassis\n\n"));
        assert!(!md.contains("Producer"));
        assert_eq!(md.matches("---").count(), 1);
    }

    #[test]
    fn test_json_export_round_trips_ids() {
        let a = WineRecord::new("Barolo", RecordSource::PdfImport);
        let json = to_json(&[&a]).unwrap();
        let parsed: Vec<WineRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, vec![a]);
    }

    #[test]
    fn test_csv_has_header_and_one_row_per_wine() {
        let mut a = WineRecord::new("Opus One", RecordSource::PdfImport);
        a.region = Some("Napa".to_string());
        a.vintage = Some(2018);
        a.price = Some(150.0);
        a.alcohol_content = Some("14.5%".to_string());
        a.notes = Some("cassis, cedar".to_string());
        a.source_files = vec!["a.pdf".to_string(), "b.pdf".to_string()];
        let b = WineRecord::new("シャブリ", RecordSource::Manual);

        let csv = to_csv(&[&a, &b]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "Name,Producer,Country,Region,Grape Variety,Vintage,Price,Alcohol Content,Description,Source File"
        );
        assert_eq!(lines[1], "Opus One,,,Napa,,2018,150,14.5%,\"cassis, cedar\",a.pdf; b.pdf");
        assert_eq!(lines[2], "シャブリ,,,,,,,,,");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_empty_csv_is_header_only() {
        assert_eq!(to_csv(&[]).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_format_deserializes() {
        let f: ExportFormat = serde_json::from_str(r#""json""#).unwrap();
        assert_eq!(f, ExportFormat::Json);
        let f: ExportFormat = serde_json::from_str(r#""csv""#).unwrap();
        assert_eq!(f, ExportFormat::Csv);
        assert_eq!(ExportFormat::default(), ExportFormat::Markdown);
    }
}
