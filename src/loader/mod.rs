//! File import: scraped stock documents, code lists and price histories.

use crate::models::StockPatch;
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// ── Cleaners ─────────────────────────────────────────────────────────────────

/// Parse price: strip everything except digits, dot, minus.
/// "KRW 1,234.56" → 1234.56 | "610.00" → 610.0
pub fn parse_price(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || s == "N/A" || s == "-" || s == "—" {
        return None;
    }
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse().ok()
}

/// Parse dates: "Feb 20, 2024" (investing.com), ISO, or "2024.02.20"
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    ["%b %d, %Y", "%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d", "%d %b %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Strip a Google-Finance style exchange prefix: "KRX:005930" → "005930".
pub fn normalise_code(s: &str) -> String {
    let s = s.trim();
    s.strip_prefix("KRX:")
        .or_else(|| s.strip_prefix("KOSDAQ:"))
        .unwrap_or(s)
        .trim()
        .to_string()
}

// ── Stock documents ──────────────────────────────────────────────────────────

/// Stock code from a document filename: "005930.json" → "005930".
pub fn extract_code_from_filename(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let code = normalise_code(stem);
    if code.is_empty() { None } else { Some(code) }
}

/// Parse one scraped document. It must be a JSON object; a missing `code`
/// is filled from `fallback_code`.
pub fn parse_document(text: &str, fallback_code: Option<&str>) -> Result<StockPatch> {
    let mut value: Value = serde_json::from_str(text).context("Document is not valid JSON")?;
    let Some(map) = value.as_object_mut() else {
        bail!("Document is not a JSON object");
    };
    if !map.contains_key("code") {
        if let Some(code) = fallback_code {
            map.insert("code".to_string(), Value::String(code.to_string()));
        }
    }
    Ok(StockPatch::from_value(value)?)
}

pub fn load_document(path: &Path) -> Result<StockPatch> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let code = extract_code_from_filename(path);
    parse_document(&text, code.as_deref()).with_context(|| format!("Bad document {:?}", path))
}

pub fn discover_json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map(|e| e == "json").unwrap_or(false) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

// ── Code lists ───────────────────────────────────────────────────────────────

/// Read stock codes from a CSV. Uses the `code` column when present,
/// otherwise the first column. Duplicates are dropped, order is kept.
pub fn load_codes_csv(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {:?}", path))?;

    let column = reader
        .headers()?
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("code"))
        .unwrap_or(0);

    let mut codes: Vec<String> = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Row {} in {:?}: {}", i + 1, path, e);
                continue;
            }
        };
        let code = record.get(column).map(normalise_code).unwrap_or_default();
        if !code.is_empty() && !codes.contains(&code) {
            codes.push(code);
        }
    }

    info!("{:?}: {} codes loaded", path, codes.len());
    Ok(codes)
}

// ── Price history ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// Parse an investing.com style CSV (`Date, Price, ...`) into ascending
/// daily closes. Rows without a valid date or a positive price are skipped.
pub fn load_price_csv(path: &Path) -> Result<Vec<PricePoint>> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {:?}", path))?;
    let points = read_prices(reader, &path.display().to_string());
    info!("{:?}: {} prices loaded", path, points.len());
    Ok(points)
}

fn read_prices<R: std::io::Read>(mut reader: csv::Reader<R>, source: &str) -> Vec<PricePoint> {
    let mut points = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Row {} in {}: {}", i + 1, source, e);
                continue;
            }
        };
        let date = record.get(0).and_then(parse_date);
        let price = record.get(1).and_then(parse_price);
        match (date, price) {
            (Some(date), Some(price)) if price > 0.0 => points.push(PricePoint { date, price }),
            _ => debug!("Skipping row {} in {}", i + 1, source),
        }
    }
    points.sort_by_key(|p| p.date);
    points
}

// ── Tests ─────────────────────────────────────────────────────────────────────
