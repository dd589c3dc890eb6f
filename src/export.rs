//! Bulk exports of the `downloadable` table.
//!
//! `/index.tsv` dumps every present row as tab-separated text and
//! `/search/api` returns the rows whose key matches a substring as JSON.
//! Both take an optional `offset` and `row_count`; anything missing or
//! unparsable falls back to the defaults, and the configured
//! `max_row_count` caps what a client may ask for.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;

use crate::config::ExportConfig;
use crate::db::{display_value, QueryResult, ReadOnlyDb, SqlParam};
use crate::errors::GatewayError;

pub const DEFAULT_OFFSET: u64 = 0;
pub const DEFAULT_ROW_COUNT: u64 = 1_000_000;
pub const DEFAULT_SEARCH_ROW_COUNT: u64 = 1000;

const INDEX_SQL: &str =
    "SELECT * FROM downloadable WHERE present = 1 ORDER BY s3key LIMIT ?1 OFFSET ?2";

const SEARCH_SQL: &str = "SELECT * FROM downloadable \
     WHERE s3key LIKE ?1 AND present = 1 ORDER BY s3key LIMIT ?2 OFFSET ?3";

/// Parse `raw` as an unsigned integer, falling back to `default`.
pub fn parse_or(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

/// Offset and row count of one export request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub row_count: u64,
}

impl Window {
    /// Window from raw query values.  `row_count` is clamped to `cap`.
    pub fn from_query(
        offset: Option<&str>,
        row_count: Option<&str>,
        default_row_count: u64,
        cap: u64,
    ) -> Self {
        Self {
            offset: parse_or(offset, DEFAULT_OFFSET),
            row_count: parse_or(row_count, default_row_count).min(cap),
        }
    }

    /// Window for `/index.tsv`.
    pub fn for_index(config: &ExportConfig, offset: Option<&str>, row_count: Option<&str>) -> Self {
        Self::from_query(offset, row_count, config.index_row_count, config.max_row_count)
    }

    /// Window for `/search/api`.
    pub fn for_search(config: &ExportConfig, offset: Option<&str>, row_count: Option<&str>) -> Self {
        Self::from_query(offset, row_count, config.search_row_count, config.max_row_count)
    }

    fn params(&self) -> [SqlParam; 2] {
        [
            SqlParam::Integer(clamp_i64(self.row_count)),
            SqlParam::Integer(clamp_i64(self.offset)),
        ]
    }
}

fn clamp_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Present rows in key order.  Blocking.
pub fn export_index(db: &ReadOnlyDb, window: Window) -> Result<QueryResult, GatewayError> {
    Ok(db.query(INDEX_SQL, &window.params())?)
}

/// Present rows whose key contains `query`, in key order.  Blocking.
pub fn search(db: &ReadOnlyDb, query: &str, window: Window) -> Result<QueryResult, GatewayError> {
    let [limit, offset] = window.params();
    let pattern = SqlParam::Text(format!("%{query}%"));
    Ok(db.query(SEARCH_SQL, &[pattern, limit, offset])?)
}

/// Tab-separated text: a header row of column names, then one line per
/// row.  NULL becomes an empty field; fields are quoted only when they
/// contain a tab, quote, or line break.
pub fn to_tsv(result: &QueryResult) -> Result<String, GatewayError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());
    let tsv_error = |e: csv::Error| GatewayError::Internal(e.into());

    writer.write_record(&result.columns).map_err(tsv_error)?;
    for row in &result.rows {
        writer
            .write_record(row.iter().map(display_value))
            .map_err(tsv_error)?;
    }

    let buf = writer
        .into_inner()
        .map_err(|e| GatewayError::Internal(anyhow::anyhow!("tsv flush failed: {}", e.error())))?;
    String::from_utf8(buf).map_err(|e| GatewayError::Internal(e.into()))
}

/// JSON array of row objects with sorted keys and a four-space indent.
pub fn to_json(result: &QueryResult) -> Result<String, GatewayError> {
    // Sorted keys.
    let rows: Vec<BTreeMap<&str, &Value>> = result
        .rows
        .iter()
        .map(|row| {
            result
                .columns
                .iter()
                .map(String::as_str)
                .zip(row.iter())
                .collect()
        })
        .collect();

    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    rows.serialize(&mut ser)
        .map_err(|e| GatewayError::Internal(e.into()))?;
    String::from_utf8(buf).map_err(|e| GatewayError::Internal(e.into()))
}
