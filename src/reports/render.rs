//! Running reports and rendering their results.

use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::catalog::{self, REPORTS};
use crate::db::{display_value, ReadOnlyDb, SqlParam};
use crate::errors::GatewayError;
use crate::html::{escape, HtmlWriter};
use crate::metrics::REPORT_RUNS_TOTAL;

/// Column rewritten into archive links on the HTML page.
pub const LINK_COLUMN: &str = "s3key";

/// The outcome of one report run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReportResult {
    pub title: String,
    pub sql: String,
    pub column_names: Vec<String>,
    /// Every row has `column_names.len()` values.
    pub rows: Vec<Vec<Value>>,
}

/// Run report `index` with positional `params`.  Blocking.
pub fn run(db: &ReadOnlyDb, index: usize, params: &[SqlParam]) -> Result<ReportResult, GatewayError> {
    let report = catalog::get(index)?;
    counter!(REPORT_RUNS_TOTAL, "report" => index.to_string()).increment(1);

    let result = db.query(report.sql, params)?;
    debug!(report = index, rows = result.rows.len(), "report finished");

    Ok(ReportResult {
        title: report.title.to_string(),
        sql: report.sql.to_string(),
        column_names: result.columns,
        rows: result.rows,
    })
}

/// Turn every non-NULL `s3key` value into `<a href="/{key}">{key}</a>`.
///
/// Returns the index of the rewritten column, or `None` when the result
/// has no such column.  Other columns are left alone.
pub fn link_s3keys(result: &mut ReportResult) -> Option<usize> {
    let column = result.column_names.iter().position(|c| c == LINK_COLUMN)?;
    for row in &mut result.rows {
        if let Some(cell) = row.get_mut(column) {
            if cell.is_null() {
                continue;
            }
            let key = escape(&display_value(cell));
            *cell = Value::String(format!("<a href=\"/{key}\">{key}</a>"));
        }
    }
    Some(column)
}

/// Render the report page: the catalog index, plus the result table of
/// `selected` when a report was requested.  `selected.1` names a column
/// whose cells are already markup.
pub fn render_reports_page(selected: Option<(&ReportResult, Option<usize>)>) -> String {
    let mut w = HtmlWriter::new();
    w.open("html");
    w.open("head");
    w.text_element("title", "Reports");
    w.close("head");
    w.open("body");
    w.text_element("h1", "Reports");
    w.newline();

    w.open("ul");
    w.newline();
    for (index, report) in REPORTS.iter().enumerate() {
        w.open("li");
        w.link(&format!("?report={index}"), report.title);
        w.close("li");
        w.newline();
    }
    w.close("ul");
    w.newline();

    if let Some((result, markup_column)) = selected {
        w.text_element("h2", &result.title);
        w.text_element("pre", &result.sql);
        w.newline();
        w.open("table");
        w.newline();
        w.open("tr");
        for name in &result.column_names {
            w.text_element("th", name);
        }
        w.close("tr");
        w.newline();
        for row in &result.rows {
            w.open("tr");
            for (i, cell) in row.iter().enumerate() {
                w.open("td");
                if Some(i) == markup_column {
                    w.raw(&display_value(cell));
                } else {
                    w.text(&display_value(cell));
                }
                w.close("td");
            }
            w.close("tr");
            w.newline();
        }
        w.close("table");
        w.newline();
    }

    w.open("p");
    w.text(&format!(
        "{} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    ));
    w.close("p");
    w.close("body");
    w.close("html");
    w.finish()
}
