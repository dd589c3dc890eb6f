//! Canned SQL reports over the metadata database.

pub mod catalog;
pub mod render;

pub use catalog::{count, Report, REPORTS};
pub use render::{link_s3keys, render_reports_page, run, ReportResult};
