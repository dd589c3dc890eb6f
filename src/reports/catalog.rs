//! The fixed catalog of canned SQL reports.
//!
//! Reports are addressed by their position in [`REPORTS`].  Statements use
//! SQLite syntax and positional `?` placeholders.

use crate::errors::GatewayError;

/// One named report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub title: &'static str,
    pub sql: &'static str,
}

const SAFEDOCS_7_DAYS: &str = "SELECT substr(s3key, 1, 64) AS s3_prefix,
       round(CAST(sum(bytes_sent) AS REAL) / max(bytes)) AS count,
       min(dtime) AS first, max(dtime) AS last
  FROM downloads
  LEFT JOIN downloadable ON downloads.did = downloadable.id
 WHERE s3key LIKE 'corpora/files/CC%' AND dtime > datetime('now', '-7 days')
 GROUP BY s3_prefix HAVING count >= 1 ORDER BY s3_prefix";

const SAFEDOCS_30_DAYS: &str = "SELECT substr(s3key, 1, 64) AS s3_prefix,
       round(CAST(sum(bytes_sent) AS REAL) / max(bytes)) AS count,
       min(dtime) AS first, max(dtime) AS last
  FROM downloads
  LEFT JOIN downloadable ON downloads.did = downloadable.id
 WHERE s3key LIKE 'corpora/files/CC%' AND dtime > datetime('now', '-30 days')
 GROUP BY s3_prefix HAVING count >= 1 ORDER BY s3_prefix";

const SAFEDOCS_90_DAYS: &str = "SELECT substr(s3key, 1, 64) AS s3_prefix,
       round(CAST(sum(bytes_sent) AS REAL) / max(bytes)) AS count,
       min(dtime) AS first, max(dtime) AS last
  FROM downloads
  LEFT JOIN downloadable ON downloads.did = downloadable.id
 WHERE s3key LIKE 'corpora/files/CC%' AND dtime > datetime('now', '-90 days')
 GROUP BY s3_prefix HAVING count >= 1 ORDER BY s3_prefix";

/// Every report, in display order.  Titles match the production site,
/// trailing spaces included.
pub const REPORTS: &[Report] = &[
    Report {
        title: "Last 50 corpora uploads ",
        sql: "SELECT s3key, bytes, mtime, tags
  FROM downloadable
 WHERE present = 1
 ORDER BY mtime DESC
 LIMIT 50",
    },
    Report {
        title: "DARPA SAFEDOCS and UNSAFEDOCS downloads over past 7 days ",
        sql: SAFEDOCS_7_DAYS,
    },
    Report {
        title: "DARPA SAFEDOCS and UNSAFEDOCS downloads over past 30 days ",
        sql: SAFEDOCS_30_DAYS,
    },
    Report {
        title: "DARPA SAFEDOCS and UNSAFEDOCS downloads over past 90 days ",
        sql: SAFEDOCS_90_DAYS,
    },
    Report {
        title: "Downloads over past 7 days",
        sql: "SELECT s3key, round(CAST(sum(bytes_sent) AS REAL) / max(bytes)) AS count,
       min(dtime) AS first, max(dtime) AS last
  FROM downloads
  LEFT JOIN downloadable ON downloads.did = downloadable.id
 WHERE dtime > datetime('now', '-7 days')
 GROUP BY s3key
HAVING count >= 1
 ORDER BY count DESC",
    },
    Report {
        title: "Downloads in the past 24 hours",
        sql: "SELECT s3key, round(CAST(sum(bytes_sent) AS REAL) / max(bytes)) AS count
  FROM downloads
  LEFT JOIN downloadable ON downloads.did = downloadable.id
 WHERE dtime > datetime('now', '-24 hours')
 GROUP BY s3key
HAVING count >= 1
 ORDER BY count DESC",
    },
    Report {
        title: "Failed downloads in past 24 hours",
        sql: "SELECT s3key, round(CAST(sum(bytes_sent) AS REAL) / max(bytes)) AS count
  FROM downloads
  LEFT JOIN downloadable ON downloads.did = downloadable.id
 WHERE dtime > datetime('now', '-24 hours')
 GROUP BY s3key
HAVING count < 1
 ORDER BY count DESC",
    },
    Report {
        title: "Downloads per day for the past 30 days",
        sql: "SELECT ddate AS \"date\", count(*) AS count
  FROM (SELECT date(dtime) AS ddate, s3key,
               round(CAST(sum(bytes_sent) AS REAL) / max(bytes)) AS count
          FROM downloads
          LEFT JOIN downloadable ON downloads.did = downloadable.id
         WHERE dtime > datetime('now', '-30 days')
         GROUP BY s3key, date(dtime) HAVING count >= 1) a
 GROUP BY ddate
 ORDER BY ddate",
    },
];

/// Number of reports in the catalog.
pub fn count() -> usize {
    REPORTS.len()
}

/// Look up report `index`.
pub fn get(index: usize) -> Result<&'static Report, GatewayError> {
    REPORTS.get(index).ok_or(GatewayError::InvalidReport {
        index: index as i64,
        count: count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_order() {
        assert_eq!(count(), 8);
        assert_eq!(get(0).unwrap().title, "Last 50 corpora uploads ");
        assert_eq!(get(7).unwrap().title, "Downloads per day for the past 30 days");
    }

    #[test]
    fn test_out_of_range() {
        let err = get(8).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidReport { index: 8, count: 8 }));
    }

    #[test]
    fn test_windows_match_titles() {
        assert!(get(1).unwrap().sql.contains("'-7 days'"));
        assert!(get(2).unwrap().sql.contains("'-30 days'"));
        assert!(get(3).unwrap().sql.contains("'-90 days'"));
    }
}
