//! Row validation
//!
//! Turns one CSV row (`timestamp, service, severity, message`) into a
//! [`ValidatedRecord`], or explains why it was rejected. The parser holds no
//! state and performs no I/O, so a single instance is shared by every task.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use logviewer_common::Severity;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, warn};

use crate::error::RowError;
use crate::record::{ValidatedRecord, MAX_FIELD_CHARS};

/// Number of fields in a well-formed row.
pub const ROW_ARITY: usize = 4;

const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Debug, Clone, Copy, Default)]
pub struct RowParser;

impl RowParser {
    pub fn new() -> Self {
        Self
    }

    /// Validate a row, logging the reason and returning `None` on rejection.
    ///
    /// Never panics: an unexpected failure inside validation is logged and
    /// treated like any other rejected row.
    pub fn parse<S: AsRef<str>>(&self, row: &[S]) -> Option<ValidatedRecord> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.validate(row)))
            .unwrap_or_else(|payload| Err(RowError::Internal(panic_message(payload.as_ref()))));

        match outcome {
            Ok(record) => Some(record),
            Err(RowError::Internal(reason)) => {
                error!(row = ?render(row), %reason, "Error processing row");
                None
            },
            Err(err) => {
                warn!(row = ?render(row), "{}", err);
                None
            },
        }
    }

    /// Validate a row and return the rejection reason instead of logging it.
    ///
    /// Over-long `service` and `message` values are truncated, not rejected.
    pub fn validate<S: AsRef<str>>(&self, row: &[S]) -> Result<ValidatedRecord, RowError> {
        let [date, service, severity, message] = row else {
            return Err(RowError::InvalidFormat { found: row.len() });
        };

        let timestamp = parse_timestamp(date.as_ref())
            .ok_or_else(|| RowError::InvalidDate(date.as_ref().to_string()))?;

        let severity: Severity = severity
            .as_ref()
            .parse()
            .map_err(|_| RowError::InvalidSeverity(severity.as_ref().to_string()))?;

        Ok(ValidatedRecord::new(
            timestamp,
            severity,
            truncate_field("service", service.as_ref()),
            truncate_field("message", message.as_ref()),
        ))
    }
}

/// Parse the timestamp column. Naive forms are read as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_rfc2822(value) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Some(ts.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

fn truncate_field(field: &'static str, value: &str) -> String {
    let original_len = value.chars().count();
    if original_len <= MAX_FIELD_CHARS {
        return value.to_string();
    }

    warn!(
        field,
        original_len,
        max_len = MAX_FIELD_CHARS,
        "Field truncated from {} characters to {}",
        original_len,
        MAX_FIELD_CHARS
    );
    value.chars().take(MAX_FIELD_CHARS).collect()
}

fn render<S: AsRef<str>>(row: &[S]) -> Vec<&str> {
    row.iter().map(AsRef::as_ref).collect()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_parse_valid_row() {
        let parser = RowParser::new();
        let record = parser
            .parse(&row(&["2024-01-01T12:00:00Z", "svc", "INFO", "msg"]))
            .unwrap();

        assert_eq!(
            record.timestamp(),
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(record.service(), "svc");
        assert_eq!(record.severity(), Severity::Info);
        assert_eq!(record.message(), "msg");
    }

    #[test]
    fn test_wrong_arity_is_rejected() {
        let parser = RowParser::new();
        assert!(parser
            .parse(&row(&["2024-01-01T12:00:00Z", "svc", "INFO"]))
            .is_none());
        assert_eq!(
            parser
                .validate(&row(&["2024-01-01T12:00:00Z", "svc", "INFO", "msg", "extra"]))
                .unwrap_err(),
            RowError::InvalidFormat { found: 5 }
        );
        assert_eq!(
            parser.validate::<&str>(&[]).unwrap_err(),
            RowError::InvalidFormat { found: 0 }
        );
    }

    #[test]
    fn test_arity_error_names_expected_field_count() {
        let err = RowParser::new()
            .validate(&row(&["2024-01-01T12:00:00Z", "svc"]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Invalid row format: expected {ROW_ARITY} fields, found 2")
        );
        assert_eq!(ROW_ARITY, 4);
    }

    #[test]
    fn test_bad_date_is_rejected() {
        let parser = RowParser::new();
        assert!(parser.parse(&row(&["bad-date", "svc", "INFO", "msg"])).is_none());
        assert_eq!(
            parser
                .validate(&row(&["2024-13-45T00:00:00Z", "svc", "INFO", "msg"]))
                .unwrap_err(),
            RowError::InvalidDate("2024-13-45T00:00:00Z".to_string())
        );
    }

    #[test]
    fn test_unknown_severity_is_rejected() {
        let parser = RowParser::new();
        assert!(parser
            .parse(&row(&["2024-01-01T12:00:00Z", "svc", "BOGUS", "msg"]))
            .is_none());
        assert_eq!(
            parser
                .validate(&row(&["2024-01-01T12:00:00Z", "svc", "info", "msg"]))
                .unwrap_err(),
            RowError::InvalidSeverity("info".to_string())
        );
    }

    #[test]
    fn test_every_severity_is_accepted() {
        let parser = RowParser::new();
        for severity in Severity::ALL {
            let record = parser
                .parse(&row(&["2024-01-01T12:00:00Z", "svc", severity.as_str(), "msg"]))
                .unwrap();
            assert_eq!(record.severity(), severity);
        }
    }

    #[test]
    fn test_long_service_is_truncated() {
        let parser = RowParser::new();
        let service = "s".repeat(300);
        let record = parser
            .parse(&row(&["2024-01-01T12:00:00Z", &service, "INFO", "msg"]))
            .unwrap();

        assert_eq!(record.service().chars().count(), 255);
        assert_eq!(record.message(), "msg");
    }

    #[test]
    fn test_long_message_is_truncated_by_characters() {
        let parser = RowParser::new();
        // Multi-byte characters: truncation counts chars, not bytes.
        let message = "é".repeat(256);
        let record = parser
            .parse(&row(&["2024-01-01T12:00:00Z", "svc", "ERROR", &message]))
            .unwrap();

        assert_eq!(record.message().chars().count(), 255);
        assert_eq!(record.message(), "é".repeat(255));
    }

    #[test]
    fn test_field_at_limit_is_kept() {
        let parser = RowParser::new();
        let service = "s".repeat(255);
        let record = parser
            .parse(&row(&["2024-01-01T12:00:00Z", &service, "DEBUG", ""]))
            .unwrap();
        assert_eq!(record.service(), service);
        assert_eq!(record.message(), "");
    }

    #[test]
    fn test_timestamp_forms() {
        let noon = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-01T12:00:00Z"), Some(noon));
        assert_eq!(parse_timestamp("2024-01-01T14:00:00+02:00"), Some(noon));
        assert_eq!(parse_timestamp("2024-01-01 12:00:00"), Some(noon));
        assert_eq!(parse_timestamp("2024-01-01T12:00:00.000"), Some(noon));
        assert_eq!(parse_timestamp("Mon, 01 Jan 2024 12:00:00 +0000"), Some(noon));
        assert_eq!(
            parse_timestamp("2024-01-01"),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_panic_payload_message() {
        let payload = panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");
    }
}
