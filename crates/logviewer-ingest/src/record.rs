//! Pipeline data types

use chrono::{DateTime, Utc};
use logviewer_common::Severity;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Maximum length, in characters, of the `service` and `message` fields.
pub const MAX_FIELD_CHARS: usize = 255;

/// A staged upload waiting for, or undergoing, processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub id: String,
    pub staging_path: PathBuf,
}

impl UploadTask {
    pub fn new(id: impl Into<String>, staging_path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            staging_path: staging_path.into(),
        }
    }

    pub fn staging_path(&self) -> &Path {
        &self.staging_path
    }
}

/// A log row that passed validation. Only the row parser constructs these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedRecord {
    timestamp: DateTime<Utc>,
    severity: Severity,
    service: String,
    message: String,
}

impl ValidatedRecord {
    pub(crate) fn new(
        timestamp: DateTime<Utc>,
        severity: Severity,
        service: String,
        message: String,
    ) -> Self {
        Self {
            timestamp,
            severity,
            service,
            message,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
