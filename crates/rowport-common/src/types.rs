//! Common types used across Rowport

use serde::{Deserialize, Serialize};

/// Lifecycle status of an uploaded input file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    ErrorLoading,
    ErrorTransform,
    ErrorUploaded,
    Loaded,
    Loading,
    Transforming,
    Uploaded,
    Retry,
    /// Legacy value kept so previously stored records remain readable.
    /// New code records `Canceled` or `Loaded` instead.
    Deleted,
    Canceled,
}

impl FileStatus {
    /// Statuses from which a file may be canceled
    pub const CANCELABLE: [FileStatus; 5] = [
        FileStatus::ErrorLoading,
        FileStatus::ErrorTransform,
        FileStatus::ErrorUploaded,
        FileStatus::Uploaded,
        FileStatus::Retry,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            FileStatus::ErrorLoading => "error_loading",
            FileStatus::ErrorTransform => "error_transform",
            FileStatus::ErrorUploaded => "error_uploaded",
            FileStatus::Loaded => "loaded",
            FileStatus::Loading => "loading",
            FileStatus::Transforming => "transforming",
            FileStatus::Uploaded => "uploaded",
            FileStatus::Retry => "retry",
            FileStatus::Deleted => "deleted",
            FileStatus::Canceled => "canceled",
        }
    }

    /// Whether the pipeline may pick this file up
    pub fn is_pending(&self) -> bool {
        matches!(self, FileStatus::Uploaded | FileStatus::Retry)
    }

    /// Problematic files can be retried; pending, completed and in-progress work cannot.
    pub fn can_be_retried(&self) -> bool {
        match self {
            FileStatus::ErrorLoading | FileStatus::ErrorTransform | FileStatus::ErrorUploaded => {
                true
            },
            FileStatus::Uploaded
            | FileStatus::Retry
            | FileStatus::Loaded
            | FileStatus::Loading
            | FileStatus::Transforming
            | FileStatus::Deleted
            | FileStatus::Canceled => false,
        }
    }

    /// Problematic files and pending work can be canceled.
    pub fn can_be_canceled(&self) -> bool {
        Self::CANCELABLE.contains(self)
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FileStatus {
    type Err = crate::RowportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error_loading" => Ok(FileStatus::ErrorLoading),
            "error_transform" => Ok(FileStatus::ErrorTransform),
            "error_uploaded" => Ok(FileStatus::ErrorUploaded),
            "loaded" => Ok(FileStatus::Loaded),
            "loading" => Ok(FileStatus::Loading),
            "transforming" => Ok(FileStatus::Transforming),
            "uploaded" => Ok(FileStatus::Uploaded),
            "retry" => Ok(FileStatus::Retry),
            "deleted" => Ok(FileStatus::Deleted),
            "canceled" => Ok(FileStatus::Canceled),
            other => Err(crate::RowportError::Parse(format!("Unknown file status: {other}"))),
        }
    }
}

/// Classification of one row's trip through transform and publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    /// The target created the resource
    Success,
    /// The target already held an identical resource
    Exist,
    /// Transform or publish failed
    Error,
    /// Same payload already sent to the same endpoint during this file run
    Duplicate,
}

/// Result recorded in the ingestion log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionResult {
    Success,
    Error,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_only_uploaded_and_retry_are_pending() {
        assert!(FileStatus::Uploaded.is_pending());
        assert!(FileStatus::Retry.is_pending());
        assert!(!FileStatus::Transforming.is_pending());
        assert!(!FileStatus::ErrorLoading.is_pending());
        assert!(!FileStatus::Loaded.is_pending());
    }

    #[test]
    fn test_retry_rules() {
        assert!(FileStatus::ErrorLoading.can_be_retried());
        assert!(FileStatus::ErrorTransform.can_be_retried());
        assert!(FileStatus::ErrorUploaded.can_be_retried());
        assert!(!FileStatus::Uploaded.can_be_retried());
        assert!(!FileStatus::Loaded.can_be_retried());
        assert!(!FileStatus::Deleted.can_be_retried());
    }

    #[test]
    fn test_cancel_rules() {
        assert!(FileStatus::Uploaded.can_be_canceled());
        assert!(FileStatus::Retry.can_be_canceled());
        assert!(FileStatus::ErrorUploaded.can_be_canceled());
        assert!(!FileStatus::Transforming.can_be_canceled());
        assert!(!FileStatus::Canceled.can_be_canceled());
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [FileStatus::Loaded, FileStatus::ErrorLoading, FileStatus::Retry] {
            assert_eq!(status.as_str().parse::<FileStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<FileStatus>().is_err());
    }
}
