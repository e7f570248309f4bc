//! Error types for tpf-harvest
//!
//! This module provides the error taxonomy of the harvesting pipeline:
//! - [`AcquisitionError`] - a file could not be fetched from the mirror or the archive
//! - [`FormatError`] - a file could not be decoded as a FITS container
//! - [`CleanupError`] - a scratch file could not be removed (logged only)
//! - [`ConfigurationError`] - a campaign could not be started
//!
//! Every error carries a stable, machine-readable code (see [`Error::error_code`])
//! which is attached to log events as the `error_code` field.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tpf-harvest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tpf-harvest
///
/// Per-file errors never escape a [`HarvestWorker`](crate::worker::HarvestWorker);
/// this type surfaces at the campaign and CLI level.
#[derive(Debug, Error)]
pub enum Error {
    /// Acquisition of a remote file failed
    #[error("acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),

    /// A file could not be decoded
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// A scratch file could not be deleted
    #[error("cleanup error: {0}")]
    Cleanup(#[from] CleanupError),

    /// A campaign could not be configured
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// I/O error on the output table
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// CSV serialization error on the output table
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration file could not be parsed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while resolving a URL to a locally readable file
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// The URL could not be parsed or has no file name
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The server answered with a non-success status
    #[error("HTTP {status} fetching {url}")]
    Http {
        /// The requested URL
        url: String,
        /// HTTP status code returned by the server
        status: u16,
    },

    /// Connection, timeout or body-stream failure
    #[error("transport failure fetching {url}: {message}")]
    Transport {
        /// The requested URL
        url: String,
        /// Underlying transport error message
        message: String,
    },

    /// The scratch file could not be created or written
    #[error("scratch file {path} unusable: {source}")]
    Scratch {
        /// The scratch file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Every attempt failed; carries the last failure
    #[error("{url}: gave up after {attempts} attempts: {last}")]
    AttemptsExhausted {
        /// The requested URL
        url: String,
        /// Number of attempts made
        attempts: u32,
        /// The error returned by the final attempt
        last: Box<AcquisitionError>,
    },
}

impl AcquisitionError {
    /// Get a machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            AcquisitionError::InvalidUrl(_) => "invalid_url",
            AcquisitionError::Http { .. } => "http_status",
            AcquisitionError::Transport { .. } => "transport",
            AcquisitionError::Scratch { .. } => "scratch_io",
            AcquisitionError::AttemptsExhausted { .. } => "attempts_exhausted",
        }
    }
}

/// Errors raised while decoding a FITS container
#[derive(Debug, Error)]
pub enum FormatError {
    /// Reading the file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The primary header does not start with `SIMPLE = T`
    #[error("not a FITS file: {0}")]
    NotFits(String),

    /// The file ended inside a header or data unit
    #[error("truncated file: {0}")]
    Truncated(String),

    /// A keyword required to lay out the file is absent
    #[error("segment {segment}: missing structural keyword {keyword}")]
    MissingKeyword {
        /// Segment (HDU) index
        segment: usize,
        /// The missing keyword
        keyword: String,
    },

    /// A structural keyword has an unusable value
    #[error("segment {segment}: invalid value for {keyword}: {value}")]
    InvalidValue {
        /// Segment (HDU) index
        segment: usize,
        /// The offending keyword
        keyword: String,
        /// The raw value text
        value: String,
    },

    /// A header card could not be decoded
    #[error("invalid header card: {0}")]
    InvalidCard(String),

    /// The requested segment does not exist
    #[error("segment {index} out of range (file has {count} segments)")]
    SegmentOutOfRange {
        /// Requested segment index
        index: usize,
        /// Number of segments in the file
        count: usize,
    },

    /// The data array uses a BITPIX value this reader does not decode
    #[error("segment {segment}: unsupported BITPIX {bitpix}")]
    UnsupportedBitpix {
        /// Segment (HDU) index
        segment: usize,
        /// The BITPIX value
        bitpix: i64,
    },

    /// The segment is a table or random-groups unit, not an image array
    #[error("segment {0} is not an image array")]
    NotAnImage(usize),
}

impl FormatError {
    /// Get a machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            FormatError::Io(_) => "read_io",
            FormatError::NotFits(_) => "not_fits",
            FormatError::Truncated(_) => "truncated",
            FormatError::MissingKeyword { .. } => "missing_keyword",
            FormatError::InvalidValue { .. } => "invalid_value",
            FormatError::InvalidCard(_) => "invalid_card",
            FormatError::SegmentOutOfRange { .. } => "segment_out_of_range",
            FormatError::UnsupportedBitpix { .. } => "unsupported_bitpix",
            FormatError::NotAnImage(_) => "not_an_image",
        }
    }
}

/// A scratch file could not be deleted
#[derive(Debug, Error)]
#[error("could not delete {path}: {source}")]
pub struct CleanupError {
    /// The scratch file path
    pub path: PathBuf,
    /// Underlying I/O error
    #[source]
    pub source: std::io::Error,
}

/// Errors that prevent a campaign run from starting
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The campaign's URL list could not be read
    #[error("URL list {path} unreadable: {source}")]
    MissingUrlList {
        /// Path of the URL list
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The campaign's URL list has no URLs
    #[error("URL list {path} contains no URLs")]
    EmptyUrlList {
        /// Path of the URL list
        path: PathBuf,
    },

    /// The campaign selector is neither a number nor `all`
    #[error("invalid campaign selector: {0}")]
    InvalidCampaign(String),

    /// A configuration value is out of range
    #[error("invalid setting {key}: {message}")]
    Invalid {
        /// The configuration key (e.g., "concurrency")
        key: String,
        /// Human-readable description of the problem
        message: String,
    },
}

impl ConfigurationError {
    /// Get a machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            ConfigurationError::MissingUrlList { .. } => "missing_url_list",
            ConfigurationError::EmptyUrlList { .. } => "empty_url_list",
            ConfigurationError::InvalidCampaign(_) => "invalid_campaign",
            ConfigurationError::Invalid { .. } => "invalid_setting",
        }
    }
}

impl Error {
    /// Get a machine-readable error code
    ///
    /// Nested domain errors report their own, more specific code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Acquisition(e) => e.error_code(),
            Error::Format(e) => e.error_code(),
            Error::Cleanup(_) => "cleanup_failed",
            Error::Configuration(e) => e.error_code(),
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Csv(_) => "csv_error",
            Error::Serialization(_) => "serialization_error",
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_errors_report_their_own_code() {
        let err: Error = AcquisitionError::Http {
            url: "http://x/a.fits".into(),
            status: 503,
        }
        .into();
        assert_eq!(err.error_code(), "http_status");

        let err: Error = FormatError::NotFits("a.fits".into()).into();
        assert_eq!(err.error_code(), "not_fits");

        let err: Error = ConfigurationError::InvalidCampaign("x".into()).into();
        assert_eq!(err.error_code(), "invalid_campaign");
    }

    #[test]
    fn exhausted_error_names_the_last_failure() {
        let err = AcquisitionError::AttemptsExhausted {
            url: "http://x/a.fits".into(),
            attempts: 3,
            last: Box::new(AcquisitionError::Http {
                url: "http://x/a.fits".into(),
                status: 500,
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempts"), "{msg}");
        assert!(msg.contains("HTTP 500"), "{msg}");
    }

    #[test]
    fn cleanup_error_display_includes_path() {
        let err = CleanupError {
            path: PathBuf::from("/scratch/a.fits"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(
            err.to_string(),
            "could not delete /scratch/a.fits: denied"
        );
        assert_eq!(Error::from(err).error_code(), "cleanup_failed");
    }
}
