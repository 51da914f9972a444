//! This module provides [IngestError], the typed failures an ingestion run can abort with.
//!
//! Pipeline functions return `anyhow::Result`, so callers which care about the cause of a failure should use
//! `error.root_cause().downcast_ref::<IngestError>()`.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("no GPS coordinates in EXIF data of {}", .0.display())]
    MissingGps(PathBuf),

    #[error("no capture timestamp in EXIF data of {}", .0.display())]
    MissingTimestamp(PathBuf),

    #[error("unrecognized capture timestamp {timestamp:?} in {}", path.display())]
    BadTimestamp { path: PathBuf, timestamp: String },

    #[error("unsupported image format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("cannot write derivative to {}: a directory with that name already exists", .0.display())]
    DerivativeIsDirectory(PathBuf),

    #[error("{service} returned status {status}: {message}")]
    ServiceStatus {
        service: &'static str,
        status: String,
        message: String,
    },

    #[error("unknown time zone {0:?}")]
    UnknownTimezone(String),

    #[error("no address components for latitude {latitude}, longitude {longitude}")]
    NoAddressComponents { latitude: f64, longitude: f64 },

    #[error("couldn't find either city or country for latitude {latitude}, longitude {longitude}")]
    MissingCityOrCountry { latitude: f64, longitude: f64 },

    #[error("upload of {name} failed with HTTP {status}")]
    Upload { name: String, status: u16 },
}
