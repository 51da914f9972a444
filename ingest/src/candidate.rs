use {
    chrono::{DateTime, NaiveDateTime, Utc},
    std::path::PathBuf,
};

/// In-flight state of one source file during an ingestion run
///
/// Each pipeline stage fills in more of these fields; a `Candidate` only becomes an `atlas_shared::Image` once the
/// persister has written it to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Path of the original file
    pub path: PathBuf,

    /// Hex-encoded SHA-256 hash of the original file
    pub sha256: String,

    pub latitude: f64,

    pub longitude: f64,

    /// Capture time as recorded by the camera, i.e. wall-clock time in an unknown zone
    pub naive_datetime: NaiveDateTime,

    /// Capture time once the zone has been determined
    pub datetime: Option<DateTime<Utc>>,

    pub medium_path: Option<PathBuf>,

    pub small_path: Option<PathBuf>,

    /// Set if the exact coordinate is already stored, in which case no location lookups are needed
    pub coordinate_id: Option<i64>,

    /// IANA zone name, either looked up or taken from the already-stored location
    pub timezone: Option<String>,

    pub city: Option<String>,

    pub country: Option<String>,
}

impl Candidate {
    pub fn new(
        path: PathBuf,
        sha256: String,
        (latitude, longitude): (f64, f64),
        naive_datetime: NaiveDateTime,
    ) -> Self {
        Self {
            path,
            sha256,
            latitude,
            longitude,
            naive_datetime,
            datetime: None,
            medium_path: None,
            small_path: None,
            coordinate_id: None,
            timezone: None,
            city: None,
            country: None,
        }
    }

    /// Whether the coordinate of this candidate was found in the store
    pub fn resolved(&self) -> bool {
        self.coordinate_id.is_some()
    }

    /// Key identifying the exact coordinate, usable in hash maps
    pub fn coordinate_key(&self) -> (u64, u64) {
        (self.latitude.to_bits(), self.longitude.to_bits())
    }
}
