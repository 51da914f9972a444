//! Atlas shared record types
//!
//! This crate contains the [serde](https://crates.io/crates/serde)-enabled records which the ingestion pipeline
//! persists and which downstream consumers (the posting bot and the map viewer) read back out of the store.

use {
    anyhow::{anyhow, Error, Result},
    chrono::{DateTime, Utc},
    chrono_tz::Tz,
    serde_derive::{Deserialize, Serialize},
    std::{
        fmt::{self, Display},
        str::FromStr,
    },
};

/// Label used by [Image::location] when neither a city nor a country is known
pub const UNDISCLOSED_LOCATION: &str = "an undisclosed location";

/// A persisted photograph, joined with its coordinate and location
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// Identifier assigned by the store
    pub id: i64,

    /// Locator of the original file
    pub url_large: String,

    /// Locator of the medium-width derivative
    pub url_medium: String,

    /// Locator of the small-width derivative
    pub url_small: String,

    /// Hex-encoded SHA-256 hash of the contents of the original file
    pub sha256: String,

    /// The instant the photo was taken
    pub timestamp: DateTime<Utc>,

    pub latitude: f64,

    pub longitude: f64,

    pub city: String,

    pub country: String,

    /// IANA name of the zone the photo was taken in, e.g. "Asia/Bangkok"
    pub timezone: String,
}

impl Image {
    /// Render a human-readable place name, e.g. "Bangkok, Thailand".
    ///
    /// If only one of city and country is known, just that one is returned.
    pub fn location(&self) -> String {
        match (self.city.is_empty(), self.country.is_empty()) {
            (false, false) => format!("{}, {}", self.city, self.country),
            (true, false) => self.country.clone(),
            (false, true) => self.city.clone(),
            (true, true) => UNDISCLOSED_LOCATION.into(),
        }
    }

    /// Convert [Image::timestamp] to wall-clock time in the zone the photo was taken in.
    pub fn local_timestamp(&self) -> Result<DateTime<Tz>> {
        let zone = self
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("unknown time zone {}: {}", self.timezone, e))?;

        Ok(self.timestamp.with_timezone(&zone))
    }
}

/// A social media platform images may be posted to
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Platform {
    Mastodon,
    X,
}

impl Platform {
    /// The name under which this platform is recorded in the `platforms` table
    pub fn name(self) -> &'static str {
        match self {
            Platform::Mastodon => "Mastodon",
            Platform::X => "X",
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mastodon" => Ok(Platform::Mastodon),
            "x" | "twitter" => Ok(Platform::X),
            _ => Err(anyhow!("unknown platform: {}", s)),
        }
    }
}
