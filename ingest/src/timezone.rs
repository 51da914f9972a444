//! This module provides the timezone correction stage, which turns the naive wall-clock capture time of each
//! candidate into a UTC instant using the zone in effect at the place the photo was taken.

use {
    crate::{candidate::Candidate, error::IngestError},
    anyhow::{anyhow, Context, Result},
    chrono::{DateTime, Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Utc},
    chrono_tz::Tz,
    futures::future::{BoxFuture, FutureExt},
    serde_derive::Deserialize,
    std::collections::HashMap,
    tracing::{debug, info},
};

/// Looks up the IANA zone name in effect at a coordinate.
pub trait TimezoneLookup: Send + Sync {
    /// `instant` is only a hint for services which answer per point in time (e.g. to report DST); the returned
    /// name must not depend on it.
    fn timezone<'a>(
        &'a self,
        latitude: f64,
        longitude: f64,
        instant: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<String>>;
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TimezoneResponse {
    status: String,
    #[serde(default)]
    time_zone_id: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

fn zone_id(response: TimezoneResponse) -> Result<String> {
    if response.status != "OK" {
        return Err(IngestError::ServiceStatus {
            service: "timezone",
            status: response.status,
            message: response.error_message.unwrap_or_default(),
        }
        .into());
    }

    response
        .time_zone_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow!("timezone response has no timeZoneId"))
}

/// [TimezoneLookup] backed by the Google Maps Time Zone API
pub struct GoogleTimezone {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleTimezone {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
        }
    }
}

impl TimezoneLookup for GoogleTimezone {
    fn timezone<'a>(
        &'a self,
        latitude: f64,
        longitude: f64,
        instant: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<String>> {
        async move {
            let response = self
                .client
                .get(format!("{}/timezone/json", self.base_url))
                .query(&[
                    ("location", format!("{},{}", latitude, longitude)),
                    ("timestamp", instant.timestamp().to_string()),
                    ("language", "en".to_owned()),
                    ("key", self.api_key.clone()),
                ])
                .send()
                .await?
                .error_for_status()?
                .json::<TimezoneResponse>()
                .await?;

            zone_id(response)
        }
        .boxed()
    }
}

/// Interpret `naive` as wall-clock time in the zone named `zone`, returning the corresponding instant.
///
/// A time which occurs twice (when clocks are set back) resolves to the earlier instant. A time which never occurs
/// (when clocks are set forward) is shifted by the zone's offset at `naive` read as UTC.
pub fn reinterpret(naive: &NaiveDateTime, zone: &str) -> Result<DateTime<Utc>> {
    let tz = zone
        .parse::<Tz>()
        .map_err(|_| IngestError::UnknownTimezone(zone.to_owned()))?;

    Ok(match tz.from_local_datetime(naive) {
        LocalResult::Single(datetime) | LocalResult::Ambiguous(datetime, _) => {
            datetime.with_timezone(&Utc)
        }
        LocalResult::None => {
            let offset = tz.offset_from_utc_datetime(naive).fix();

            Utc.from_utc_datetime(&(*naive - Duration::seconds(offset.local_minus_utc().into())))
        }
    })
}

/// Fill in the zone and UTC capture time of each candidate.
///
/// Candidates at a stored coordinate reuse the zone of the stored location; the others are looked up, once per
/// distinct coordinate.
pub async fn correct_all(lookup: &dyn TimezoneLookup, candidates: &mut [Candidate]) -> Result<()> {
    info!("correcting timestamps");

    let mut zones = HashMap::<(u64, u64), String>::new();

    let len = candidates.len();

    for (index, candidate) in candidates.iter_mut().enumerate() {
        let zone = if let Some(zone) = &candidate.timezone {
            zone.clone()
        } else if let Some(zone) = zones.get(&candidate.coordinate_key()) {
            debug!("reusing zone {} for {}", zone, candidate.path.display());

            zone.clone()
        } else {
            let zone = lookup
                .timezone(
                    candidate.latitude,
                    candidate.longitude,
                    Utc.from_utc_datetime(&candidate.naive_datetime),
                )
                .await
                .with_context(|| {
                    format!("unable to look up timezone for {}", candidate.path.display())
                })?;

            zones.insert(candidate.coordinate_key(), zone.clone());

            zone
        };

        let datetime = reinterpret(&candidate.naive_datetime, &zone)?;

        info!(
            "({} of {}) {} taken at {} ({})",
            index + 1,
            len,
            candidate.path.display(),
            datetime,
            zone
        );

        candidate.timezone = Some(zone);
        candidate.datetime = Some(datetime);
    }

    Ok(())
}
