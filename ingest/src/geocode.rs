//! This module provides the reverse geocoding stage, which names the city and country each new coordinate falls in.

use {
    crate::{candidate::Candidate, error::IngestError, locale::LocaleOverrides},
    anyhow::{Context, Result},
    futures::future::{BoxFuture, FutureExt},
    serde_derive::Deserialize,
    std::collections::HashMap,
    tracing::{debug, info},
};

const NEIGHBORHOOD: &str = "neighborhood";

const ADMINISTRATIVE_AREA: &str = "administrative_area_level_1";

const COUNTRY: &str = "country";

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AddressComponent {
    pub long_name: String,
    #[serde(default)]
    pub types: Vec<String>,
}

impl AddressComponent {
    fn has_type(&self, type_: &str) -> bool {
        self.types.iter().any(|t| t == type_)
    }
}

/// Resolves a coordinate to the address components of the place it falls in.
pub trait ReverseGeocode: Send + Sync {
    fn reverse_geocode<'a>(
        &'a self,
        latitude: f64,
        longitude: f64,
    ) -> BoxFuture<'a, Result<Vec<AddressComponent>>>;
}

#[derive(Deserialize, Debug)]
struct GeocodeResult {
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Deserialize, Debug)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    #[serde(default)]
    error_message: Option<String>,
}

fn components(response: GeocodeResponse) -> Result<Vec<AddressComponent>> {
    match response.status.as_str() {
        "OK" | "ZERO_RESULTS" => Ok(response
            .results
            .into_iter()
            .next()
            .map(|result| result.address_components)
            .unwrap_or_default()),

        _ => Err(IngestError::ServiceStatus {
            service: "geocode",
            status: response.status,
            message: response.error_message.unwrap_or_default(),
        }
        .into()),
    }
}

/// [ReverseGeocode] backed by the Google Maps Geocoding API
pub struct GoogleGeocoder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleGeocoder {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
        }
    }
}

impl ReverseGeocode for GoogleGeocoder {
    fn reverse_geocode<'a>(
        &'a self,
        latitude: f64,
        longitude: f64,
    ) -> BoxFuture<'a, Result<Vec<AddressComponent>>> {
        async move {
            let response = self
                .client
                .get(format!("{}/geocode/json", self.base_url))
                .query(&[
                    ("latlng", format!("{},{}", latitude, longitude)),
                    ("key", self.api_key.clone()),
                ])
                .send()
                .await?
                .error_for_status()?
                .json::<GeocodeResponse>()
                .await?;

            components(response)
        }
        .boxed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Place {
    pub city: String,
    pub country: String,
}

/// Pick the city and country out of `components`, applying `overrides`.
pub fn place(
    components: &[AddressComponent],
    overrides: &LocaleOverrides,
    (latitude, longitude): (f64, f64),
) -> Result<Place> {
    if components.is_empty() {
        return Err(IngestError::NoAddressComponents {
            latitude,
            longitude,
        }
        .into());
    }

    let find = |type_: &str| {
        components
            .iter()
            .find(|component| component.has_type(type_))
            .map(|component| component.long_name.as_str())
    };

    let country = find(COUNTRY).unwrap_or_default();

    // neighborhood countries name places by neighborhood alone
    let city = if overrides.uses_neighborhood(country) {
        find(NEIGHBORHOOD).unwrap_or_default()
    } else {
        find(ADMINISTRATIVE_AREA)
            .map(|label| overrides.city(label))
            .unwrap_or_default()
    };

    if city.is_empty() || country.is_empty() {
        return Err(IngestError::MissingCityOrCountry {
            latitude,
            longitude,
        }
        .into());
    }

    Ok(Place {
        city: city.to_owned(),
        country: country.to_owned(),
    })
}

/// Fill in the city and country of each candidate whose coordinate is not stored yet, calling the geocoder once per
/// distinct coordinate.
pub async fn geocode_all(
    geocoder: &dyn ReverseGeocode,
    overrides: &LocaleOverrides,
    candidates: &mut [Candidate],
) -> Result<()> {
    info!("reverse geocoding");

    let mut places = HashMap::<(u64, u64), Place>::new();

    let len = candidates.len();

    for (index, candidate) in candidates.iter_mut().enumerate() {
        if candidate.resolved() {
            continue;
        }

        let key = candidate.coordinate_key();

        let place = if let Some(place) = places.get(&key) {
            debug!("reusing place {:?} for {}", place, candidate.path.display());

            place.clone()
        } else {
            let components = geocoder
                .reverse_geocode(candidate.latitude, candidate.longitude)
                .await
                .with_context(|| format!("unable to geocode {}", candidate.path.display()))?;

            let named = place(
                &components,
                overrides,
                (candidate.latitude, candidate.longitude),
            )
            .with_context(|| format!("unable to name place of {}", candidate.path.display()))?;

            places.insert(key, named.clone());

            named
        };

        info!(
            "({} of {}) {} taken in {}, {}",
            index + 1,
            len,
            candidate.path.display(),
            place.city,
            place.country
        );

        candidate.city = Some(place.city);
        candidate.country = Some(place.country);
    }

    Ok(())
}
