use {
    anyhow::{Context, Result},
    serde_derive::{Deserialize, Serialize},
    std::{
        collections::{HashMap, HashSet},
        path::Path,
    },
    tokio::fs,
};

/// Corrections applied to reverse-geocoding results so that place names match what we want to display
///
/// When loaded from JSON, any field left out keeps its default value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct LocaleOverrides {
    /// Administrative area label as returned by the geocoder, mapped to the city name to store
    pub cities: HashMap<String, String>,

    /// Countries for which the neighborhood label is more useful than the administrative area
    pub neighborhood_countries: HashSet<String>,
}

impl Default for LocaleOverrides {
    fn default() -> Self {
        Self {
            cities: [
                ("กรุงเทพมหานคร", "Bangkok"),
                ("เชียงใหม่", "Chang Wat Chiang Mai"),
                ("Chang Wat Samut Prakan", "Samut Prakan"),
                ("Wilayah Persekutuan Kuala Lumpur", "Kuala Lumpur"),
            ]
            .into_iter()
            .map(|(label, city)| (label.to_owned(), city.to_owned()))
            .collect(),

            neighborhood_countries: ["Taiwan".to_owned()].into_iter().collect(),
        }
    }
}

impl LocaleOverrides {
    pub async fn load(path: &Path) -> Result<Self> {
        let json = fs::read(path)
            .await
            .with_context(|| format!("unable to read locale overrides from {}", path.display()))?;

        serde_json::from_slice(&json)
            .with_context(|| format!("unable to parse locale overrides in {}", path.display()))
    }

    /// City name to store for the administrative area `label`
    pub fn city<'a>(&'a self, label: &'a str) -> &'a str {
        self.cities.get(label).map(String::as_str).unwrap_or(label)
    }

    pub fn uses_neighborhood(&self, country: &str) -> bool {
        self.neighborhood_countries.contains(country)
    }
}
