#![deny(warnings)]

use {
    anyhow::{anyhow, Result},
    atlas_shared::Image,
    sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, SqliteConnection},
    std::{ops::DerefMut, path::Path, sync::Arc},
    structopt::StructOpt,
    tokio::sync::Mutex as AsyncMutex,
    tracing::info,
};

pub use {
    error::IngestError,
    geocode::{GoogleGeocoder, ReverseGeocode},
    locale::LocaleOverrides,
    timezone::{GoogleTimezone, TimezoneLookup},
    upload::{HttpSink, LocalSink, UploadSink},
};

mod candidate;
mod coordinates;
mod dedup;
mod error;
pub mod geocode;
pub mod locale;
mod persist;
mod resize;
mod scan;
pub mod store;
pub mod timezone;
pub mod upload;

#[cfg(test)]
mod test_util;

const BUFFER_SIZE: usize = 16 * 1024;

#[derive(StructOpt, Debug)]
#[structopt(name = "atlas-ingest", about = "Photo ingestion pipeline")]
pub struct Options {
    /// Directory containing the photos to ingest
    #[structopt(default_value = ".")]
    pub directory: String,

    /// SQLite database to create or reuse
    #[structopt(long, default_value = "atlas.db")]
    pub state_file: String,

    /// Google Maps API key used for timezone and reverse geocoding lookups
    #[structopt(long, env = "ATLAS_GOOGLE_MAPS_API_KEY", hide_env_values = true)]
    pub maps_api_key: String,

    /// Base URL of the Google Maps web services
    #[structopt(long, default_value = "https://maps.googleapis.com/maps/api")]
    pub maps_base_url: String,

    /// Base URL to which originals and derivatives are uploaded with HTTP PUT.  If not specified, files are left in
    /// place and referenced by path.
    #[structopt(long)]
    pub upload_url: Option<String>,

    /// Bearer token to send with uploads
    #[structopt(long, env = "ATLAS_UPLOAD_TOKEN", hide_env_values = true)]
    pub upload_token: Option<String>,

    /// JSON file containing place name corrections to use instead of the built-in ones
    #[structopt(long)]
    pub locale_overrides: Option<String>,

    /// If set, delete originals and derivatives once they've been uploaded and recorded (requires --upload-url)
    #[structopt(long)]
    pub remove_local: bool,
}

pub async fn migrate(conn: &mut SqliteConnection) -> Result<()> {
    for statement in schema::DDL_STATEMENTS {
        sqlx::query(statement).execute(&mut *conn).await?;
    }

    Ok(())
}

pub async fn open(state_file: &str) -> Result<SqliteConnection> {
    let mut conn = format!("sqlite://{}", state_file)
        .parse::<SqliteConnectOptions>()?
        .create_if_missing(true)
        .connect()
        .await?;

    migrate(&mut conn).await?;

    Ok(conn)
}

/// Runs the ingestion pipeline against a directory, using the configured external services.
pub struct Ingestor {
    pub timezones: Arc<dyn TimezoneLookup>,
    pub geocoder: Arc<dyn ReverseGeocode>,
    pub sink: Arc<dyn UploadSink>,
    pub overrides: LocaleOverrides,
    pub remove_local: bool,
}

impl Ingestor {
    pub async fn from_options(options: &Options) -> Result<Self> {
        let client = reqwest::Client::new();

        let sink: Arc<dyn UploadSink> = if let Some(upload_url) = &options.upload_url {
            Arc::new(HttpSink::new(
                client.clone(),
                upload_url,
                options.upload_token.clone(),
            )?)
        } else if options.remove_local {
            return Err(anyhow!(
                "refusing to remove local files without --upload-url, since they would be the only copies"
            ));
        } else {
            Arc::new(LocalSink)
        };

        let overrides = if let Some(path) = &options.locale_overrides {
            LocaleOverrides::load(Path::new(path)).await?
        } else {
            LocaleOverrides::default()
        };

        Ok(Self {
            timezones: Arc::new(GoogleTimezone::new(
                client.clone(),
                &options.maps_base_url,
                &options.maps_api_key,
            )),
            geocoder: Arc::new(GoogleGeocoder::new(
                client,
                &options.maps_base_url,
                &options.maps_api_key,
            )),
            sink,
            overrides,
            remove_local: options.remove_local,
        })
    }

    /// Ingest every new photo in `dir`, returning the records added to the store.
    ///
    /// Photos whose content is already stored are skipped, so running this repeatedly over the same directory is
    /// harmless.
    pub async fn ingest(
        &self,
        conn: &AsyncMutex<SqliteConnection>,
        dir: &Path,
    ) -> Result<Vec<Image>> {
        let candidates = scan::scan(dir).await?;

        let mut candidates = dedup::remove_known(conn, candidates).await?;

        if candidates.is_empty() {
            info!("nothing new to ingest in {}", dir.display());

            return Ok(Vec::new());
        }

        resize::resize_all(&mut candidates).await?;

        coordinates::resolve_all(conn, &mut candidates).await?;

        timezone::correct_all(self.timezones.as_ref(), &mut candidates).await?;

        geocode::geocode_all(self.geocoder.as_ref(), &self.overrides, &mut candidates).await?;

        let ids =
            persist::persist_all(conn, self.sink.as_ref(), &candidates, self.remove_local).await?;

        let mut images = Vec::with_capacity(ids.len());

        for id in ids {
            images.push(
                store::image(conn.lock().await.deref_mut(), id)
                    .await?
                    .ok_or_else(|| anyhow!("image {} missing after insert", id))?,
            );
        }

        info!("ingested {} new images from {}", images.len(), dir.display());

        Ok(images)
    }
}
