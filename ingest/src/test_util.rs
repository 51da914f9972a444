//! Fixture helpers shared by the unit tests of this crate.

use {
    crate::{
        error::IngestError,
        geocode::{AddressComponent, ReverseGeocode},
        timezone::TimezoneLookup,
        upload::UploadSink,
    },
    anyhow::{Error, Result},
    chrono::{DateTime, Utc},
    futures::future::{self, BoxFuture, FutureExt},
    image::{ImageBuffer, Rgb},
    rexiv2::{GpsInfo, Metadata as ExifMetadata},
    sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, SqliteConnection},
    std::{
        path::Path,
        sync::{
            atomic::{AtomicUsize, Ordering::Relaxed},
            Arc, Mutex, Once,
        },
    },
    tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
        task,
    },
};

pub const IMAGE_WIDTH: u32 = 480;
pub const IMAGE_HEIGHT: u32 = 320;

pub const BANGKOK: (f64, f64) = (13.7563, 100.5018);
pub const CHIANG_MAI: (f64, f64) = (18.7883, 98.9853);
pub const TAIPEI: (f64, f64) = (25.0330, 121.5654);

pub fn init_logging() {
    static ONCE: Once = Once::new();

    ONCE.call_once(pretty_env_logger::init_timed);
}

/// Write a JPEG to `path` whose pixels depend on `seed` (so distinct seeds yield distinct hashes), tagged with
/// `datetime` (EXIF format, e.g. "2023:06:01 14:00:00") and, if specified, a GPS coordinate.
pub fn write_photo(
    path: &Path,
    seed: u32,
    datetime: &str,
    coordinate: Option<(f64, f64)>,
) -> Result<()> {
    write_tagged_photo(path, seed, Some(datetime), coordinate, &[])
}

/// Like [write_photo], except the timestamp may be left out and `tags` are set as strings afterward.
pub fn write_tagged_photo(
    path: &Path,
    seed: u32,
    datetime: Option<&str>,
    coordinate: Option<(f64, f64)>,
    tags: &[(&str, &str)],
) -> Result<()> {
    task::block_in_place(|| {
        ImageBuffer::from_fn(IMAGE_WIDTH, IMAGE_HEIGHT, |x, y| {
            Rgb([
                (x.wrapping_add(seed.wrapping_mul(37)) % 256) as u8,
                (y % 256) as u8,
                (seed.wrapping_mul(91) % 256) as u8,
            ])
        })
        .save(path)?;

        let metadata = ExifMetadata::new_from_path(path)?;

        if let Some(datetime) = datetime {
            metadata.set_tag_string("Exif.Photo.DateTimeOriginal", datetime)?;
        }

        if let Some((latitude, longitude)) = coordinate {
            metadata.set_gps_info(&GpsInfo {
                longitude,
                latitude,
                altitude: 0.0,
            })?;
        }

        for (tag, value) in tags {
            metadata.set_tag_string(tag, value)?;
        }

        metadata.save_to_file(path)?;

        Ok::<_, Error>(())
    })
}

pub async fn memory_store() -> Result<SqliteConnection> {
    let mut conn = "sqlite::memory:"
        .parse::<SqliteConnectOptions>()?
        .connect()
        .await?;

    crate::migrate(&mut conn).await?;

    Ok(conn)
}

fn near((latitude, longitude): (f64, f64), (expected_latitude, expected_longitude): (f64, f64)) -> bool {
    (latitude - expected_latitude).abs() < 1e-3 && (longitude - expected_longitude).abs() < 1e-3
}

/// [TimezoneLookup] which answers every request with the same zone
pub struct CountingTimezone {
    zone: String,
    calls: AtomicUsize,
}

impl CountingTimezone {
    pub fn new(zone: &str) -> Self {
        Self {
            zone: zone.to_owned(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Relaxed)
    }
}

impl TimezoneLookup for CountingTimezone {
    fn timezone<'a>(
        &'a self,
        _latitude: f64,
        _longitude: f64,
        _instant: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<String>> {
        self.calls.fetch_add(1, Relaxed);

        future::ready(Ok(self.zone.clone())).boxed()
    }
}

/// [TimezoneLookup] which rejects every request as the Google service does for a bad API key
pub struct FailingTimezone;

impl TimezoneLookup for FailingTimezone {
    fn timezone<'a>(
        &'a self,
        _latitude: f64,
        _longitude: f64,
        _instant: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<String>> {
        future::ready(Err(IngestError::ServiceStatus {
            service: "timezone",
            status: "REQUEST_DENIED".into(),
            message: "The provided API key is invalid.".into(),
        }
        .into()))
        .boxed()
    }
}

fn component(long_name: &str, types: &[&str]) -> AddressComponent {
    AddressComponent {
        long_name: long_name.to_owned(),
        types: types.iter().map(|t| (*t).to_owned()).collect(),
    }
}

/// [ReverseGeocode] which knows about [BANGKOK], [CHIANG_MAI], and [TAIPEI], returning no components elsewhere
pub struct CountingGeocoder {
    calls: AtomicUsize,
}

impl CountingGeocoder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Relaxed)
    }
}

impl ReverseGeocode for CountingGeocoder {
    fn reverse_geocode<'a>(
        &'a self,
        latitude: f64,
        longitude: f64,
    ) -> BoxFuture<'a, Result<Vec<AddressComponent>>> {
        self.calls.fetch_add(1, Relaxed);

        let coordinate = (latitude, longitude);

        let components = if near(coordinate, BANGKOK) {
            vec![
                component("Phra Nakhon", &["sublocality", "political"]),
                component("กรุงเทพมหานคร", &["administrative_area_level_1", "political"]),
                component("Thailand", &["country", "political"]),
            ]
        } else if near(coordinate, CHIANG_MAI) {
            vec![
                component("เชียงใหม่", &["administrative_area_level_1", "political"]),
                component("Thailand", &["country", "political"]),
            ]
        } else if near(coordinate, TAIPEI) {
            vec![
                component("Xinyi District", &["neighborhood", "political"]),
                component("Taipei City", &["administrative_area_level_1", "political"]),
                component("Taiwan", &["country", "political"]),
            ]
        } else {
            Vec::new()
        };

        future::ready(Ok(components)).boxed()
    }
}

/// [UploadSink] which keeps nothing, answering with `memory:<name>` and remembering each name it was given
#[derive(Default)]
pub struct RecordingSink {
    names: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn names(&self) -> Vec<String> {
        self.names.lock().unwrap().clone()
    }
}

impl UploadSink for RecordingSink {
    fn store<'a>(&'a self, name: &'a str, _path: &'a Path) -> BoxFuture<'a, Result<String>> {
        self.names.lock().unwrap().push(name.to_owned());

        future::ready(Ok(format!("memory:{}", name))).boxed()
    }
}

/// Read one HTTP/1.1 request with a chunked body.
async fn read_request(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let mut request = Vec::new();
    let mut buffer = [0; 4096];

    loop {
        let count = stream.read(&mut buffer).await?;

        if count == 0 {
            break;
        }

        request.extend_from_slice(&buffer[..count]);

        // the body is chunked, so it ends with an empty chunk
        if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
            if request[end + 4..].ends_with(b"0\r\n\r\n") {
                break;
            }
        }
    }

    Ok(request)
}

/// Start an HTTP server which answers every request with `status` and closes the connection, returning its base
/// URL (`http://<address>/photos/`) and the lowercased raw requests received so far.
pub async fn upload_server(status: &'static str) -> Result<(String, Arc<Mutex<Vec<String>>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;
    let requests = Arc::new(Mutex::new(Vec::new()));

    tokio::spawn({
        let requests = requests.clone();

        async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let request = read_request(&mut stream).await?;

                requests
                    .lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&request).to_lowercase());

                stream
                    .write_all(
                        format!(
                            "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                            status
                        )
                        .as_bytes(),
                    )
                    .await?;
            }

            Ok::<_, Error>(())
        }
    });

    Ok((format!("http://{}/photos/", address), requests))
}
