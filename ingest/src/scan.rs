//! This module provides the [scan] function, which finds candidate source images in a directory and collects the
//! content hash and capture metadata of each.

use {
    crate::{candidate::Candidate, error::IngestError, resize},
    anyhow::{Context, Result},
    chrono::NaiveDateTime,
    lazy_static::lazy_static,
    regex::Regex,
    rexiv2::Metadata as ExifMetadata,
    sha2::{Digest, Sha256},
    std::path::{Path, PathBuf},
    tokio::{
        fs::{self, File as AsyncFile},
        io::{AsyncRead, AsyncReadExt},
        task,
    },
    tracing::{debug, info},
};

/// File extensions (lowercase) of the media types we ingest
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// EXIF tags which must both be present for a file to count as geotagged
const GPS_TAGS: &[&str] = &["Exif.GPSInfo.GPSLatitude", "Exif.GPSInfo.GPSLongitude"];

/// EXIF tags which may hold the capture time, in order of preference
const DATETIME_TAGS: &[&str] = &[
    "Exif.Photo.DateTimeOriginal",
    "Exif.Image.DateTimeOriginal",
    "Exif.Image.DateTime",
];

pub async fn hash(input: &mut (dyn AsyncRead + Unpin + Send + 'static)) -> Result<String> {
    let mut hasher = Sha256::default();

    let mut buffer = vec![0; crate::BUFFER_SIZE];

    loop {
        let count = input.read(&mut buffer[..]).await?;
        if count == 0 {
            break;
        } else {
            hasher.update(&buffer[0..count]);
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_lowercase)
}

/// Whether `path` names a file type we know how to ingest.
pub fn supported(path: &Path) -> bool {
    extension(path)
        .map(|extension| SUPPORTED_EXTENSIONS.contains(&extension.as_str()))
        .unwrap_or(false)
}

/// Whether `path` names a derivative written by a previous run.
pub fn derivative(path: &Path) -> bool {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| {
            resize::SIZES
                .iter()
                .any(|size| stem.ends_with(size.suffix()))
        })
        .unwrap_or(false)
}

#[derive(Debug)]
struct Metadata {
    coordinate: (f64, f64),
    datetime: NaiveDateTime,
}

fn parse_datetime(path: &Path, datetime: &str) -> Result<NaiveDateTime> {
    lazy_static! {
        static ref DATE_TIME_PATTERN: Regex =
            Regex::new(r"(\d{4}):(\d{2}):(\d{2}) (\d{2}):(\d{2}):(\d{2})").unwrap();
    };

    DATE_TIME_PATTERN
        .captures(datetime)
        .map(|c| {
            format!(
                "{}-{}-{}T{}:{}:{}",
                &c[1], &c[2], &c[3], &c[4], &c[5], &c[6]
            )
        })
        .and_then(|iso| iso.parse().ok())
        .ok_or_else(|| {
            IngestError::BadTimestamp {
                path: path.to_owned(),
                timestamp: datetime.to_owned(),
            }
            .into()
        })
}

fn exif_metadata(path: &Path) -> Result<Metadata> {
    let metadata = ExifMetadata::new_from_path(path)
        .with_context(|| format!("unable to decode exif data from file at {}", path.display()))?;

    // gexiv2 reports partial GPS data (e.g. altitude alone) with the missing parts as zero
    if !GPS_TAGS.iter().all(|tag| metadata.has_tag(tag)) {
        return Err(IngestError::MissingGps(path.to_owned()).into());
    }

    let gps = metadata
        .get_gps_info()
        .ok_or_else(|| IngestError::MissingGps(path.to_owned()))?;

    let datetime = DATETIME_TAGS
        .iter()
        .find_map(|tag| metadata.get_tag_string(tag).ok())
        .ok_or_else(|| IngestError::MissingTimestamp(path.to_owned()))?;

    Ok(Metadata {
        coordinate: (gps.latitude, gps.longitude),
        datetime: parse_datetime(path, &datetime)?,
    })
}

/// Find supported, non-derivative files directly inside `dir`, sorted by name.
async fn find_sources(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("unable to read directory {}", dir.display()))?;

    let mut paths = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();

        if path.is_file() && supported(&path) {
            if derivative(&path) {
                debug!("skipping derivative {}", path.display());
            } else {
                paths.push(path);
            }
        }
    }

    paths.sort();

    Ok(paths)
}

/// Build a [Candidate] for each source image in `dir`.
///
/// Any file lacking a GPS coordinate or capture timestamp fails the whole scan.
pub async fn scan(dir: &Path) -> Result<Vec<Candidate>> {
    info!("scanning directory {}", dir.display());

    let paths = find_sources(dir).await?;
    let paths_len = paths.len();

    let mut candidates = Vec::with_capacity(paths_len);

    for (index, path) in paths.into_iter().enumerate() {
        let sha256 = hash(
            &mut AsyncFile::open(&path)
                .await
                .with_context(|| format!("unable to open file at {}", path.display()))?,
        )
        .await?;

        let metadata = task::block_in_place(|| exif_metadata(&path))?;

        info!(
            "({} of {}) found {} (hash {}; data {:?})",
            index + 1,
            paths_len,
            path.display(),
            sha256,
            metadata
        );

        candidates.push(Candidate::new(
            path,
            sha256,
            metadata.coordinate,
            metadata.datetime,
        ));
    }

    Ok(candidates)
}
