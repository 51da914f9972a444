//! This module provides the final pipeline stage, which uploads each candidate's files and records it in the store.

use {
    crate::{
        candidate::Candidate,
        resize::Size,
        store::{self, NewImage},
        upload::UploadSink,
    },
    anyhow::{anyhow, Context, Result},
    futures::future::FutureExt,
    sqlx::{Connection, SqliteConnection},
    std::path::Path,
    tokio::{fs, sync::Mutex as AsyncMutex},
    tracing::{info, warn},
};

/// Where an image's coordinate row comes from
#[derive(Debug, Clone)]
enum Coordinate {
    Known(i64),
    New {
        city: String,
        country: String,
        timezone: String,
    },
}

/// Name under which to store a file, e.g. "<sha256>-small.jpg" for the small derivative of a JPEG.
///
/// Names depend only on content, so same-named files from different directories never collide.
fn object_name(sha256: &str, size: Option<Size>, path: &Path) -> String {
    let suffix = size.map(Size::suffix).unwrap_or_default();

    match path.extension().and_then(|extension| extension.to_str()) {
        Some(extension) => format!("{}{}.{}", sha256, suffix, extension.to_lowercase()),
        None => format!("{}{}", sha256, suffix),
    }
}

async fn upload(
    sink: &dyn UploadSink,
    sha256: &str,
    size: Option<Size>,
    path: &Path,
) -> Result<String> {
    sink.store(&object_name(sha256, size, path), path)
        .await
        .with_context(|| format!("unable to upload {}", path.display()))
}

/// Delete the original and derivatives of a committed candidate, logging (but otherwise ignoring) failures.
async fn remove_local(candidate: &Candidate) {
    for path in [
        Some(&candidate.path),
        candidate.medium_path.as_ref(),
        candidate.small_path.as_ref(),
    ]
    .into_iter()
    .flatten()
    {
        if let Err(e) = fs::remove_file(path).await {
            warn!("unable to remove {}: {:?}", path.display(), e);
        }
    }
}

/// Upload the original and both derivatives of each candidate, then insert it (along with its location and
/// coordinate, if new) in its own transaction, returning the ids of the new images in order.
///
/// A failure aborts the remaining candidates, but anything inserted before it stays inserted.  If `remove` is
/// set, each candidate's local files are deleted as soon as its transaction commits.
pub async fn persist_all(
    conn: &AsyncMutex<SqliteConnection>,
    sink: &dyn UploadSink,
    candidates: &[Candidate],
    remove: bool,
) -> Result<Vec<i64>> {
    info!("persisting images");

    let len = candidates.len();

    let mut ids = Vec::with_capacity(len);

    for (index, candidate) in candidates.iter().enumerate() {
        let missing = |what| anyhow!("{} has no {}", candidate.path.display(), what);

        let timestamp = candidate.datetime.ok_or_else(|| missing("corrected timestamp"))?;
        let medium_path = candidate
            .medium_path
            .as_deref()
            .ok_or_else(|| missing("medium derivative"))?;
        let small_path = candidate
            .small_path
            .as_deref()
            .ok_or_else(|| missing("small derivative"))?;

        let image = NewImage {
            url_large: upload(sink, &candidate.sha256, None, &candidate.path).await?,
            url_medium: upload(sink, &candidate.sha256, Some(Size::Medium), medium_path).await?,
            url_small: upload(sink, &candidate.sha256, Some(Size::Small), small_path).await?,
            sha256: candidate.sha256.clone(),
            timestamp,
            coordinate_id: 0,
        };

        let coordinate = if let Some(coordinate_id) = candidate.coordinate_id {
            Coordinate::Known(coordinate_id)
        } else {
            Coordinate::New {
                city: candidate.city.clone().ok_or_else(|| missing("city"))?,
                country: candidate.country.clone().ok_or_else(|| missing("country"))?,
                timezone: candidate.timezone.clone().ok_or_else(|| missing("timezone"))?,
            }
        };

        let id = conn
            .lock()
            .await
            .transaction(|conn| {
                let image = image.clone();
                let coordinate = coordinate.clone();
                let latitude = candidate.latitude;
                let longitude = candidate.longitude;

                async move {
                    let coordinate_id = match coordinate {
                        Coordinate::Known(coordinate_id) => coordinate_id,
                        Coordinate::New {
                            city,
                            country,
                            timezone,
                        } => {
                            let location_id =
                                store::get_or_create_location(&mut *conn, &city, &country, &timezone)
                                    .await?;

                            store::get_or_create_coordinate(&mut *conn, latitude, longitude, location_id)
                                .await?
                        }
                    };

                    store::insert_image(
                        &mut *conn,
                        &NewImage {
                            coordinate_id,
                            ..image
                        },
                    )
                    .await
                }
                .boxed()
            })
            .await
            .with_context(|| format!("unable to insert {}", candidate.path.display()))?;

        info!(
            "({} of {}) inserted {} as image {}",
            index + 1,
            len,
            candidate.path.display(),
            id
        );

        if remove {
            remove_local(candidate).await;
        }

        ids.push(id);
    }

    Ok(ids)
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{
            test_util::{self, RecordingSink, BANGKOK, CHIANG_MAI},
            upload::{HttpSink, LocalSink},
        },
        sqlx::Row,
        std::ops::DerefMut,
        tempfile::TempDir,
        tokio::fs,
    };

    async fn candidate(dir: &Path, name: &str, coordinate: (f64, f64)) -> Result<Candidate> {
        let path = dir.join(format!("{}.jpg", name));
        let medium_path = dir.join(format!("{}-medium.jpg", name));
        let small_path = dir.join(format!("{}-small.jpg", name));

        for path in [&path, &medium_path, &small_path] {
            fs::write(path, name).await?;
        }

        let mut candidate = Candidate::new(
            path,
            name.repeat(32),
            coordinate,
            "2023-06-01T14:00:00".parse()?,
        );

        candidate.datetime = Some("2023-06-01T07:00:00Z".parse()?);
        candidate.medium_path = Some(medium_path);
        candidate.small_path = Some(small_path);
        candidate.timezone = Some("Asia/Bangkok".into());
        candidate.city = Some("Bangkok".into());
        candidate.country = Some("Thailand".into());

        Ok(candidate)
    }

    async fn count(conn: &AsyncMutex<SqliteConnection>, table: &str) -> Result<i64> {
        Ok(sqlx::query(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(conn.lock().await.deref_mut())
            .await?
            .get(0))
    }

    #[tokio::test]
    async fn persists() -> Result<()> {
        let dir = TempDir::new()?;
        let conn = AsyncMutex::new(test_util::memory_store().await?);

        let mut candidates = vec![
            candidate(dir.path(), "aa", BANGKOK).await?,
            candidate(dir.path(), "bb", BANGKOK).await?,
            candidate(dir.path(), "cc", CHIANG_MAI).await?,
        ];

        let ids = persist_all(&conn, &LocalSink, &candidates, false).await?;

        assert_eq!(ids.len(), 3);
        assert_eq!(count(&conn, "images").await?, 3);
        assert_eq!(count(&conn, "coordinates").await?, 2);
        assert_eq!(count(&conn, "locations").await?, 1);

        let image = store::image(conn.lock().await.deref_mut(), ids[0])
            .await?
            .unwrap();

        assert_eq!(
            Path::new(&image.url_small),
            fs::canonicalize(dir.path().join("aa-small.jpg")).await?
        );
        assert_eq!(image.city, "Bangkok");

        // A candidate at a stored coordinate is attached to it without any location data of its own.
        let mut known = candidate(dir.path(), "dd", BANGKOK).await?;
        known.coordinate_id = Some(image_coordinate(&conn, ids[0]).await?);
        known.city = None;
        known.country = None;

        // The store rejects the duplicate hash, but the first candidate is already committed.
        candidates = vec![known, candidate(dir.path(), "cc", CHIANG_MAI).await?];

        assert!(persist_all(&conn, &LocalSink, &candidates, false).await.is_err());
        assert_eq!(count(&conn, "images").await?, 4);
        assert_eq!(count(&conn, "coordinates").await?, 2);

        Ok(())
    }

    async fn image_coordinate(conn: &AsyncMutex<SqliteConnection>, id: i64) -> Result<i64> {
        Ok(sqlx::query("SELECT coordinate_id FROM images WHERE id = ?1")
            .bind(id)
            .fetch_one(conn.lock().await.deref_mut())
            .await?
            .get(0))
    }

    #[tokio::test]
    async fn names_by_content() -> Result<()> {
        let first = TempDir::new()?;
        let second = TempDir::new()?;
        let conn = AsyncMutex::new(test_util::memory_store().await?);

        // cameras reuse file names, so two different photos may share one
        let mut candidates = vec![
            candidate(first.path(), "IMG_0001", BANGKOK).await?,
            candidate(second.path(), "IMG_0001", BANGKOK).await?,
        ];
        candidates[0].sha256 = "ab".repeat(32);
        candidates[1].sha256 = "cd".repeat(32);

        let (base_url, requests) = test_util::upload_server("201 Created").await?;
        let sink = HttpSink::new(reqwest::Client::new(), &base_url, None)?;

        let ids = persist_all(&conn, &sink, &candidates, false).await?;

        let mut images = Vec::new();
        for id in ids {
            images.push(store::image(conn.lock().await.deref_mut(), id).await?.unwrap());
        }

        assert_ne!(images[0].url_large, images[1].url_large);
        assert_eq!(
            images[0].url_large,
            format!("{}{}.jpg", base_url, "ab".repeat(32))
        );
        assert_eq!(
            images[1].url_medium,
            format!("{}{}-medium.jpg", base_url, "cd".repeat(32))
        );
        assert_eq!(
            images[1].url_small,
            format!("{}{}-small.jpg", base_url, "cd".repeat(32))
        );

        let requests = requests.lock().unwrap().clone();

        assert_eq!(requests.len(), 6);
        assert!(requests[0].starts_with(&format!("put /photos/{}.jpg http/1.1\r\n", "ab".repeat(32))));

        Ok(())
    }

    #[tokio::test]
    async fn removes_committed() -> Result<()> {
        let dir = TempDir::new()?;
        let conn = AsyncMutex::new(test_util::memory_store().await?);
        let sink = RecordingSink::default();

        let mut duplicate = candidate(dir.path(), "cc", CHIANG_MAI).await?;
        duplicate.sha256 = "aa".repeat(32);

        let candidates = vec![
            candidate(dir.path(), "aa", BANGKOK).await?,
            candidate(dir.path(), "bb", BANGKOK).await?,
            duplicate,
        ];

        assert!(persist_all(&conn, &sink, &candidates, true).await.is_err());
        assert_eq!(count(&conn, "images").await?, 2);

        // the first two were committed before the failure, so their files are gone
        for name in ["aa.jpg", "aa-medium.jpg", "aa-small.jpg", "bb.jpg", "bb-small.jpg"] {
            assert!(!dir.path().join(name).exists(), "{} still exists", name);
        }

        for name in ["cc.jpg", "cc-medium.jpg", "cc-small.jpg"] {
            assert!(dir.path().join(name).exists(), "{} was removed", name);
        }

        assert_eq!(
            sink.names()[..3],
            [
                format!("{}.jpg", "aa".repeat(32)),
                format!("{}-medium.jpg", "aa".repeat(32)),
                format!("{}-small.jpg", "aa".repeat(32)),
            ]
        );

        Ok(())
    }
}
