//! This module provides the queries the pipeline runs against the SQLite store, plus the read side used by
//! downstream consumers (look up images by id, hash, coordinate, or whether they've been posted to a platform).
//!
//! Locations and coordinates are created lazily with "insert if absent, then read back", relying on the uniqueness
//! constraints in [schema::DDL_STATEMENTS] rather than any application-level locking.

use {
    anyhow::{anyhow, Result},
    atlas_shared::{Image, Platform},
    chrono::{DateTime, SecondsFormat, Utc},
    futures::TryStreamExt,
    sqlx::{sqlite::SqliteRow, Row, SqliteConnection},
    std::collections::HashSet,
};

/// Maximum number of hashes bound to a single `IN (...)` clause
const MAX_HASHES_PER_QUERY: usize = 500;

const SELECT_IMAGES: &str = "SELECT \
     i.id, \
     i.url_large, \
     i.url_medium, \
     i.url_small, \
     i.sha256, \
     i.timestamp, \
     c.latitude, \
     c.longitude, \
     l.city, \
     l.country, \
     l.timezone \
     FROM images i \
     JOIN coordinates c ON i.coordinate_id = c.id \
     JOIN locations l ON c.location_id = l.id";

const UNUSED_CLAUSE: &str = "i.id NOT IN (\
     SELECT image_id FROM posts WHERE platform_id = (SELECT id FROM platforms WHERE name = ?1))";

/// An image row which has not been inserted yet
#[derive(Debug, Clone)]
pub struct NewImage {
    pub url_large: String,
    pub url_medium: String,
    pub url_small: String,
    pub sha256: String,
    pub timestamp: DateTime<Utc>,
    pub coordinate_id: i64,
}

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Return the subset of `hashes` which already belong to stored images.
pub async fn known_hashes(conn: &mut SqliteConnection, hashes: &[&str]) -> Result<HashSet<String>> {
    let mut known = HashSet::new();

    for chunk in hashes.chunks(MAX_HASHES_PER_QUERY) {
        let buffer = format!(
            "SELECT sha256 FROM images WHERE sha256 IN ({})",
            vec!["?"; chunk.len()].join(", ")
        );

        let mut select = sqlx::query(&buffer);

        for hash in chunk {
            select = select.bind(*hash);
        }

        let mut rows = select.fetch(&mut *conn);

        while let Some(row) = rows.try_next().await? {
            known.insert(row.get::<String, _>(0));
        }
    }

    Ok(known)
}

/// Find the coordinate with exactly the specified latitude and longitude, returning its id and the IANA zone name
/// of its location.
pub async fn coordinate_for(
    conn: &mut SqliteConnection,
    latitude: f64,
    longitude: f64,
) -> Result<Option<(i64, String)>> {
    Ok(sqlx::query(
        "SELECT c.id, l.timezone FROM coordinates c \
         JOIN locations l ON c.location_id = l.id \
         WHERE c.latitude = ?1 AND c.longitude = ?2",
    )
    .bind(latitude)
    .bind(longitude)
    .fetch_optional(&mut *conn)
    .await?
    .map(|row| (row.get::<i64, _>(0), row.get::<String, _>(1))))
}

pub async fn get_or_create_location(
    conn: &mut SqliteConnection,
    city: &str,
    country: &str,
    timezone: &str,
) -> Result<i64> {
    sqlx::query("INSERT OR IGNORE INTO locations (city, country, timezone) VALUES (?1, ?2, ?3)")
        .bind(city)
        .bind(country)
        .bind(timezone)
        .execute(&mut *conn)
        .await?;

    Ok(
        sqlx::query("SELECT id FROM locations WHERE city = ?1 AND country = ?2")
            .bind(city)
            .bind(country)
            .fetch_one(&mut *conn)
            .await?
            .get(0),
    )
}

pub async fn get_or_create_coordinate(
    conn: &mut SqliteConnection,
    latitude: f64,
    longitude: f64,
    location_id: i64,
) -> Result<i64> {
    sqlx::query(
        "INSERT OR IGNORE INTO coordinates (latitude, longitude, location_id) VALUES (?1, ?2, ?3)",
    )
    .bind(latitude)
    .bind(longitude)
    .bind(location_id)
    .execute(&mut *conn)
    .await?;

    Ok(
        sqlx::query("SELECT id FROM coordinates WHERE latitude = ?1 AND longitude = ?2")
            .bind(latitude)
            .bind(longitude)
            .fetch_one(&mut *conn)
            .await?
            .get(0),
    )
}

/// Insert an image, returning its id.
///
/// This fails if an image with the same hash already exists.
pub async fn insert_image(conn: &mut SqliteConnection, image: &NewImage) -> Result<i64> {
    Ok(sqlx::query(
        "INSERT INTO images (url_large, url_medium, url_small, sha256, timestamp, coordinate_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(&image.url_large)
    .bind(&image.url_medium)
    .bind(&image.url_small)
    .bind(&image.sha256)
    .bind(format_timestamp(&image.timestamp))
    .bind(image.coordinate_id)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid())
}

fn image_from_row(row: &SqliteRow) -> Result<Image> {
    Ok(Image {
        id: row.get(0),
        url_large: row.get(1),
        url_medium: row.get(2),
        url_small: row.get(3),
        sha256: row.get(4),
        timestamp: row.get::<&str, _>(5).parse()?,
        latitude: row.get(6),
        longitude: row.get(7),
        city: row.get(8),
        country: row.get(9),
        timezone: row.get(10),
    })
}

pub async fn image(conn: &mut SqliteConnection, id: i64) -> Result<Option<Image>> {
    sqlx::query(&format!("{} WHERE i.id = ?1", SELECT_IMAGES))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(|row| image_from_row(&row))
        .transpose()
}

pub async fn image_by_hash(conn: &mut SqliteConnection, sha256: &str) -> Result<Option<Image>> {
    sqlx::query(&format!("{} WHERE i.sha256 = ?1", SELECT_IMAGES))
        .bind(sha256)
        .fetch_optional(&mut *conn)
        .await?
        .map(|row| image_from_row(&row))
        .transpose()
}

/// Retrieve all images, oldest first.
pub async fn images(conn: &mut SqliteConnection) -> Result<Vec<Image>> {
    let buffer = format!("{} ORDER BY i.timestamp, i.id", SELECT_IMAGES);
    let mut rows = sqlx::query(&buffer).fetch(&mut *conn);
    let mut images = Vec::new();

    while let Some(row) = rows.try_next().await? {
        images.push(image_from_row(&row)?);
    }

    Ok(images)
}

/// Retrieve all images taken at exactly the specified coordinate, oldest first.
pub async fn images_at(
    conn: &mut SqliteConnection,
    latitude: f64,
    longitude: f64,
) -> Result<Vec<Image>> {
    let buffer = format!(
        "{} WHERE c.latitude = ?1 AND c.longitude = ?2 ORDER BY i.timestamp, i.id",
        SELECT_IMAGES
    );
    let mut rows = sqlx::query(&buffer)
        .bind(latitude)
        .bind(longitude)
        .fetch(&mut *conn);
    let mut images = Vec::new();

    while let Some(row) = rows.try_next().await? {
        images.push(image_from_row(&row)?);
    }

    Ok(images)
}

/// Pick a random image which has not been posted to `platform` yet.
pub async fn random_unused_image(
    conn: &mut SqliteConnection,
    platform: Platform,
) -> Result<Option<Image>> {
    sqlx::query(&format!(
        "{} WHERE {} ORDER BY random() LIMIT 1",
        SELECT_IMAGES, UNUSED_CLAUSE
    ))
    .bind(platform.name())
    .fetch_optional(&mut *conn)
    .await?
    .map(|row| image_from_row(&row))
    .transpose()
}

pub async fn unused_image_count(conn: &mut SqliteConnection, platform: Platform) -> Result<u32> {
    let count = sqlx::query(&format!(
        "SELECT COUNT(*) FROM images i WHERE {}",
        UNUSED_CLAUSE
    ))
    .bind(platform.name())
    .fetch_one(&mut *conn)
    .await?
    .get::<i64, _>(0);

    Ok(u32::try_from(count)?)
}

/// Record that the image identified by `image_id` has been posted to `platform`.
pub async fn insert_post(
    conn: &mut SqliteConnection,
    image_id: i64,
    platform: Platform,
) -> Result<()> {
    let platform_id = sqlx::query("SELECT id FROM platforms WHERE name = ?1")
        .bind(platform.name())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| anyhow!("platform {} missing from store", platform))?
        .get::<i64, _>(0);

    sqlx::query("INSERT INTO posts (image_id, platform_id) VALUES (?1, ?2)")
        .bind(image_id)
        .bind(platform_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}
