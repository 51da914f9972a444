use {
    crate::{candidate::Candidate, store},
    anyhow::Result,
    sqlx::SqliteConnection,
    std::ops::DerefMut,
    tokio::sync::Mutex as AsyncMutex,
    tracing::{debug, info},
};

/// Attach the stored coordinate id and zone to each candidate taken at exactly a coordinate we already know.
///
/// Candidates resolved here skip the timezone and geocoding services.
pub async fn resolve_all(
    conn: &AsyncMutex<SqliteConnection>,
    candidates: &mut [Candidate],
) -> Result<()> {
    info!("resolving known coordinates");

    let len = candidates.len();

    for (index, candidate) in candidates.iter_mut().enumerate() {
        let found = store::coordinate_for(
            conn.lock().await.deref_mut(),
            candidate.latitude,
            candidate.longitude,
        )
        .await?;

        if let Some((coordinate_id, timezone)) = found {
            info!(
                "({} of {}) {} taken at known coordinate {}",
                index + 1,
                len,
                candidate.path.display(),
                coordinate_id
            );

            candidate.coordinate_id = Some(coordinate_id);
            candidate.timezone = Some(timezone);
        } else {
            debug!(
                "({} of {}) {} taken at new coordinate ({}, {})",
                index + 1,
                len,
                candidate.path.display(),
                candidate.latitude,
                candidate.longitude
            );
        }
    }

    Ok(())
}
