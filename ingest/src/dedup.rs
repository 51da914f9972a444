use {
    crate::{candidate::Candidate, store},
    anyhow::Result,
    sqlx::SqliteConnection,
    std::{collections::HashSet, ops::DerefMut},
    tokio::sync::Mutex as AsyncMutex,
    tracing::info,
};

/// Drop candidates whose content is already stored, plus any repeat of content seen earlier in the same batch.
///
/// The survivors keep their scan order.
pub async fn remove_known(
    conn: &AsyncMutex<SqliteConnection>,
    candidates: Vec<Candidate>,
) -> Result<Vec<Candidate>> {
    let known = {
        let hashes = candidates
            .iter()
            .map(|candidate| candidate.sha256.as_str())
            .collect::<Vec<_>>();

        store::known_hashes(conn.lock().await.deref_mut(), &hashes).await?
    };

    let candidates_len = candidates.len();

    let mut seen = HashSet::new();

    let new = candidates
        .into_iter()
        .filter(|candidate| {
            if known.contains(&candidate.sha256) {
                info!("skipping {} (already stored)", candidate.path.display());
                false
            } else if !seen.insert(candidate.sha256.clone()) {
                info!(
                    "skipping {} (same content as an earlier file)",
                    candidate.path.display()
                );
                false
            } else {
                true
            }
        })
        .collect::<Vec<_>>();

    info!(
        "{} of {} candidates are new",
        new.len(),
        candidates_len
    );

    Ok(new)
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{store::NewImage, test_util},
        std::path::PathBuf,
    };

    fn candidate(name: &str, sha256: &str) -> Result<Candidate> {
        Ok(Candidate::new(
            PathBuf::from(name),
            sha256.into(),
            test_util::BANGKOK,
            "2023-06-01T14:00:00".parse()?,
        ))
    }

    #[tokio::test]
    async fn removes_known_and_repeated() -> Result<()> {
        let mut conn = test_util::memory_store().await?;

        let location =
            store::get_or_create_location(&mut conn, "Bangkok", "Thailand", "Asia/Bangkok").await?;
        let coordinate =
            store::get_or_create_coordinate(&mut conn, 13.7563, 100.5018, location).await?;

        store::insert_image(
            &mut conn,
            &NewImage {
                url_large: "a.jpg".into(),
                url_medium: "a-medium.jpg".into(),
                url_small: "a-small.jpg".into(),
                sha256: "bb".into(),
                timestamp: "2023-06-01T07:00:00Z".parse()?,
                coordinate_id: coordinate,
            },
        )
        .await?;

        let conn = AsyncMutex::new(conn);

        let new = remove_known(
            &conn,
            vec![
                candidate("a.jpg", "aa")?,
                candidate("b.jpg", "bb")?,
                candidate("c.jpg", "cc")?,
                candidate("copy-of-a.jpg", "aa")?,
            ],
        )
        .await?;

        assert_eq!(
            new.iter()
                .map(|candidate| candidate.path.to_str().unwrap())
                .collect::<Vec<_>>(),
            vec!["a.jpg", "c.jpg"]
        );

        assert!(remove_known(&conn, Vec::new()).await?.is_empty());

        Ok(())
    }
}
