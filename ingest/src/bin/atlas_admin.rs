#![deny(warnings)]

use {
    anyhow::{anyhow, Result},
    atlas_ingest::store,
    atlas_shared::Platform,
    serde_json::json,
    structopt::StructOpt,
};

#[derive(StructOpt, Debug)]
#[structopt(name = "atlas-admin", about = "Photo atlas store admin tool")]
enum Command {
    /// Print all stored images, oldest first
    Images {
        /// SQLite database to create or reuse
        state_file: String,
    },

    /// Print a single stored image
    Image {
        /// SQLite database to create or reuse
        state_file: String,

        /// Id of the image to print
        id: i64,
    },

    /// Print how many images have not been posted to a platform yet, plus a random one of them
    Unused {
        /// SQLite database to create or reuse
        state_file: String,

        /// Platform name, e.g. "mastodon" or "x"
        platform: Platform,
    },

    /// Record that an image has been posted to a platform
    RecordPost {
        /// SQLite database to create or reuse
        state_file: String,

        /// Id of the posted image
        image_id: i64,

        /// Platform name, e.g. "mastodon" or "x"
        platform: Platform,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init_timed();

    let output = match Command::from_args() {
        Command::Images { state_file } => {
            let mut conn = atlas_ingest::open(&state_file).await?;

            json!(store::images(&mut conn).await?)
        }

        Command::Image { state_file, id } => {
            let mut conn = atlas_ingest::open(&state_file).await?;

            json!(store::image(&mut conn, id)
                .await?
                .ok_or_else(|| anyhow!("no image with id {}", id))?)
        }

        Command::Unused {
            state_file,
            platform,
        } => {
            let mut conn = atlas_ingest::open(&state_file).await?;

            json!({
                "platform": platform.name(),
                "count": store::unused_image_count(&mut conn, platform).await?,
                "image": store::random_unused_image(&mut conn, platform).await?,
            })
        }

        Command::RecordPost {
            state_file,
            image_id,
            platform,
        } => {
            let mut conn = atlas_ingest::open(&state_file).await?;

            if store::image(&mut conn, image_id).await?.is_none() {
                return Err(anyhow!("no image with id {}", image_id));
            }

            store::insert_post(&mut conn, image_id, platform).await?;

            json!({ "imageId": image_id, "platform": platform.name() })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
