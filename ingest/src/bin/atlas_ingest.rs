#![deny(warnings)]

use {
    anyhow::Result,
    atlas_ingest::{Ingestor, Options},
    std::{path::Path, process},
    structopt::StructOpt,
    tokio::sync::Mutex as AsyncMutex,
    tracing::{error, info},
};

async fn run(options: &Options) -> Result<usize> {
    let ingestor = Ingestor::from_options(options).await?;

    let conn = AsyncMutex::new(atlas_ingest::open(&options.state_file).await?);

    Ok(ingestor
        .ingest(&conn, Path::new(&options.directory))
        .await?
        .len())
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init_timed();

    let options = Options::from_args();

    match run(&options).await {
        Ok(count) => info!("done: {} new images from {}", count, options.directory),
        Err(e) => {
            error!("ingestion of {} failed: {:?}", options.directory, e);
            process::exit(-1)
        }
    }
}
