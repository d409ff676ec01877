pub mod worker;

use std::{path::PathBuf, sync::Arc};

use clap::Parser;

use grimoire_service::{GrimoireService, Providers};
use grimoire_storage::{db::Db, files::LocalFileStore, index::SearchIndex, qdrant::QdrantStore};

#[derive(Debug, Parser)]
#[command(
	version = grimoire_cli::VERSION,
	rename_all = "kebab",
	styles = grimoire_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Rebuild the whole search index from storage once, then exit.
	#[arg(long)]
	pub reconcile: bool,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = grimoire_config::load(&args.config)?;

	grimoire_cli::init_tracing(&config.service.log_level);

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let qdrant = QdrantStore::new(&config.storage.qdrant)?;

	qdrant.ensure_ready().await?;

	let files = LocalFileStore::new(config.storage.files.root.clone());

	files.ensure_root().await?;

	let providers = Providers::from_config(&config.providers.embedding)?;
	let service =
		GrimoireService::new(config, Arc::new(db), Arc::new(qdrant), Arc::new(files), providers);

	if args.reconcile {
		service.reconcile_all().await?;

		return Ok(());
	}

	worker::run_worker(&service).await
}
