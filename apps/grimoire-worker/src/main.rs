use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = grimoire_worker::Args::parse();

	grimoire_worker::run(args).await
}
