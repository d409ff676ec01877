use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = grimoire_api::Args::parse();

	grimoire_api::run(args).await
}
