use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = parapet_api::Args::parse();

	parapet_api::run(args).await
}
