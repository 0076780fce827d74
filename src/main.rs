use clap::Parser;
use zemenai::cli::{self, CliArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    zemenai::init_logging(args.debug);
    cli::run(args).await
}
