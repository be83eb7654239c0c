use amplifier::cli::{self, Args};
use amplifier::core::ConfigLoader;
use amplifier::logging;
use clap::Parser;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = args
        .command
        .config_path()
        .map(|path| path.to_path_buf())
        .unwrap_or_else(ConfigLoader::default_path);
    let _guard = logging::init(Some(&config_path), args.command.verbose())?;

    // Runs share one thread; the document tree is not Send.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(cli::run(args))
}
