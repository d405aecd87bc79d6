use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, eyre};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use imagevault::infrastructure::config::args::lossless_flag;
use imagevault::infrastructure::config::{CliArgs, Command, ConfigStore, VaultConfig};
use imagevault::{ImageLibrary, LibraryRegistry};

fn init_logging(config: &VaultConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = &config.log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<VaultConfig> {
    let store = match &args.config {
        Some(path) => ConfigStore::with_dir(
            path.parent()
                .map(std::path::Path::to_path_buf)
                .unwrap_or_default(),
        ),
        None => ConfigStore::new()?,
    };
    let mut config = store.load_config(args.config.as_deref())?;
    config.merge_with_args(args);
    Ok(config)
}

async fn run(library: &ImageLibrary, command: Command) -> Result<()> {
    match command {
        Command::Put {
            key,
            file,
            lossless,
            lossy,
            ..
        } => {
            let image = tokio::task::spawn_blocking(move || image::open(&file))
                .await?
                .wrap_err("Failed to read input image")?;

            let outcome = library
                .set_image(image, key.as_str(), lossless_flag(lossless, lossy))
                .wait()
                .await
                .ok_or_else(|| eyre!("write for {key} was cancelled"))?;
            let stored = outcome?;
            println!("{}", stored.path.display());
        }
        Command::Get { key, output, .. } => {
            let loaded = library.load_image(key.as_str()).await?;
            info!(key = %key, source = %loaded.source, "Loaded image");
            tokio::task::spawn_blocking(move || loaded.image.save(&output))
                .await?
                .wrap_err("Failed to write output image")?;
        }
        Command::Path { key, .. } => match library.stored_path(key.as_str()).await {
            Some(path) => println!("{}", path.display()),
            None => println!("{} (not stored)", library.path_for_key(key.as_str()).display()),
        },
        Command::Remove { key, .. } => library.remove_image_for_key(key.as_str()).await?,
        Command::Clear { .. } => library.remove_all_images().await?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!(version = imagevault::VERSION, "Starting imagevault");

    let options = config
        .library
        .to_options()
        .wrap_err("Invalid library configuration")?;
    let registry = LibraryRegistry::new(config.effective_root_dir(), options);
    let library = registry.library_with_name(args.command.library());

    run(&library, args.command).await
}
