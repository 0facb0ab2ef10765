use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use oii_inspector::config;
use oii_inspector::container::CancelToken;
use oii_inspector::registry::Inspector;

/// Exit status after an interrupt, as a shell reports SIGINT.
const INTERRUPTED: i32 = 130;

/// Query operator index images through a temporary local registry container
#[derive(Parser)]
#[command(name = "oii-inspector", version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ./.oii-inspector.yaml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Image {
    /// Address of the index image
    #[arg(long)]
    address: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List packages in the index image
    ListPackages {
        #[command(flatten)]
        image: Image,
    },

    /// List bundles in the index image
    ListBundles {
        #[command(flatten)]
        image: Image,
    },

    /// Get package metadata
    GetPackage {
        #[command(flatten)]
        image: Image,
        /// Name of the desired package
        #[arg(long)]
        package_name: String,
    },

    /// Get a bundle by package, channel and csv
    GetBundle {
        #[command(flatten)]
        image: Image,
        /// Name of the desired package
        #[arg(long)]
        package_name: String,
        /// Name of the desired channel
        #[arg(long)]
        channel_name: String,
        /// Name of the desired csv
        #[arg(long)]
        csv_name: String,
    },

    /// Get the head bundle of a channel
    GetBundleForChannel {
        #[command(flatten)]
        image: Image,
        /// Name of the desired package
        #[arg(long)]
        package_name: String,
        /// Name of the desired channel
        #[arg(long)]
        channel_name: String,
    },

    /// Get the bundle that replaces the given csv
    GetBundleThatReplaces {
        #[command(flatten)]
        image: Image,
        /// Name of the desired package
        #[arg(long)]
        package_name: String,
        /// Name of the desired channel
        #[arg(long)]
        channel_name: String,
        /// Name of the desired csv
        #[arg(long)]
        csv_name: String,
    },

    /// Get the default bundle providing an API
    GetDefaultBundleThatProvides {
        #[command(flatten)]
        image: Image,
        /// Name of the desired group
        #[arg(long)]
        group: String,
        /// Version of the desired group
        #[arg(long = "version")]
        api_version: String,
        /// Kind of the desired group
        #[arg(long)]
        kind: String,
        /// Plural of the desired group
        #[arg(long)]
        plural: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let cfg = match &cli.config {
        Some(path) => config::load_file(path)?,
        None => config::load(&std::env::current_dir().context("no working directory")?)?,
    };
    let cancel = CancelToken::new();
    install_signal_handler(&cancel)?;
    let inspector = Inspector::new(cfg).with_cancel_token(cancel);

    let value = match run(&inspector, cli.command) {
        Ok(value) => value,
        Err(err) if is_cancelled(&err) => {
            warn!("interrupted, container released");
            std::process::exit(INTERRUPTED);
        }
        Err(err) => return Err(err),
    };
    println!("{}", to_json(&value)?);
    Ok(())
}

/// The first SIGINT or SIGTERM tears the running session down; a second one exits at once.
fn install_signal_handler(cancel: &CancelToken) -> Result<()> {
    let cancel = cancel.clone();
    ctrlc::set_handler(move || {
        if cancel.is_cancelled() {
            std::process::exit(INTERRUPTED);
        }
        warn!("received shutdown signal, releasing container");
        cancel.cancel();
    })
    .context("failed to install signal handler")
}

fn is_cancelled(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<oii_inspector::Error>(),
        Some(oii_inspector::Error::Cancelled)
    )
}

/// Four-space indented JSON; object keys come out sorted.
fn to_json(value: &Value) -> Result<String> {
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8(out)?)
}

/// Logs go to stderr; stdout carries only the JSON result.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("oii_inspector={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(inspector: &Inspector, command: Commands) -> Result<Value> {
    let value = match command {
        Commands::ListPackages { image } => Value::Array(
            inspector
                .list_packages(&image.address)
                .context("failed to list packages")?,
        ),
        Commands::ListBundles { image } => Value::Array(
            inspector
                .list_bundles(&image.address)
                .context("failed to list bundles")?,
        ),
        Commands::GetPackage {
            image,
            package_name,
        } => inspector
            .get_package(&image.address, &package_name)
            .with_context(|| format!("failed to get package {package_name}"))?,
        Commands::GetBundle {
            image,
            package_name,
            channel_name,
            csv_name,
        } => inspector
            .get_bundle(&image.address, &package_name, &channel_name, &csv_name)
            .with_context(|| format!("failed to get bundle {csv_name}"))?,
        Commands::GetBundleForChannel {
            image,
            package_name,
            channel_name,
        } => inspector
            .get_bundle_for_channel(&image.address, &package_name, &channel_name)
            .with_context(|| format!("failed to get bundle for channel {channel_name}"))?,
        Commands::GetBundleThatReplaces {
            image,
            package_name,
            channel_name,
            csv_name,
        } => inspector
            .get_bundle_that_replaces(&image.address, &package_name, &channel_name, &csv_name)
            .with_context(|| format!("failed to get bundle replacing {csv_name}"))?,
        Commands::GetDefaultBundleThatProvides {
            image,
            group,
            api_version,
            kind,
            plural,
        } => inspector
            .get_default_bundle_that_provides(&image.address, &group, &api_version, &kind, &plural)
            .with_context(|| format!("failed to get default bundle providing {group}/{api_version} {kind}"))?,
    };
    Ok(value)
}
