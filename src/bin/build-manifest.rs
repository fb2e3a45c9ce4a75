use std::path::PathBuf;

use clap::Parser;
use hybrid_serve::config::{load_config, BuildConfig, RouteHeaders};
use hybrid_serve::manifest::ManifestBuilder;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "build-manifest")]
#[command(about = "Build the static asset manifest for hybrid-serve", long_about = None)]
struct Cli {
    /// TOML config whose [build] section supplies defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of built static output.
    #[arg(long)]
    static_root: Option<PathBuf>,

    /// Directory to write static-manifest.json and build-id into.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// JSON file mapping route paths to header overrides.
    #[arg(long)]
    route_headers: Option<PathBuf>,

    /// Subdirectory of fingerprinted assets to mark immutable.
    #[arg(long)]
    immutable_dir: Option<String>,

    /// Refuse route overrides of Content-Type as well.
    #[arg(long)]
    protect_content_type: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "hybrid_serve=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut build = match &cli.config {
        Some(path) => load_config(path)?.build,
        None => BuildConfig::default(),
    };

    if let Some(static_root) = cli.static_root {
        build.static_root = static_root;
    }
    if let Some(out_dir) = cli.out_dir {
        build.out_dir = out_dir;
    }
    if let Some(dir) = cli.immutable_dir {
        build.immutable_dir = Some(dir);
    }
    if cli.protect_content_type {
        build.protect_content_type = true;
    }
    if let Some(path) = cli.route_headers {
        let rules: RouteHeaders = serde_json::from_slice(&std::fs::read(&path)?)?;
        build.route_headers.extend(rules);
    }

    let manifest = ManifestBuilder::from_config(&build).build(&build.static_root, &build.out_dir)?;
    println!(
        "Wrote {} entries to {}",
        manifest.len(),
        build.out_dir.display()
    );
    Ok(())
}
