//! Main entry point for the seewxapkg CLI application.
//!
//! Loads a package from disk or HTTP, then either lists its directory or
//! converts it into a ZIP archive through a private scratch tree.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;
use tracing_subscriber::EnvFilter;

use seewxapkg::pipeline::{self, Options, Stage};
use seewxapkg::wxapkg::{self, Package};
use seewxapkg::{Cli, HttpPackage, LocalPackage, PackageSource};

/// Application entry point.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let app_id = cli.app_id()?;

    report(Stage::Uploading);
    let (data, file_name) = load_package(&cli).await?;

    if cli.list {
        let plain = pipeline::prepare(&data, app_id)?;
        let package = wxapkg::parse(&plain).context("failed to parse package")?;
        list_files(&package);
        return Ok(());
    }

    let output = output_path(&cli, &file_name)?;
    let scratch = create_scratch(cli.temp_dir.as_deref())?;

    let options = Options {
        app_id,
        beautify: cli.beautify,
    };
    let result = pipeline::convert(&data, options, scratch.path(), &output, report).await;

    if cli.keep_scratch {
        let kept = scratch.keep();
        info!(path = %kept.display(), "scratch tree kept");
    }
    let done = result.context("conversion failed")?;

    if cli.quiet == 0 {
        println!(
            "{} files -> {} ({})",
            done.archive.entries,
            done.archive.path.display(),
            format_size(done.archive.size)
        );
    }

    Ok(())
}

fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Log a stage transition the way a progress stream would carry it.
fn report(stage: Stage) {
    info!(stage = stage.as_str(), percent = stage.percent(), "stage");
}

/// Read the whole package and work out its file name.
async fn load_package(cli: &Cli) -> Result<(Vec<u8>, String)> {
    if cli.is_http_url() {
        let source = HttpPackage::new(cli.file.clone(), cli.max_size).await?;
        let data = source.read_all().await?;
        info!(
            transferred = %format_size(source.transferred_bytes()),
            "download complete"
        );
        Ok((data, source.file_name()))
    } else {
        let source = LocalPackage::new(Path::new(&cli.file), cli.max_size)?;
        Ok((source.read_all().await?, source.file_name()))
    }
}

/// `--output`, or `<package stem>.zip` inside `--output-dir`.
fn output_path(cli: &Cli, file_name: &str) -> Result<PathBuf> {
    if let Some(ref path) = cli.output {
        return Ok(path.clone());
    }

    std::fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("cannot create {}", cli.output_dir.display()))?;
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "package".to_string());
    Ok(cli.output_dir.join(format!("{stem}.zip")))
}

/// Fresh, uniquely named scratch directory for this run.
fn create_scratch(parent: Option<&Path>) -> Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("seewxapkg-");
    let dir = match parent {
        Some(parent) => {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
            builder.tempdir_in(parent)
        }
        None => builder.tempdir(),
    };
    dir.context("cannot create scratch directory")
}

/// Print the package directory as a table.
fn list_files(package: &Package<'_>) {
    println!("{:>10}  {:>10}  Name", "Offset", "Size");
    println!("{}", "-".repeat(50));

    for entry in &package.entries {
        println!("{:>10}  {:>10}  {}", entry.offset, entry.size, entry.name);
    }

    println!("{}", "-".repeat(50));
    println!(
        "{:>10}  {:>10}  {} files",
        "",
        package.total_size(),
        package.entries.len()
    );
}

/// Format a byte size into a human-readable string.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
