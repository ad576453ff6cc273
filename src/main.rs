use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use photo_quality_lib::logging::{init_logging, LoggingConfig};
use photo_quality_lib::{analyze_photo, AnalysisReport, AnalyzerSettings};

/// Detect blurry and badly exposed photos
#[derive(Parser, Debug)]
#[command(name = "photo-quality", version, about)]
struct Cli {
    /// Photos to analyze; each one gets its own rendering surface
    #[arg(required = true)]
    photos: Vec<PathBuf>,

    /// Use the CPU rasterizer instead of the GPU
    #[arg(long)]
    software: bool,

    /// Override the analysis surface edge length
    #[arg(long)]
    size: Option<u32>,

    /// Print reports as JSON lines
    #[arg(long)]
    json: bool,

    /// Settings file; defaults apply when it does not exist
    /// (the user config directory is used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_settings(cli: &Cli) -> AnalyzerSettings {
    let loaded = match &cli.config {
        Some(path) => AnalyzerSettings::load_from(path),
        None => AnalyzerSettings::load(),
    };

    let mut settings = loaded.unwrap_or_else(|e| {
        eprintln!("warning: using default settings: {:#}", e);
        AnalyzerSettings::default()
    });
    if cli.software {
        settings.use_gpu = false;
    }
    if let Some(size) = cli.size {
        settings.surface_size = size;
    }
    settings
}

fn print_report(report: &AnalysisReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
    } else {
        println!(
            "{}: brightness={} ({:.1}) blurry={} (variance {:.5}, {} {}px)",
            report.source,
            report.brightness,
            report.avg_luminance,
            report.is_blurry,
            report.edge_variance,
            report.backend,
            report.surface_size
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli);

    init_logging(LoggingConfig {
        env_filter: settings.log_filter.clone(),
        ..Default::default()
    });
    settings.validate()?;

    let mut failures = 0usize;
    for photo in &cli.photos {
        match analyze_photo(photo.clone(), &settings).await {
            Ok(report) => print_report(&report, cli.json)?,
            Err(e) => {
                log::error!("{}: {:#}", photo.display(), e);
                failures += 1;
            }
        }
    }

    anyhow::ensure!(failures == 0, "{} of {} photos could not be analyzed", failures, cli.photos.len());
    Ok(())
}
