use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use bundlescope::analysis::Analyzer;
use bundlescope::config::AnalyzerConfig;
use bundlescope::export::{export_to_string, ExportData, ExportFormat};
use bundlescope::source;

#[derive(Parser)]
#[command(name = "bundlescope")]
#[command(author = "Zachary Woods <143150513+zach-fau@users.noreply.github.com>")]
#[command(version = "0.1.0")]
#[command(about = "Class-file dependency analyzer that computes OSGi bundle manifest headers", long_about = None)]
struct Cli {
    /// Log analysis steps to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a directory of class files
    Analyze {
        /// Bundle directory (defaults to current directory)
        #[arg(short, long, default_value = ".")]
        path: PathBuf,

        /// Class-path directory, may be repeated
        #[arg(short = 'c', long = "classpath")]
        classpath: Vec<PathBuf>,

        /// JSON file with the instruction headers
        #[arg(long)]
        config: Option<PathBuf>,

        /// Set a single header, e.g. `-H Export-Package=com.acme.*`
        #[arg(short = 'H', long = "header", value_name = "NAME=VALUE")]
        headers: Vec<String>,

        /// Output format: manifest, json or markdown
        #[arg(short, long, default_value = "manifest")]
        format: ExportFormat,

        /// Write the output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show version information
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Some(Commands::Analyze {
            path,
            classpath,
            config,
            headers,
            format,
            output,
        }) => match analyze(path, classpath, config.as_deref(), headers, *format, output.as_deref()) {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::FAILURE,
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        },
        Some(Commands::Version) => {
            println!("bundlescope v{}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        None => {
            println!("BundleScope - OSGi Bundle Dependency Analyzer");
            println!("Run 'bundlescope analyze --path <dir>' to analyze a bundle");
            println!("Run 'bundlescope --help' for more information");
            ExitCode::SUCCESS
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "bundlescope=debug" } else { "bundlescope=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Runs one analysis. Returns false when the analysis reported errors.
fn analyze(
    path: &Path,
    classpath: &[PathBuf],
    config: Option<&Path>,
    headers: &[String],
    format: ExportFormat,
    output: Option<&Path>,
) -> Result<bool> {
    let mut settings = match config {
        Some(file) => AnalyzerConfig::load(file).with_context(|| format!("loading {}", file.display()))?,
        None => AnalyzerConfig::new(),
    };
    for header in headers {
        let (name, value) = header
            .split_once('=')
            .with_context(|| format!("expected NAME=VALUE, got '{header}'"))?;
        settings.set(name.trim(), value)?;
    }

    let analyzer = Analyzer::new(settings);
    let mut model = analyzer.model();
    source::load_bundle(&mut model, path).with_context(|| format!("reading bundle {}", path.display()))?;
    for entry in classpath {
        source::load_classpath(&mut model, entry)
            .with_context(|| format!("reading class path entry {}", entry.display()))?;
    }
    info!(classes = model.class_count(), classpath = classpath.len(), "analyzing bundle");

    let result = analyzer.analyze(&mut model);
    for diagnostic in result.diagnostics.iter() {
        eprintln!("{diagnostic}");
    }

    let name = path
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| path.display().to_string());
    let data = ExportData::new(name, &model, &result);
    let text = export_to_string(format, &data)?;
    match output {
        Some(file) => {
            fs::write(file, text).with_context(|| format!("writing {}", file.display()))?;
            debug!(output = %file.display(), %format, "wrote report");
        }
        None => print!("{text}"),
    }

    Ok(!result.has_errors())
}
