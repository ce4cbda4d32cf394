//! Parity CLI - visual and behavioral comparison of two site builds
//!
//! Usage:
//!   parity init                          Write a default parity.toml
//!   parity compare --reference R --candidate C
//!                                        Run the page x viewport matrix
//!   parity viewports                     List the viewport catalogue
//!   parity pages                         List the page catalogue
//!   parity checks                        List the check catalogue
//!   parity diff <ref.png> <cand.png>     Compare two stored screenshots

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use parity_browser::{BrowserConfig, ChromeProvider, RenderingProvider};
use parity_core::{ParityConfig, ParityError, CONFIG_FILE_NAME};
use parity_raster::{DiffPolicy, RasterDiffer, RasterImage};
use parity_runner::{MatrixConfig, MatrixRunner, SourceRoot};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "parity")]
#[command(author, version, about = "Compare a candidate site build against a reference")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file (defaults to ./parity.toml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a parity.toml with the built-in catalogues
    Init {
        /// Directory to write into (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Render both builds across the matrix and compare them
    Compare {
        /// Reference build (URL or local directory)
        #[arg(long, value_name = "URL|PATH")]
        reference: Option<String>,

        /// Candidate build (URL or local directory)
        #[arg(long, value_name = "URL|PATH")]
        candidate: Option<String>,

        /// Page to compare (repeatable; defaults to the page catalogue)
        #[arg(long = "page", value_name = "PATH")]
        pages: Vec<String>,

        /// Viewport name to compare (repeatable; defaults to all)
        #[arg(long = "viewport", value_name = "NAME")]
        viewports: Vec<String>,

        /// Minimum similarity percentage for a cell to count as equal
        #[arg(long)]
        threshold: Option<f64>,

        /// Output directory for artifacts and reports
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Cells evaluated concurrently
        #[arg(long)]
        parallel: Option<usize>,

        /// Page load timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Fail the run when any cell falls below the similarity threshold
        #[arg(long)]
        fail_on_visual_drift: bool,

        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },

    /// List the viewport catalogue
    Viewports,

    /// List the page catalogue
    Pages,

    /// List the check catalogue
    Checks,

    /// Compare two stored screenshots
    Diff {
        /// Reference image
        reference: PathBuf,

        /// Candidate image
        candidate: PathBuf,

        /// Where to write the difference visualization
        #[arg(short, long, default_value = "diff.png")]
        output: PathBuf,

        /// Minimum similarity percentage to pass
        #[arg(long)]
        threshold: Option<f64>,

        /// Print the comparison record as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Command-line overrides for `compare`
struct CompareArgs {
    reference: Option<String>,
    candidate: Option<String>,
    pages: Vec<String>,
    viewports: Vec<String>,
    threshold: Option<f64>,
    output: Option<PathBuf>,
    parallel: Option<usize>,
    timeout: Option<u64>,
    fail_on_visual_drift: bool,
    headed: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init { path, force } => cmd_init(path, force).await,
        Commands::Compare {
            reference,
            candidate,
            pages,
            viewports,
            threshold,
            output,
            parallel,
            timeout,
            fail_on_visual_drift,
            headed,
        } => {
            let args = CompareArgs {
                reference,
                candidate,
                pages,
                viewports,
                threshold,
                output,
                parallel,
                timeout,
                fail_on_visual_drift,
                headed,
            };
            cmd_compare(load_config(cli.config.as_deref())?, args).await
        }
        Commands::Viewports => cmd_viewports(&load_config(cli.config.as_deref())?),
        Commands::Pages => cmd_pages(&load_config(cli.config.as_deref())?),
        Commands::Checks => cmd_checks(&load_config(cli.config.as_deref())?),
        Commands::Diff {
            reference,
            candidate,
            output,
            threshold,
            json,
        } => cmd_diff(&reference, &candidate, &output, threshold, json).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<ParityConfig> {
    match path {
        Some(path) => ParityConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => {
            let cwd = std::env::current_dir().context("Cannot determine working directory")?;
            ParityConfig::load_or_default(&cwd).context("Failed to load parity.toml")
        }
    }
}

async fn cmd_init(path: PathBuf, force: bool) -> Result<ExitCode> {
    let config_path = path.join(CONFIG_FILE_NAME);
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    tokio::fs::create_dir_all(&path).await?;
    let content = ParityConfig::default().to_toml()?;
    tokio::fs::write(&config_path, content)
        .await
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    println!("Created {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Set 'reference' and 'candidate' in {}", CONFIG_FILE_NAME);
    println!("  2. Run 'parity compare' to render and compare both builds");
    Ok(ExitCode::SUCCESS)
}

async fn cmd_compare(mut config: ParityConfig, args: CompareArgs) -> Result<ExitCode> {
    if let Some(threshold) = args.threshold {
        config.diff.pass_threshold = threshold;
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    if let Some(parallel) = args.parallel {
        config.run.max_parallel_cells = parallel;
    }
    if let Some(timeout) = args.timeout {
        config.run.load_timeout_secs = timeout;
    }
    if args.fail_on_visual_drift {
        config.run.fail_on_visual_drift = true;
    }
    if args.headed {
        config.browser.headless = false;
    }
    config.validate()?;

    let reference = args
        .reference
        .or_else(|| config.reference.clone())
        .context("No reference given (use --reference or set 'reference' in parity.toml)")?;
    let candidate = args
        .candidate
        .or_else(|| config.candidate.clone())
        .context("No candidate given (use --candidate or set 'candidate' in parity.toml)")?;
    let reference = SourceRoot::parse(&reference).context("Invalid reference")?;
    let candidate = SourceRoot::parse(&candidate).context("Invalid candidate")?;

    let viewports = config.select_viewports(&args.viewports)?;
    let pages = config.select_pages(&args.pages);
    let matrix = MatrixConfig::from_config(&config)
        .with_viewports(viewports)
        .with_pages(pages);

    info!("Reference: {}", reference);
    info!("Candidate: {}", candidate);

    let timeout = Duration::from_secs(config.run.load_timeout_secs);
    let browser = BrowserConfig::from(&config.browser).with_timeout(timeout);
    let provider: Arc<dyn RenderingProvider> = Arc::new(ChromeProvider::new(browser));
    let runner = MatrixRunner::new(provider, reference, candidate, matrix);

    let report = runner.run().await.context("Comparison run failed")?;

    println!("{}", report.render_summary());
    println!("Artifacts written to {}", runner.config().output_dir.display());

    Ok(if report.exit_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_viewports(config: &ParityConfig) -> Result<ExitCode> {
    println!("Viewports:");
    for viewport in &config.viewports {
        println!("  {:<10} {}x{}", viewport.name, viewport.width, viewport.height);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_pages(config: &ParityConfig) -> Result<ExitCode> {
    println!("Pages ({}):", config.pages.len());
    for page in &config.pages {
        println!("  {}", page);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_checks(config: &ParityConfig) -> Result<ExitCode> {
    if config.checks.is_empty() {
        println!("No checks configured");
        return Ok(ExitCode::SUCCESS);
    }

    println!("Checks ({}):", config.checks.len());
    for check in &config.checks {
        println!(
            "  {} ({})",
            check.name,
            if check.hard { "hard" } else { "soft" }
        );
        println!("    {}", check.kind);
        println!("    Targets: {:?}, {}", check.targets, check.gate);
        if !check.pages.is_empty() {
            let pages: Vec<&str> = check.pages.iter().map(|p| p.path()).collect();
            println!("    Pages: {}", pages.join(", "));
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_diff(
    reference: &Path,
    candidate: &Path,
    output: &Path,
    threshold: Option<f64>,
    json: bool,
) -> Result<ExitCode> {
    let mut policy = DiffPolicy::default();
    if let Some(threshold) = threshold {
        if !(0.0..=100.0).contains(&threshold) {
            bail!("threshold must be within 0..=100, got {}", threshold);
        }
        policy.pass_threshold = threshold;
    }

    let reference = open_capture(reference)?;
    let candidate = open_capture(candidate)?;

    let differ = RasterDiffer::new(policy);
    let diff = differ.compare(&reference, &candidate);

    let png = diff.visualization.to_png()?;
    tokio::fs::write(output, png)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let result = diff.result;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Similarity: {:.2}% ({} of {} pixels differ, max difference {})",
            result.similarity_percentage(),
            result.different_pixels(),
            result.total_pixels(),
            result.max_difference()
        );
        if diff.resampled {
            println!("Candidate resampled to {}x{}", reference.width(), reference.height());
        }
        println!("Diff written to {}", output.display());
        println!(
            "Result: {} (threshold {}%)",
            if result.passed() { "PASS" } else { "FAIL" },
            differ.policy().pass_threshold
        );
    }

    Ok(if result.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Open a stored capture, refusing images without pixels
fn open_capture(path: &Path) -> Result<RasterImage> {
    let image = RasterImage::open(path)?;
    if image.is_empty() {
        return Err(ParityError::Image(format!("{} has no pixels", path.display())).into());
    }
    Ok(image)
}
