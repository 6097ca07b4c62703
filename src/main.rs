use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use wpshot::browser::{BrowserOptions, EvasionBrowser};
use wpshot::error::ParseError;
use wpshot::types::{CaptureOutcome, ScanResult};
use wpshot::{annotate, capture, parser, report, server};

/// wpshot: turn WPScan output into annotated screenshot evidence and an HTML report.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "wpshot",
    version,
    about = "Turn WPScan output into annotated screenshot evidence and an HTML report.",
    long_about = None
)]
struct Cli {
    /// WPScan output file (text format, colorized or plain).
    #[arg(long)]
    wpscan: PathBuf,

    /// Output directory for screenshots and the report.
    #[arg(long, short = 'o', default_value = "wpshot_output")]
    output: PathBuf,

    /// Per-navigation timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 30_000)]
    timeout_ms: u64,

    /// Max pages captured concurrently within the shared browser session (1 = sequential).
    #[arg(long, default_value_t = 2)]
    concurrency: usize,

    /// Browser viewport width.
    #[arg(long, default_value_t = 1920)]
    width: u32,

    /// Browser viewport height.
    #[arg(long, default_value_t = 1080)]
    height: u32,

    /// Capture only the viewport instead of the full scrollable page.
    #[arg(long = "viewport-only", default_value_t = false)]
    viewport_only: bool,

    /// TrueType font for banner text (falls back to common system fonts).
    #[arg(long)]
    font: Option<PathBuf>,

    /// Write the scan result and raw capture outcomes as pretty JSON to this path.
    #[arg(long)]
    json: Option<PathBuf>,

    /// Serve the finished report over HTTP after the run.
    #[arg(long, default_value_t = false)]
    serve: bool,

    /// Bind address for --serve.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Enable debug logging.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Serialize)]
struct RunExport<'a> {
    scan: &'a ScanResult,
    outcomes: &'a [CaptureOutcome],
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let start = Instant::now();

    let scan = match parser::parse_file(&cli.wpscan) {
        Ok(scan) => scan,
        Err(e) => {
            if e.downcast_ref::<ParseError>().is_some() {
                eprintln!("Could not parse WPScan output.");
                eprintln!("Make sure the file is WPScan output in text format, e.g.:");
                eprintln!("  wpscan --url <target> --format cli-no-colour -o scan.txt");
            }
            return Err(e);
        }
    };
    print_scan_summary(&scan);

    fs::create_dir_all(&cli.output).with_context(|| {
        format!("failed to create output directory: {}", cli.output.display())
    })?;

    let font = annotate::load_font(cli.font.as_deref());

    println!("Capturing visual evidence...");
    let backend = Arc::new(
        EvasionBrowser::launch(BrowserOptions {
            viewport_width: cli.width,
            viewport_height: cli.height,
            nav_timeout: Duration::from_millis(cli.timeout_ms),
            full_page: !cli.viewport_only,
        })
        .await?,
    );

    let outcomes = capture::capture_all(
        backend.clone(),
        &scan,
        &cli.output,
        cli.concurrency,
        font,
        CancellationToken::new(),
    )
    .await;

    // Tear the session down before inspecting the result so the browser is
    // released on every exit path.
    if let Ok(browser) = Arc::try_unwrap(backend) {
        let _ = browser.close().await;
    }
    let outcomes = outcomes?;

    let successful = outcomes.iter().filter(|o| o.is_success()).count();
    let failed = outcomes.len() - successful;
    println!("Captured {} screenshots", successful);
    if failed > 0 {
        println!("{} captures failed (details in the report)", failed);
    }

    let report_path = report::generate(&scan, &outcomes, &cli.output)?;

    if let Some(path) = cli.json.as_deref() {
        write_run_json(path, &scan, &outcomes)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
        println!("Wrote JSON results to {}", path.display());
    }

    println!();
    println!("Summary");
    println!("  target        : {}", scan.url);
    println!("  vulnerabilities: {}", scan.total_vulns());
    println!("  evidence      : {} captured, {} failed", successful, failed);
    println!("  duration      : {:.2}s", start.elapsed().as_secs_f64());
    println!("  report        : {}", report_path.display());
    println!("  screenshots   : {}", cli.output.join("screenshots").display());

    if cli.serve {
        server::serve_report(&cli.bind, cli.output.clone(), scan, outcomes).await?;
    }

    Ok(())
}

fn print_scan_summary(scan: &ScanResult) {
    println!("Parsed WPScan results:");
    println!("  target   : {}", scan.url);
    if let Some(version) = &scan.wordpress_version {
        println!("  WordPress: {} (found by: {})", version.version, version.found_by);
        println!("  core vulnerabilities: {}", scan.wordpress_vulns.len());
    }
    if !scan.themes.is_empty() {
        let theme_vulns: usize = scan.themes.iter().map(|t| t.vulnerabilities.len()).sum();
        println!(
            "  themes   : {} ({} vulnerabilities)",
            scan.themes.len(),
            theme_vulns
        );
    }
    if !scan.interesting_findings.is_empty() {
        println!("  findings : {}", scan.interesting_findings.len());
    }
    println!();
}

fn write_run_json(path: &std::path::Path, scan: &ScanResult, outcomes: &[CaptureOutcome]) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, &RunExport { scan, outcomes })?;
    Ok(())
}
