//! Server binary for dashstitch.
//!
//! A thin shim over the library crate that maps CLI flags to `AppConfig`
//! and starts the HTTP server.

use anyhow::{Context, Result};
use clap::Parser;
use dashstitch::{serve, AppConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on the default port
  dashstitch

  # Bind a public interface with a custom working directory
  dashstitch --host 0.0.0.0 --port 8080 --upload-dir /var/lib/dashstitch/uploads

  # Higher-resolution exports, slower cleanup
  dashstitch --dpi 300 --cleanup-delay-secs 120

WORKFLOW:
  1. POST /api/v1/login                 sign in to the BI server
  2. POST /api/v1/slots                 choose how many dashboards
  3. GET  /api/v1/projects              browse projects → workbooks → views
  4. POST /api/v1/export                export a view into a slot
  5. POST /api/v1/crop                  crop each exported image
  6. POST /api/v1/combine               download the stitched PDF or DOCX

  Every authenticated call carries the session id from step 1 in the
  x-session-id header.

ENVIRONMENT VARIABLES:
  RUST_LOG             Override the tracing filter (e.g. dashstitch=debug)
  PDFIUM_LIB_PATH      Path to an existing libpdfium shared library
"#;

/// Export, crop, and combine BI dashboards into a single report.
#[derive(Parser, Debug)]
#[command(
    name = "dashstitch",
    version,
    about = "Export, crop, and combine BI dashboards into a single report",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Interface to bind.
    #[arg(long, env = "DASHSTITCH_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on.
    #[arg(short, long, env = "DASHSTITCH_PORT", default_value_t = 5000)]
    port: u16,

    /// Directory for exported PDFs and working images.
    #[arg(long, env = "DASHSTITCH_UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Directory for combined report artifacts.
    #[arg(long, env = "DASHSTITCH_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Rasterisation DPI (72–400).
    #[arg(long, env = "DASHSTITCH_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Fallback BI server URL when a login request does not name one.
    #[arg(
        long,
        env = "DASHSTITCH_SERVER_URL",
        default_value = "https://prod-in-a.online.tableau.com"
    )]
    server_url: String,

    /// Per-request timeout for BI server calls, in seconds.
    #[arg(long, env = "DASHSTITCH_HTTP_TIMEOUT", default_value_t = 30)]
    http_timeout: u64,

    /// Delay before intermediate files are removed after a combine.
    #[arg(long, env = "DASHSTITCH_CLEANUP_DELAY", default_value_t = 30)]
    cleanup_delay_secs: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DASHSTITCH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DASHSTITCH_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let config = AppConfig::builder()
        .upload_dir(&cli.upload_dir)
        .output_dir(&cli.output_dir)
        .dpi(cli.dpi)
        .default_server_url(&cli.server_url)
        .http_timeout_secs(cli.http_timeout)
        .cleanup_delay_secs(cli.cleanup_delay_secs)
        .build()
        .context("Invalid configuration")?;

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", cli.host, cli.port))?;

    serve(config, addr).await.context("Server failed")?;
    Ok(())
}
