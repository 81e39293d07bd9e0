//! Storefront backend entry point.

use std::path::PathBuf;

use anyhow::Context;
use storefront::app::build_server;
use storefront_config::{ConfigLoader, DEFAULT_ENV_PREFIX};
use storefront_server::{HandlerRegistry, Router};

const DEFAULT_CONFIG_FILE: &str = "storefront.toml";

/// Command-line arguments.
struct Args {
    /// Configuration file; `storefront.toml` is tried when absent.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => config = args.next().map(PathBuf::from),
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("storefront {}", env!("CARGO_PKG_VERSION"));
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(2);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"Storefront backend

USAGE:
    storefront [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Configuration file (TOML or JSON, default: ./storefront.toml if present)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    STOREFRONT__SERVER__HTTP_ADDR                 Bind address (default: 0.0.0.0:8080)
    STOREFRONT__TELEMETRY__STATSD__ENABLED        Send metrics to DogStatsD (default: true)
    STOREFRONT__TELEMETRY__STATSD__PREFIX         Metric name prefix (default: ecommerce.)
    STOREFRONT__REQUEST_METRICS__BYPASS_PATHS     Comma-separated unmeasured paths
    DD_ENV, DD_SERVICE, DD_VERSION                Global metric tags
    DD_AGENT_HOST, DD_DOGSTATSD_PORT              DogStatsD agent (default: 127.0.0.1:8125)

A .env file in the working directory is loaded first.
"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let loader = ConfigLoader::new()
        .with_dotenv()?
        .with_env_prefix(DEFAULT_ENV_PREFIX)
        .with_datadog_env();
    let loader = match &args.config {
        Some(path) => loader
            .with_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => loader.with_optional_file(DEFAULT_CONFIG_FILE)?,
    };
    let file_loaded = loader.file_loaded();
    let config = loader.load().context("invalid configuration")?;

    let mut telemetry = storefront_telemetry::init_telemetry(config.telemetry_config())
        .context("initializing telemetry")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config_file = file_loaded,
        addr = %config.server.http_addr,
        "starting storefront"
    );

    let server = build_server(
        &config,
        telemetry.sink(),
        Router::new(),
        HandlerRegistry::new(),
    );
    let result = server.run().await;

    telemetry.shutdown();
    result.context("server failed")
}
