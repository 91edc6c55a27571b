use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use color_eyre::Result;
use entronet_fhe::Address;
use entronet_node::{
    config::{load_config, ConfigFormat},
    service::OracleService,
};
use entronet_telemetry::TelemetryHandle;
use tracing_subscriber::EnvFilter;

#[cfg(any(
    all(feature = "dev", feature = "test"),
    all(feature = "dev", feature = "prod"),
    all(feature = "test", feature = "prod")
))]
compile_error!(
    "Only one of the `dev`, `test`, or `prod` features may be enabled for entronet-node."
);

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "entronet-node",
    version,
    about = "Reference node serving encrypted entropy requests against a simulated chain"
)]
struct Cli {
    /// Path to configuration file (TOML or YAML).
    #[arg(long, default_value = "configs/entronet-node.toml")]
    config: PathBuf,
    /// Explicit configuration format override.
    #[arg(long, value_enum, default_value_t = ConfigFormat::Auto)]
    config_format: ConfigFormat,
    /// Number of paid requests to submit.
    #[arg(long, default_value_t = 1)]
    requests: u32,
    /// Application tag attached to every request.
    #[arg(long, default_value = "lottery-draw")]
    tag: String,
    /// Requesting account; defaults to a fixed demo consumer.
    #[arg(long)]
    consumer: Option<Address>,
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = load_config(&cli.config, cli.config_format)?;
    let telemetry = TelemetryHandle::from_config(config.telemetry.clone());
    let mut service = OracleService::new(&config, telemetry.clone())?;
    let consumer = cli
        .consumer
        .unwrap_or_else(|| Address::derive("entronet-node/consumer"));

    for _ in 0..cli.requests {
        let report = service.request(consumer, cli.tag.as_bytes())?;
        let value = service.reveal(consumer, report.request_id)?;
        println!(
            "request {} block={} consumer={} entropy={} value={:#018x}",
            report.request_id, report.block_number, report.consumer, report.entropy, value
        );
    }

    println!("{}", telemetry.flush()?.to_json()?);
    Ok(())
}
