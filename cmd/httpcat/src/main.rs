use kadmit_webhook::server::{DEFAULT_CERT_FILE, DEFAULT_KEY_FILE, DEFAULT_PORT};
use kadmit_webhook::telemetry;
use kadmit_webhook::{BoxError, Error, WebhookServer, WebhookServerOptions, handler_fn};

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, crate_description, crate_version};

#[derive(Parser, Debug)]
#[command(
    name = "kadmit-httpcat",
    about = crate_description!(),
    version = crate_version!(),
)]
struct Args {
    /// Listen address (use "::" for IPv6, "0.0.0.0" for IPv4)
    #[arg(long, default_value = "0.0.0.0", env)]
    listen_address: IpAddr,

    /// Listen on given port
    #[arg(short, long, default_value_t = DEFAULT_PORT, env)]
    port: u16,

    /// Filter for log messages
    #[arg(short, long, default_value = "info", env)]
    log_filter: String,

    /// Set log format
    #[arg(long, value_enum, default_value_t = telemetry::LogFormat::Text, env)]
    log_format: telemetry::LogFormat,

    /// Path to TLS certificate file
    #[arg(long, default_value = DEFAULT_CERT_FILE, env)]
    tls_cert: PathBuf,

    /// Path to TLS private key file
    #[arg(long, default_value = DEFAULT_KEY_FILE, env)]
    tls_key: PathBuf,

    /// Reload TLS certificate and key when they change on disk
    #[arg(long, env)]
    reload_tls: bool,

    /// Also log raw reviews and verdicts
    #[arg(long, env)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();

    telemetry::init(&args.log_filter, args.log_format)?;

    let options = WebhookServerOptions {
        address: Some(args.listen_address),
        port: args.port,
        cert_file: args.tls_cert,
        key_file: args.tls_key,
        reload_tls: args.reload_tls,
        debug: args.debug,
        ..Default::default()
    }
    .with_handler(handler_fn(|_ctx, request, _writer| async move {
        let pretty = serde_json::to_string_pretty(&request)?;
        tracing::info!(uid = %request.uid, "admission request:\n{pretty}");
        Ok::<_, BoxError>(())
    }));

    match WebhookServer::new(options).listen_and_serve_gracefully().await {
        Ok(()) | Err(Error::ServerClosed) => Ok(()),
        Err(e) => {
            tracing::error!("exited with error: {}", e);
            Err(e.into())
        }
    }
}
