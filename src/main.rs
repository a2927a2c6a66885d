//! path-protector - mutating admission webhook that restores protected fields

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use path_protector::config::ProtectionConfig;
use path_protector::telemetry::{init_logging, LogFormat, TelemetryConfig};
use path_protector::webhook::{serve, ServerConfig, TlsFiles, WebhookState};
use path_protector::DEFAULT_WEBHOOK_PORT;

/// path-protector - keep apply from overwriting controller-managed fields
#[derive(Parser, Debug)]
#[command(name = "path-protector", version, about, long_about = None)]
struct Cli {
    /// Port to serve the webhook on
    #[arg(long, env = "PATH_PROTECTOR_PORT", default_value_t = DEFAULT_WEBHOOK_PORT)]
    port: u16,

    /// Address to bind
    #[arg(long, env = "PATH_PROTECTOR_BIND_ADDRESS", default_value = "0.0.0.0")]
    bind_address: std::net::IpAddr,

    /// Path to the x509 certificate for HTTPS
    #[arg(long, env = "PATH_PROTECTOR_TLS_CERT_FILE", requires = "tls_key_file")]
    tls_cert_file: Option<PathBuf>,

    /// Path to the x509 private key matching the certificate
    #[arg(long, env = "PATH_PROTECTOR_TLS_KEY_FILE", requires = "tls_cert_file")]
    tls_key_file: Option<PathBuf>,

    /// Path to a YAML file overriding label, annotation and ignored namespaces
    #[arg(short = 'c', long = "config", env = "PATH_PROTECTOR_CONFIG")]
    config_file: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&TelemetryConfig {
        format: cli.log_format,
        filter: None,
    })?;

    let tls = match (cli.tls_cert_file, cli.tls_key_file) {
        (Some(cert_path), Some(key_path)) => {
            // Install crypto provider - aws-lc-rs
            if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
                anyhow::bail!("failed to install rustls crypto provider: {:?}", e);
            }
            Some(TlsFiles {
                cert_path,
                key_path,
            })
        }
        _ => {
            tracing::warn!("No TLS certificate configured, serving plain HTTP");
            None
        }
    };

    let config = match &cli.config_file {
        Some(path) => ProtectionConfig::load(path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config {:?}: {}", path, e))?,
        None => ProtectionConfig::default(),
    };

    tracing::info!(
        enabled_label = %config.enabled_label,
        paths_annotation = %config.paths_annotation,
        ignored_namespaces = ?config.ignored_namespaces,
        "Loaded protection config"
    );

    let server = ServerConfig {
        addr: SocketAddr::new(cli.bind_address, cli.port),
        tls,
    };

    serve(server, Arc::new(WebhookState::new(config))).await?;
    Ok(())
}
