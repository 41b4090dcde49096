//! screenlink-server: session and signaling coordination server.
//!
//! Brokers WebRTC sessions between a screen-sharing host and its viewers:
//! session lifecycle, password-gated joins, offer/answer/ICE relay, and
//! permission-gated remote-control forwarding.

mod config;
mod credentials;
mod gateway;
mod http;
mod notifier;
mod server;
mod session;
mod signaling;
mod transport;

use clap::Parser;
use config::ServerConfig;
use server::LinkServer;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// screenlink-server — WebRTC session & signaling server
#[derive(Parser, Debug)]
#[command(name = "screenlink-server", version, about = "screenlink signaling server")]
struct Cli {
    /// Signaling (WebSocket) port; HTTP status binds to port + 1
    #[arg(short, long)]
    port: Option<u16>,

    /// TLS certificate (PEM); TLS engages when cert and key are both set
    #[arg(long)]
    cert: Option<String>,

    /// TLS private key (PEM)
    #[arg(long)]
    key: Option<String>,

    /// Config file path
    #[arg(long, default_value = "~/.screenlink/config.toml")]
    config: String,

    /// Generate a self-signed certificate for development
    #[arg(long)]
    generate_cert: bool,

    /// Maximum viewers per session
    #[arg(long)]
    max_clients: Option<usize>,

    /// Session time-to-live in seconds
    #[arg(long)]
    session_timeout: Option<u64>,

    /// Expiry sweep interval in seconds
    #[arg(long)]
    sweep_interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting screenlink-server");

    // Resolve cert/key paths
    let (cert_path, key_path) = if cli.generate_cert {
        match generate_self_signed_cert() {
            Ok((c, k)) => {
                info!(cert = %c.display(), key = %k.display(), "generated self-signed certificate");
                (Some(c), Some(k))
            }
            Err(e) => {
                error!(error = %e, "failed to generate self-signed certificate");
                std::process::exit(1);
            }
        }
    } else {
        (
            cli.cert.as_ref().map(PathBuf::from),
            cli.key.as_ref().map(PathBuf::from),
        )
    };

    // Load server config (file + env + CLI overrides)
    let config_path = PathBuf::from(&cli.config);
    let server_config = match ServerConfig::load(
        Some(&config_path),
        cli.port,
        cert_path.as_ref().and_then(|p| p.to_str()),
        key_path.as_ref().and_then(|p| p.to_str()),
        cli.max_clients,
        cli.session_timeout,
        cli.sweep_interval,
    ) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    // Load TLS config if the cert/key pair is configured
    let tls_config = if server_config.tls_enabled() {
        let cert = server_config.cert_path.as_deref();
        let key = server_config.key_path.as_deref();
        match (cert, key) {
            (Some(cert), Some(key)) => match load_tls_config(cert, key) {
                Ok(cfg) => Some(Arc::new(cfg)),
                Err(e) => {
                    error!(error = %e, "failed to load TLS config");
                    std::process::exit(1);
                }
            },
            _ => None,
        }
    } else {
        info!("no TLS cert/key configured, serving plaintext");
        None
    };

    let link_server = LinkServer::new(server_config);

    tokio::select! {
        result = link_server.run(tls_config) => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    info!("screenlink-server stopped");
}

/// Load TLS certificate and key from PEM files, returning a rustls ServerConfig.
fn load_tls_config(
    cert_path: &std::path::Path,
    key_path: &std::path::Path,
) -> Result<rustls::ServerConfig, Box<dyn std::error::Error>> {
    let cert_pem = std::fs::read(cert_path)
        .map_err(|e| format!("cannot read cert {}: {e}", cert_path.display()))?;
    let key_pem = std::fs::read(key_path)
        .map_err(|e| format!("cannot read key {}: {e}", key_path.display()))?;

    let certs: Vec<rustls::pki_types::CertificateDer<'static>> =
        rustls_pemfile::certs(&mut &cert_pem[..])
            .collect::<Result<Vec<_>, _>>()?;

    let key = rustls_pemfile::private_key(&mut &key_pem[..])?.ok_or("no private key found in PEM")?;

    let mut tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    tls_config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(tls_config)
}

/// Generate a self-signed certificate for development use.
fn generate_self_signed_cert() -> Result<(PathBuf, PathBuf), Box<dyn std::error::Error>> {
    let dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".screenlink");
    std::fs::create_dir_all(&dir)?;

    let cert_path = dir.join("cert.pem");
    let key_path = dir.join("key.pem");

    let mut params = rcgen::CertificateParams::new(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
        "::1".to_string(),
    ])?;
    params.distinguished_name = rcgen::DistinguishedName::new();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, "screenlink-server dev cert");

    let key_pair = rcgen::KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    std::fs::write(&cert_path, cert.pem())?;
    std::fs::write(&key_path, key_pair.serialize_pem())?;

    Ok((cert_path, key_path))
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
