use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustls::ServerConfig;
use rustls::crypto::aws_lc_rs::default_provider;
use rustls::pki_types::CertificateDer;
use tracing::{error, info, warn};

use crate::error::{Error, Result};

/// Time given to secret updates to land every file before reloading.
pub const DEFAULT_RELOAD_DELAY: Duration = Duration::from_secs(5);

/// Load a PEM certificate chain and private key into a rustls server config.
pub fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<ServerConfig> {
    let cert_file = File::open(cert_path)
        .map_err(|e| Error::Io(format!("failed to open {}", cert_path.display()), e))?;
    let key_file = File::open(key_path)
        .map_err(|e| Error::Io(format!("failed to open {}", key_path.display()), e))?;

    let mut cert_reader = BufReader::new(cert_file);
    let mut key_reader = BufReader::new(key_file);

    let certs: Vec<CertificateDer> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Error::Io(format!("failed to parse {}", cert_path.display()), e))?;

    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| Error::Io(format!("failed to parse {}", key_path.display()), e))?
        .ok_or_else(|| Error::MissingPrivateKey(key_path.to_path_buf()))?;

    let mut config = ServerConfig::builder_with_provider(Arc::new(default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls("unsupported protocol versions".to_string(), e))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::Tls("invalid certificate or key".to_string(), e))?;

    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(config)
}

/// Directories to watch for certificate rotation.
///
/// Parents are watched rather than the files so symlink swaps of mounted secrets are seen.
fn watched_dirs(cert_path: &Path, key_path: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::with_capacity(2);
    for path in [cert_path, key_path] {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

/// Reload `rustls_config` whenever the certificate or key changes on disk.
///
/// Runs until the task is aborted.
pub(crate) async fn watch_tls_files(
    cert_path: PathBuf,
    key_path: PathBuf,
    rustls_config: RustlsConfig,
    delay: Duration,
) {
    let (tx, mut rx) = tokio::sync::mpsc::channel(1);

    let mut watcher = match notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        if let Ok(event) = res {
            if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                // a full channel already holds a pending reload
                let _ = tx.try_send(());
            }
        }
    }) {
        Ok(watcher) => watcher,
        Err(e) => {
            error!(error = %e, "failed to create TLS file watcher");
            return;
        }
    };

    for dir in watched_dirs(&cert_path, &key_path) {
        if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            warn!(dir = %dir.display(), error = %e, "failed to watch TLS directory");
        }
    }

    while rx.recv().await.is_some() {
        tokio::time::sleep(delay).await;

        match load_tls_config(&cert_path, &key_path) {
            Ok(new_config) => {
                rustls_config.reload_from_config(Arc::new(new_config));
                info!("successfully reloaded TLS certificates");
            }
            Err(e) => {
                error!(error = %e, "failed to load new TLS config");
            }
        }
    }
}
