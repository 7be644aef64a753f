//! TLS termination for the SCGI listener

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tracing::info;

use crate::error::{Result, ScgiSrvError};

/// Acceptor from a PEM certificate chain and private key
pub fn load_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor> {
    let open = |path: &Path| {
        File::open(path)
            .map(BufReader::new)
            .map_err(|e| ScgiSrvError::config(format!("{}: {}", path.display(), e)))
    };

    let certs = rustls_pemfile::certs(&mut open(cert_path)?)
        .collect::<std::io::Result<Vec<_>>>()?;
    if certs.is_empty() {
        return Err(ScgiSrvError::config(format!(
            "no certificate in {}",
            cert_path.display()
        )));
    }
    let key = rustls_pemfile::private_key(&mut open(key_path)?)?.ok_or_else(|| {
        ScgiSrvError::config(format!("no private key in {}", key_path.display()))
    })?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ScgiSrvError::config(format!("TLS: {e}")))?;

    info!("TLS enabled with {}", cert_path.display());
    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_acceptor(&dir.path().join("private.crt"), &dir.path().join("private.key"))
            .err()
            .unwrap();
        assert!(matches!(err, ScgiSrvError::ConfigError(_)));
    }

    #[test]
    fn test_file_without_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("private.crt");
        let key = dir.path().join("private.key");
        std::fs::write(&cert, "not a pem file\n").unwrap();
        std::fs::write(&key, "").unwrap();
        let err = load_acceptor(&cert, &key).err().unwrap();
        assert!(err.to_string().contains("no certificate"));
    }
}
