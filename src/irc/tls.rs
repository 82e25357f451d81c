//! TLS client setup and certificate fingerprint pinning.
//!
//! When a fingerprint is pinned, the handshake accepts any certificate and
//! the trust decision moves to an explicit post-handshake comparison of the
//! peer certificate's SHA-1 digest against the configured value; a mismatch
//! is a terminal trust failure for the session. Without a pin, the native
//! root store applies. A PEM client certificate can be presented so the
//! server can tie the connection to an account for SASL EXTERNAL.

use std::sync::Arc;

use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{self, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;
use tracing::warn;

use crate::error::LinkError;

/// Normalize a configured fingerprint: lowercase, colons stripped.
pub fn strip_fingerprint(fingerprint: &str) -> String {
    fingerprint
        .chars()
        .filter(|c| *c != ':')
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Lowercase hex SHA-1 digest of a DER certificate.
pub fn sha1_fingerprint(cert: &CertificateDer<'_>) -> String {
    let digest = ring::digest::digest(&ring::digest::SHA1_FOR_LEGACY_USE_ONLY, cert.as_ref());
    let mut out = String::with_capacity(40);
    for byte in digest.as_ref() {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Fingerprint of the peer's leaf certificate, if one was presented.
pub fn peer_fingerprint(stream: &TlsStream<tokio::net::TcpStream>) -> Option<String> {
    let (_, connection) = stream.get_ref();
    connection
        .peer_certificates()
        .and_then(|certs| certs.first())
        .map(sha1_fingerprint)
}

/// Build a TLS connector for one IRC server.
///
/// `pinned` selects the trust model; `client_cert_pem` optionally names a
/// PEM file holding the client certificate chain and key.
pub fn connector(pinned: bool, client_cert_pem: Option<&str>) -> Result<TlsConnector, LinkError> {
    let builder = if pinned {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(PinnedTrustVerifier))
    } else {
        let mut roots = RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for error in &native.errors {
            warn!(error = %error, "tls: skipping unreadable native root");
        }
        for cert in native.certs {
            if let Err(e) = roots.add(cert) {
                warn!(error = %e, "tls: skipping invalid native root");
            }
        }
        ClientConfig::builder().with_root_certificates(roots)
    };

    let config = match client_cert_pem {
        Some(path) => {
            let (certs, key) = load_identity(path)?;
            builder.with_client_auth_cert(certs, key)?
        }
        None => builder.with_no_client_auth(),
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Load a client certificate chain and private key from one PEM file.
fn load_identity(
    path: &str,
) -> Result<(Vec<CertificateDer<'static>>, rustls::pki_types::PrivateKeyDer<'static>), LinkError> {
    let pem = std::fs::read(path)?;

    let certs = rustls_pemfile::certs(&mut pem.as_slice()).collect::<Result<Vec<_>, _>>()?;
    let key = rustls_pemfile::private_key(&mut pem.as_slice())?.ok_or_else(|| {
        LinkError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("no private key in {}", path),
        ))
    })?;
    Ok((certs, key))
}

/// Handshake-time verifier used under fingerprint pinning: accept the
/// chain unconditionally so the session can apply the pin itself.
#[derive(Debug)]
struct PinnedTrustVerifier;

impl ServerCertVerifier for PinnedTrustVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA1,
            SignatureScheme::ECDSA_SHA1_Legacy,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_and_lowercases() {
        assert_eq!(
            strip_fingerprint("AB:CD:ef:01"),
            "abcdef01".to_owned()
        );
        assert_eq!(strip_fingerprint("abcdef01"), "abcdef01");
    }

    #[test]
    fn sha1_known_vector() {
        let cert = CertificateDer::from(b"abc".to_vec());
        assert_eq!(
            sha1_fingerprint(&cert),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }
}
