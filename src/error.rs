//! Error types shared by the daemon's connection tasks.

use mcrelay_proto::resp::RespError;
use mcrelay_proto::ProtocolError;
use thiserror::Error;

/// Why a link (IRC or Redis) stopped serving.
///
/// Everything here is recoverable by reconnecting, except
/// [`LinkError::FingerprintMismatch`], which the IRC session treats as a
/// terminal trust failure.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("irc protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("resp protocol error: {0}")]
    Resp(#[from] RespError),

    #[error("tls error: {0}")]
    Tls(#[from] tokio_rustls::rustls::Error),

    #[error("invalid server name: {0}")]
    ServerName(#[from] tokio_rustls::rustls::pki_types::InvalidDnsNameError),

    /// The peer certificate's digest did not match the pinned fingerprint.
    #[error("server certificate fingerprint mismatch")]
    FingerprintMismatch,

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,
}
