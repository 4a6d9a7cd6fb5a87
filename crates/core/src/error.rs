use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while configuring or running the router.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("routing table line {line}: {reason}")]
    Rtable { line: usize, reason: String },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("route to {dest} uses unknown interface {iface}")]
    UnknownInterface { dest: String, iface: String },

    #[error("interface name {0:?} is not a printable name of at most {max} bytes", max = srouter_proto::IFACE_NAME_LEN)]
    BadInterfaceName(String),

    #[error("interface {0} announced twice")]
    DuplicateInterface(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Proto(#[from] srouter_proto::ProtoError),
}

pub type Result<T> = std::result::Result<T, RouterError>;
