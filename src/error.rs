use std::io;

use nix::errno::Errno;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("'{0}' is not a valid id for a digital pin")]
    InvalidPin(String),
    #[error("not connected")]
    NotConnected,
    #[error("already connected")]
    AlreadyConnected,
    #[error("gpio line {0} is not exported")]
    NotExported(u32),
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("unexpected contents in {path}: {value:?}")]
    Parse { path: String, value: String },
    #[error("{op} on {chip} line {line}: {source}")]
    Ioctl {
        op: &'static str,
        chip: String,
        line: u32,
        #[source]
        source: Errno,
    },
    #[error("line {line} out of range for {chip} ({lines} lines)")]
    InvalidLine { chip: String, line: u32, lines: u32 },
    #[error("invalid pin definitions: {0}")]
    Definitions(String),
    #[error("finalize: {}", join_all(.0))]
    Finalize(Vec<Error>),
}

fn join_all(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;
