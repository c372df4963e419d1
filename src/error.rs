//! Error type shared by the driver and the sweep.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GppError>;

#[derive(Error, Debug)]
pub enum GppError {
    /// A caller-supplied value the instrument cannot take (channel number,
    /// display type, broadcast kind).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The command exists, but not for this channel.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("failed to parse {what} from {response:?}")]
    Parse { what: &'static str, response: String },
    /// Well-formed response carrying a token outside the known set.
    #[error("unexpected {what} {token:?}")]
    InvalidValue { what: &'static str, token: String },
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("failed to open serial port")]
    Serial(#[from] tokio_serial::Error),
    #[error("serial I/O error")]
    Io(#[from] std::io::Error),
}

impl GppError {
    pub(crate) fn parse(what: &'static str, response: &str) -> Self {
        GppError::Parse {
            what,
            response: response.to_string(),
        }
    }
}
