use std::fmt;

use crate::networking::error::NetworkingError;

/// Frame-scoped error taxonomy. Every variant aborts at most the frame that
/// raised it; the session itself stays alive.
#[derive(Debug)]
pub enum CompositeError {
    /// A pixel or depth buffer does not match its declared dimensions.
    SizeMismatch { expected: usize, actual: usize },
    /// An exchange carried a buffer from a different logical frame.
    FrameMismatch { expected: u64, received: u64 },
    /// A peer did not answer within the exchange deadline.
    Timeout { rank: usize },
    /// The transport below the session failed; remote delivery is disabled
    /// until the caller reconnects.
    Connection(NetworkingError),
    /// Tile layout or visibility order that cannot describe the mosaic.
    InvalidLayout(String),
    /// The manager abandoned the frame mid-composite.
    Cancelled,
}

pub type RenderResult<T> = Result<T, CompositeError>;

impl fmt::Display for CompositeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositeError::SizeMismatch { expected, actual } => {
                write!(f, "buffer size mismatch: expected {expected}, got {actual}")
            }
            CompositeError::FrameMismatch { expected, received } => {
                write!(
                    f,
                    "frame sequence mismatch: expected {expected}, received {received}"
                )
            }
            CompositeError::Timeout { rank } => {
                write!(f, "rank {rank} timed out during an exchange round")
            }
            CompositeError::Connection(e) => write!(f, "connection error: {e}"),
            CompositeError::InvalidLayout(reason) => write!(f, "invalid layout: {reason}"),
            CompositeError::Cancelled => write!(f, "frame cancelled"),
        }
    }
}

impl std::error::Error for CompositeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompositeError::Connection(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NetworkingError> for CompositeError {
    fn from(e: NetworkingError) -> Self {
        CompositeError::Connection(e)
    }
}
