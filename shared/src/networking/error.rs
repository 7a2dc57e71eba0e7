use std::fmt;

#[derive(Debug)]
pub enum NetworkingError {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// The stream did not start with the expected protocol magic.
    BadMagic(u32),
    /// The peer went away while a message was expected.
    ConnectionClosed,
    /// The peer sent a well-formed message at the wrong protocol point.
    Protocol(String),
}

impl fmt::Display for NetworkingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkingError::Io(e) => write!(f, "io error: {e}"),
            NetworkingError::Json(e) => write!(f, "json error: {e}"),
            NetworkingError::BadMagic(m) => write!(f, "bad protocol magic: {m:#010x}"),
            NetworkingError::ConnectionClosed => write!(f, "connection closed by peer"),
            NetworkingError::Protocol(reason) => write!(f, "protocol violation: {reason}"),
        }
    }
}

impl std::error::Error for NetworkingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NetworkingError::Io(e) => Some(e),
            NetworkingError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for NetworkingError {
    fn from(e: std::io::Error) -> Self {
        NetworkingError::Io(e)
    }
}

impl From<serde_json::Error> for NetworkingError {
    fn from(e: serde_json::Error) -> Self {
        NetworkingError::Json(e)
    }
}
