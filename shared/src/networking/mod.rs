pub mod client;
pub mod error;
pub mod result;
pub mod server;

use log::debug;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use self::error::NetworkingError;
use self::result::NetworkingResult;

pub async fn read_message_length<S>(stream: &mut S) -> NetworkingResult<u32>
where
    S: AsyncRead + Unpin,
{
    let mut length_bytes = [0u8; 4];
    stream.read_exact(&mut length_bytes).await?;
    Ok(u32::from_be_bytes(length_bytes))
}

pub async fn read_binary_data<S>(stream: &mut S, length: usize) -> NetworkingResult<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut data_message = vec![0u8; length];
    stream.read_exact(&mut data_message).await?;
    Ok(data_message)
}

pub async fn write_binary_data<S>(stream: &mut S, data: &[u8]) -> NetworkingResult<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(data).await?;
    Ok(stream.flush().await?)
}

/// Sends one length-prefixed JSON control message.
pub async fn send_json_message<S, T>(stream: &mut S, message: &T) -> NetworkingResult<()>
where
    S: AsyncWrite + Unpin,
    T: Serialize,
{
    let serialized = serde_json::to_string(message)?;
    let message_bytes = serialized.as_bytes();

    stream.write_u32(message_bytes.len() as u32).await?;
    stream.write_all(message_bytes).await?;
    Ok(stream.flush().await?)
}

/// Reads one length-prefixed JSON control message.
pub async fn read_json_message<S, T>(stream: &mut S) -> NetworkingResult<T>
where
    S: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let length = read_message_length(stream).await?;
    let raw = read_binary_data(stream, length as usize).await?;
    let json_message = String::from_utf8_lossy(&raw).to_string();
    debug!("Received JSON message: {}", json_message);
    Ok(serde_json::from_str(&json_message)?)
}

/// Maps the io error raised when a peer closes mid-message onto
/// [`NetworkingError::ConnectionClosed`] so callers can tell a clean
/// disconnect from a real transport fault.
pub fn classify_eof(e: NetworkingError) -> NetworkingError {
    match e {
        NetworkingError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
            NetworkingError::ConnectionClosed
        }
        other => other,
    }
}
