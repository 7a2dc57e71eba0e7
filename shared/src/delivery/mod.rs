//! Desktop-delivery wire protocol: a JSON handshake, then one fixed binary
//! header plus a length-prefixed pixel payload per frame.

pub mod squirt;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::models::compression::CompressionState;
use crate::models::tile::TileLayout;
use crate::models::view::ViewState;
use crate::networking::error::NetworkingError;
use crate::networking::result::NetworkingResult;
use crate::networking::{read_binary_data, write_binary_data};

/// "SQRT", the first bytes of every frame header on the wire.
pub const FRAME_MAGIC: u32 = 0x5351_5254;

pub const HEADER_LEN: usize = 4 + 4 + 4 + 1 + 1 + 1 + 3 * 8;

/// Connection lifecycle of a desktop-delivery endpoint. Transitions are
/// explicit and synchronous; there is no observer machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Negotiating,
    Streaming,
}

/// Per-frame wall-clock metrics, carried in the frame header so the client
/// can fold server time into its reduction-factor decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimingMetrics {
    pub render_time: f64,
    pub composite_time: f64,
    pub transfer_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameHeader {
    pub width: u32,
    pub height: u32,
    pub compressed: bool,
    pub compression_level: u8,
    /// When false the client's own renderer already holds an acceptable
    /// image and no payload follows.
    pub remote_display: bool,
    pub timings: TimingMetrics,
}

impl FrameHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&FRAME_MAGIC.to_be_bytes());
        buf[4..8].copy_from_slice(&self.width.to_be_bytes());
        buf[8..12].copy_from_slice(&self.height.to_be_bytes());
        buf[12] = self.compressed as u8;
        buf[13] = self.compression_level;
        buf[14] = self.remote_display as u8;
        buf[15..23].copy_from_slice(&self.timings.render_time.to_be_bytes());
        buf[23..31].copy_from_slice(&self.timings.composite_time.to_be_bytes());
        buf[31..39].copy_from_slice(&self.timings.transfer_time.to_be_bytes());
        buf
    }

    pub fn decode(buf: &[u8; HEADER_LEN]) -> NetworkingResult<Self> {
        let magic = u32::from_be_bytes(buf[0..4].try_into().unwrap_or_default());
        if magic != FRAME_MAGIC {
            return Err(NetworkingError::BadMagic(magic));
        }
        Ok(Self {
            width: u32::from_be_bytes(buf[4..8].try_into().unwrap_or_default()),
            height: u32::from_be_bytes(buf[8..12].try_into().unwrap_or_default()),
            compressed: buf[12] != 0,
            compression_level: buf[13],
            remote_display: buf[14] != 0,
            timings: TimingMetrics {
                render_time: f64::from_be_bytes(buf[15..23].try_into().unwrap_or_default()),
                composite_time: f64::from_be_bytes(buf[23..31].try_into().unwrap_or_default()),
                transfer_time: f64::from_be_bytes(buf[31..39].try_into().unwrap_or_default()),
            },
        })
    }
}

/// Writes one delivered frame: header, then a length-prefixed payload. A
/// header with `remote_display == false` carries an empty payload.
pub async fn write_frame<S>(
    stream: &mut S,
    header: &FrameHeader,
    payload: &[u8],
) -> NetworkingResult<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&header.encode()).await?;
    stream.write_u32(payload.len() as u32).await?;
    write_binary_data(stream, payload).await
}

pub async fn read_frame<S>(stream: &mut S) -> NetworkingResult<(FrameHeader, Vec<u8>)>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; HEADER_LEN];
    stream.read_exact(&mut buf).await?;
    let header = FrameHeader::decode(&buf)?;
    let payload_len = stream.read_u32().await?;
    let payload = read_binary_data(stream, payload_len as usize).await?;
    Ok((header, payload))
}

/// JSON control messages exchanged outside the pixel path. The handshake
/// fixes the compression state and tile layout for the connection; after
/// that the client drives rendering one `RenderRequest` at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControlMessage {
    Hello {
        name: String,
        compression: CompressionState,
        desired_update_rate: f64,
    },
    Welcome {
        session_nonce: u64,
        compression: CompressionState,
        layout: TileLayout,
    },
    RenderRequest {
        view: ViewState,
    },
    Goodbye,
}
