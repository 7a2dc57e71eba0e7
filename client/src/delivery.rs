//! Client side of the desktop-delivery protocol. One `DeliveryClient` owns
//! the transport for the whole session and walks the connection state
//! machine explicitly; there are no callbacks.

use log::{debug, info};
use shared::delivery::{
    read_frame, squirt, ConnectionState, ControlMessage, TimingMetrics,
};
use shared::models::compression::CompressionState;
use shared::models::frame::CompositeResult;
use shared::models::tile::TileLayout;
use shared::models::view::ViewState;
use shared::networking::client::ClientConfig;
use shared::networking::error::NetworkingError;
use shared::networking::result::NetworkingResult;
use shared::networking::{read_json_message, send_json_message};
use shared::errors::RenderResult;
use tokio::io::{AsyncRead, AsyncWrite};

pub struct DeliveryClient<S> {
    stream: S,
    state: ConnectionState,
    compression: CompressionState,
    layout: TileLayout,
    /// Frames delivered so far on this connection.
    sequence: u64,
    last_timings: TimingMetrics,
}

impl<S> DeliveryClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Sends `Hello` and adopts whatever the server's `Welcome` settled on.
    /// The server may clamp the requested compression level; its answer is
    /// authoritative for the rest of the session.
    pub async fn negotiate(mut stream: S, config: &ClientConfig) -> NetworkingResult<Self> {
        send_json_message(
            &mut stream,
            &ControlMessage::Hello {
                name: config.name.clone(),
                compression: config.compression,
                desired_update_rate: config.desired_update_rate,
            },
        )
        .await?;

        let (compression, layout) = match read_json_message(&mut stream).await? {
            ControlMessage::Welcome {
                session_nonce,
                compression,
                layout,
            } => {
                info!(
                    "Joined session {:#018x} (compression: {:?}, mosaic {}x{})",
                    session_nonce, compression, layout.full_width, layout.full_height
                );
                (compression, layout)
            }
            other => {
                return Err(NetworkingError::Protocol(format!(
                    "expected Welcome, got {other:?}"
                )));
            }
        };

        Ok(Self {
            stream,
            state: ConnectionState::Streaming,
            compression,
            layout,
            sequence: 0,
            last_timings: TimingMetrics::default(),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn compression(&self) -> CompressionState {
        self.compression
    }

    pub fn layout(&self) -> &TileLayout {
        &self.layout
    }

    /// Server-side timings of the last delivered frame.
    pub fn last_timings(&self) -> TimingMetrics {
        self.last_timings
    }

    /// Requests one frame for `view` and blocks until the server answers.
    /// `Ok(None)` means the server skipped the frame and the caller must
    /// keep showing its previous image untouched.
    pub async fn request_frame(&mut self, view: &ViewState) -> RenderResult<Option<CompositeResult>> {
        send_json_message(
            &mut self.stream,
            &ControlMessage::RenderRequest { view: view.clone() },
        )
        .await
        .map_err(|e| self.fail(e))?;

        let (header, payload) = read_frame(&mut self.stream)
            .await
            .map_err(|e| self.fail(e))?;
        self.last_timings = header.timings;

        if !header.remote_display {
            debug!("Server skipped a frame; keeping the previous image");
            return Ok(None);
        }

        let pixel_count = header.width as usize * header.height as usize;
        let pixels = if header.compressed {
            squirt::decompress(&payload, pixel_count)?
        } else {
            payload
        };
        self.sequence += 1;
        let result = CompositeResult::new(header.width, header.height, pixels, None, self.sequence)?;
        Ok(Some(result))
    }

    /// Ends the session cleanly. The server keeps running and will accept
    /// the next client.
    pub async fn goodbye(&mut self) -> NetworkingResult<()> {
        send_json_message(&mut self.stream, &ControlMessage::Goodbye).await?;
        self.state = ConnectionState::Disconnected;
        Ok(())
    }

    fn fail(&mut self, e: NetworkingError) -> NetworkingError {
        self.state = ConnectionState::Disconnected;
        e
    }
}
