//! Server side of the desktop-delivery protocol: negotiate once, then
//! answer render requests with framed (optionally SQUIRT-compressed)
//! composite images.

use std::time::Instant;

use log::{debug, info};
use rand::Rng;
use shared::delivery::{
    squirt, write_frame, ConnectionState, ControlMessage, FrameHeader, TimingMetrics,
};
use shared::models::compression::CompressionState;
use shared::models::frame::CompositeResult;
use shared::models::tile::TileLayout;
use shared::models::view::ViewState;
use shared::networking::error::NetworkingError;
use shared::networking::result::NetworkingResult;
use shared::networking::{read_json_message, send_json_message};
use tokio::io::{AsyncRead, AsyncWrite};

pub struct DeliveryServer<S> {
    stream: S,
    state: ConnectionState,
    client_name: String,
    compression: CompressionState,
}

impl<S> DeliveryServer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Runs the handshake on a fresh transport: read the client's `Hello`,
    /// clamp its compression request into the supported range and answer
    /// with `Welcome`. The connection is streaming-ready on return.
    pub async fn accept(mut stream: S, layout: TileLayout) -> NetworkingResult<Self> {
        let message: ControlMessage = read_json_message(&mut stream).await?;
        let (client_name, compression) = match message {
            ControlMessage::Hello {
                name, compression, ..
            } => (name, compression.clamped()),
            other => {
                return Err(NetworkingError::Protocol(format!(
                    "expected Hello, got {other:?}"
                )));
            }
        };

        let session_nonce: u64 = rand::thread_rng().gen();
        send_json_message(
            &mut stream,
            &ControlMessage::Welcome {
                session_nonce,
                compression,
                layout,
            },
        )
        .await?;
        info!("Session {:#018x} opened for '{}'", session_nonce, client_name);

        Ok(Self {
            stream,
            state: ConnectionState::Streaming,
            client_name,
            compression,
        })
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn compression(&self) -> CompressionState {
        self.compression
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Waits for the client's next control message. `Ok(Some(view))` is a
    /// render request, `Ok(None)` a clean goodbye.
    pub async fn next_request(&mut self) -> NetworkingResult<Option<ViewState>> {
        match read_json_message(&mut self.stream).await {
            Ok(ControlMessage::RenderRequest { view }) => Ok(Some(view)),
            Ok(ControlMessage::Goodbye) => {
                self.state = ConnectionState::Disconnected;
                Ok(None)
            }
            Ok(other) => Err(NetworkingError::Protocol(format!(
                "expected RenderRequest or Goodbye, got {other:?}"
            ))),
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Ships one composited frame and returns the wall-clock transfer time.
    pub async fn deliver(
        &mut self,
        result: &CompositeResult,
        timings: TimingMetrics,
    ) -> NetworkingResult<f64> {
        let payload = if self.compression.enabled {
            squirt::compress(&result.pixels, self.compression.level())
        } else {
            result.pixels.clone()
        };
        debug!(
            "Frame {}: {} bytes on the wire ({} raw)",
            result.sequence,
            payload.len(),
            result.pixels.len()
        );

        let header = FrameHeader {
            width: result.width,
            height: result.height,
            compressed: self.compression.enabled,
            compression_level: self.compression.level(),
            remote_display: true,
            timings,
        };

        let transfer_timer = Instant::now();
        match write_frame(&mut self.stream, &header, &payload).await {
            Ok(()) => Ok(transfer_timer.elapsed().as_secs_f64()),
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Answers a request whose frame was dropped: an empty-payload header
    /// with `remote_display` unset, telling the client to keep its last
    /// image.
    pub async fn skip_frame(&mut self, timings: TimingMetrics) -> NetworkingResult<()> {
        let header = FrameHeader {
            width: 0,
            height: 0,
            compressed: false,
            compression_level: 0,
            remote_display: false,
            timings,
        };
        match write_frame(&mut self.stream, &header, &[]).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::delivery::read_frame;
    use shared::models::compression::MAX_SQUIRT_LEVEL;

    async fn client_hello(
        stream: &mut (impl AsyncRead + AsyncWrite + Unpin),
        compression: CompressionState,
    ) -> ControlMessage {
        send_json_message(
            stream,
            &ControlMessage::Hello {
                name: "test-display".to_string(),
                compression,
                desired_update_rate: 5.0,
            },
        )
        .await
        .unwrap();
        read_json_message(stream).await.unwrap()
    }

    #[tokio::test]
    async fn handshake_clamps_the_requested_compression_level() {
        let (mut client, server_side) = tokio::io::duplex(1 << 16);
        let layout = TileLayout::single(64, 64);
        let accept = tokio::spawn(DeliveryServer::accept(server_side, layout));

        // serde only sees the already-clamped level, so smuggle a raw one in.
        let raw = format!(
            "{{\"Hello\":{{\"name\":\"test-display\",\"compression\":{{\"enabled\":true,\"level\":{}}},\"desired_update_rate\":5.0}}}}",
            9
        );
        tokio::io::AsyncWriteExt::write_u32(&mut client, raw.len() as u32)
            .await
            .unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut client, raw.as_bytes())
            .await
            .unwrap();

        let welcome: ControlMessage = read_json_message(&mut client).await.unwrap();
        match welcome {
            ControlMessage::Welcome { compression, .. } => {
                assert!(compression.enabled);
                assert_eq!(compression.level(), MAX_SQUIRT_LEVEL);
            }
            other => panic!("unexpected message: {other:?}"),
        }

        let server = accept.await.unwrap().unwrap();
        assert_eq!(server.client_name(), "test-display");
        assert_eq!(server.state(), ConnectionState::Streaming);
    }

    #[tokio::test]
    async fn handshake_rejects_non_hello_openers() {
        let (mut client, server_side) = tokio::io::duplex(1 << 16);
        let accept = tokio::spawn(DeliveryServer::accept(server_side, TileLayout::single(8, 8)));

        send_json_message(&mut client, &ControlMessage::Goodbye)
            .await
            .unwrap();

        assert!(matches!(
            accept.await.unwrap(),
            Err(NetworkingError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn delivered_frames_decompress_to_level_zero_input() {
        let (mut client, server_side) = tokio::io::duplex(1 << 20);
        let accept = tokio::spawn(DeliveryServer::accept(server_side, TileLayout::single(4, 2)));
        match client_hello(&mut client, CompressionState::new(true, 0)).await {
            ControlMessage::Welcome { .. } => {}
            other => panic!("unexpected message: {other:?}"),
        }
        let mut server = accept.await.unwrap().unwrap();

        let pixels: Vec<u8> = (0..4 * 2)
            .flat_map(|i| [i as u8, 2 * i as u8, 3 * i as u8, 0xff])
            .collect();
        let result = CompositeResult::new(4, 2, pixels.clone(), None, 1).unwrap();
        let transfer = server.deliver(&result, TimingMetrics::default()).await.unwrap();
        assert!(transfer >= 0.0);

        let (header, payload) = read_frame(&mut client).await.unwrap();
        assert!(header.compressed);
        assert!(header.remote_display);
        let decoded = squirt::decompress(&payload, 4 * 2).unwrap();
        assert_eq!(decoded, pixels);
    }

    #[tokio::test]
    async fn skipped_frames_carry_no_payload() {
        let (mut client, server_side) = tokio::io::duplex(1 << 16);
        let accept = tokio::spawn(DeliveryServer::accept(server_side, TileLayout::single(8, 8)));
        match client_hello(&mut client, CompressionState::default()).await {
            ControlMessage::Welcome { .. } => {}
            other => panic!("unexpected message: {other:?}"),
        }
        let mut server = accept.await.unwrap().unwrap();

        server.skip_frame(TimingMetrics::default()).await.unwrap();
        let (header, payload) = read_frame(&mut client).await.unwrap();
        assert!(!header.remote_display);
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn goodbye_ends_the_request_stream() {
        let (mut client, server_side) = tokio::io::duplex(1 << 16);
        let accept = tokio::spawn(DeliveryServer::accept(server_side, TileLayout::single(8, 8)));
        match client_hello(&mut client, CompressionState::default()).await {
            ControlMessage::Welcome { .. } => {}
            other => panic!("unexpected message: {other:?}"),
        }
        let mut server = accept.await.unwrap().unwrap();

        send_json_message(
            &mut client,
            &ControlMessage::RenderRequest {
                view: ViewState::default(),
            },
        )
        .await
        .unwrap();
        assert!(server.next_request().await.unwrap().is_some());

        send_json_message(&mut client, &ControlMessage::Goodbye)
            .await
            .unwrap();
        assert!(server.next_request().await.unwrap().is_none());
        assert_eq!(server.state(), ConnectionState::Disconnected);
    }
}
