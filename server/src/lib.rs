pub mod backend;
pub mod delivery;
pub mod metrics;
pub mod reduction;
pub mod render_manager;

use log::{debug, error, info, warn};
use shared::{
    env, logger,
    models::tile::TileLayout,
    networking::server::ServerConfig,
    networking::{classify_eof, result::NetworkingResult},
};
use tokio::net::{TcpListener, TcpStream};

use crate::backend::SlabBackend;
use crate::delivery::DeliveryServer;
use crate::metrics::SessionMetrics;
use crate::render_manager::{ParallelRenderManager, RenderBackend};

pub async fn run_server(config: &ServerConfig) {
    env::init();
    logger::init();

    match run(config).await {
        Ok(()) => info!("Server shutdown gracefully"),
        Err(e) => error!("Server error: {}", e),
    }
}

async fn run(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let layout = TileLayout::single(config.width, config.height);
    layout.validate()?;

    let backends: Vec<Box<dyn RenderBackend>> = (0..config.ranks)
        .map(|rank| Box::new(SlabBackend::new(rank, config.ranks)) as Box<dyn RenderBackend>)
        .collect();
    let mut manager = ParallelRenderManager::new(
        config.strategy,
        config.width,
        config.height,
        config.max_reduction_factor,
        backends,
    )?;
    info!(
        "Render group up: {} ranks, {:?} compositing",
        config.ranks, config.strategy
    );

    let server_addr = format!("{}:{}", config.address, config.port);
    let listener = start_server(&server_addr).await?;
    info!("Server listening on {}", server_addr);

    // One display client at a time: the controller channel is exclusively
    // owned by the render manager for each frame's exchange.
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            accepted = listener.accept() => {
                let (socket, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                };
                info!("Display client connecting from {}", peer);
                handle_session(&mut manager, socket, &layout).await;
            }
        }
    }

    manager.shutdown().await;
    Ok(())
}

async fn start_server(addr: &str) -> NetworkingResult<TcpListener> {
    Ok(TcpListener::bind(addr).await?)
}

/// Runs one desktop-delivery session until the client leaves or the
/// transport fails. Per-frame errors drop that frame only; connection
/// errors end the session and the server waits for a reconnect.
async fn handle_session(
    manager: &mut ParallelRenderManager,
    socket: TcpStream,
    layout: &TileLayout,
) {
    let mut delivery = match DeliveryServer::accept(socket, layout.clone()).await {
        Ok(delivery) => delivery,
        Err(e) => {
            error!("Handshake failed: {}", classify_eof(e));
            return;
        }
    };
    info!(
        "Client '{}' negotiated (compression: {:?})",
        delivery.client_name(),
        delivery.compression()
    );

    let mut metrics = SessionMetrics::new();
    loop {
        let view = match delivery.next_request().await {
            Ok(Some(view)) => view,
            Ok(None) => {
                info!("Client '{}' said goodbye", delivery.client_name());
                break;
            }
            Err(e) => {
                error!("Session dropped to local-only rendering: {}", classify_eof(e));
                break;
            }
        };

        match manager.request_frame(&view).await {
            Ok(result) => {
                debug!(
                    "Frame {} composited ({}x{})",
                    result.sequence, result.width, result.height
                );
                match delivery.deliver(&result, manager.last_metrics()).await {
                    Ok(transfer_time) => {
                        manager.record_transfer_time(transfer_time);
                        metrics.record_delivered(manager.last_metrics());
                    }
                    Err(e) => {
                        error!("Delivery failed, falling back to local-only: {}", classify_eof(e));
                        break;
                    }
                }
            }
            Err(e) => {
                warn!("Frame dropped: {}", e);
                metrics.record_dropped();
                // Tell the client to keep its last image.
                if let Err(e) = delivery.skip_frame(manager.last_metrics()).await {
                    error!("Delivery failed, falling back to local-only: {}", classify_eof(e));
                    break;
                }
            }
        }
    }

    info!("{}", metrics.summary());
}
