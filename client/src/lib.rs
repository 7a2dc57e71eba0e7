pub mod delivery;
pub mod sink;

use std::time::Duration;

use log::{error, info, warn};
use shared::{env, graphics, logger, models::frame::CompositeResult, models::view::ViewState};
use shared::networking::client::ClientConfig;
use tokio::net::TcpStream;
use tokio::sync::watch;

use crate::delivery::DeliveryClient;
use crate::sink::{FrameSink, PngSink};

/// Pace used when the desired update rate is zero (reduction disabled);
/// requests still need some cadence.
const FALLBACK_FPS: f64 = 30.0;

pub async fn run_client(config: &ClientConfig) {
    env::init();
    logger::init();

    match run(config).await {
        Ok(()) => info!("Client shutdown gracefully"),
        Err(e) => error!("Client error: {}", e),
    }
}

async fn run(config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let server_addr = format!("{}:{}", config.address, config.port);
    info!("Connecting to {}", server_addr);
    let stream = TcpStream::connect(&server_addr).await?;
    let client = DeliveryClient::negotiate(stream, config).await?;
    let layout = client.layout().clone();

    let (tx, rx) = watch::channel::<Option<CompositeResult>>(None);
    let mut sinks: Vec<Box<dyn FrameSink>> = Vec::new();
    if let Some(dir) = &config.save_dir {
        std::fs::create_dir_all(dir)?;
        sinks.push(Box::new(PngSink::new(dir)));
    }

    let streaming = tokio::spawn(streaming_loop(
        client,
        config.desired_update_rate,
        tx,
        sinks,
    ));

    if config.headless {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            _ = streaming => {}
        }
    } else {
        // The event loop takes over this task until the window closes.
        graphics::start_viewer(layout.full_width, layout.full_height, rx).await?;
    }
    Ok(())
}

/// Requests frames at the configured pace until the session ends. Skipped
/// frames leave the watch slot untouched so the viewer keeps its previous
/// image. A transport error ends the loop; there is no automatic reconnect.
async fn streaming_loop(
    mut client: DeliveryClient<TcpStream>,
    desired_update_rate: f64,
    tx: watch::Sender<Option<CompositeResult>>,
    mut sinks: Vec<Box<dyn FrameSink>>,
) {
    let pace = if desired_update_rate > 0.0 {
        desired_update_rate
    } else {
        FALLBACK_FPS
    };
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / pace));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut view = ViewState::default();
    view.desired_update_rate = desired_update_rate;

    loop {
        ticker.tick().await;
        match client.request_frame(&view).await {
            Ok(Some(frame)) => {
                for sink in &mut sinks {
                    if let Err(e) = sink.on_frame_ready(&frame) {
                        warn!("Frame sink failed: {}", e);
                    }
                }
                // Viewer may have closed already; keep streaming for sinks.
                _ = tx.send(Some(frame));
            }
            Ok(None) => {}
            Err(e) => {
                error!("Session ended: {}", e);
                return;
            }
        }
    }
}
