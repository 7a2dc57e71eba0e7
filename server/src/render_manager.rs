//! Per-frame orchestration for the sort-last render group:
//! `Idle -> PreRender -> LocalRender -> Composite -> Deliver -> PostRender`.
//! One frame at a time; the next PreRender cannot start until the previous
//! PostRender finished, which keeps buffer identity and compression state
//! unambiguous across ranks.

use std::time::Instant;

use log::{debug, error};
use shared::compositing::{
    compose, CompositeStrategy, FrameInfo, RankMessage, VisibilityOrder,
};
use shared::controller::ChannelController;
use shared::delivery::TimingMetrics;
use shared::errors::{CompositeError, RenderResult};
use shared::models::frame::{CompositeResult, RenderFrame, Viewport};
use shared::models::view::ViewState;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::reduction::{reduced_size, ReductionPolicy};

/// Renders one rank's local data partition. The partition itself comes from
/// the surrounding application; the manager only hands over the view and the
/// resolution to render at.
pub trait RenderBackend: Send + 'static {
    /// Returns the RGBA color plane and, optionally, a depth plane of
    /// exactly `width * height` entries.
    fn render(&mut self, view: &ViewState, width: u32, height: u32) -> (Vec<u8>, Option<Vec<f32>>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Idle,
    PreRender,
    LocalRender,
    Composite,
    Deliver,
    PostRender,
}

pub struct ParallelRenderManager {
    controller: ChannelController<RankMessage>,
    backend: Box<dyn RenderBackend>,
    strategy: CompositeStrategy,
    order: VisibilityOrder,
    full_width: u32,
    full_height: u32,
    sequence: u64,
    stage: RenderStage,
    reduction: ReductionPolicy,
    last_metrics: TimingMetrics,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    satellites: Vec<JoinHandle<()>>,
}

impl ParallelRenderManager {
    /// Spawns one satellite task per rank beyond rank 0 and keeps rank 0's
    /// controller for the manager itself.
    pub fn new(
        strategy: CompositeStrategy,
        full_width: u32,
        full_height: u32,
        max_reduction_factor: u32,
        mut backends: Vec<Box<dyn RenderBackend>>,
    ) -> RenderResult<Self> {
        if backends.is_empty() {
            return Err(CompositeError::InvalidLayout(
                "render group needs at least one backend".to_string(),
            ));
        }
        let total = backends.len();
        let order = VisibilityOrder::identity(total);

        let mut group = ChannelController::group(total);
        let root = group.remove(0);
        let root_backend = backends.remove(0);

        let mut satellites = Vec::with_capacity(total - 1);
        for (ctl, backend) in group.into_iter().zip(backends) {
            let order = order.clone();
            satellites.push(tokio::spawn(satellite_loop(ctl, backend, strategy, order)));
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        Ok(Self {
            controller: root,
            backend: root_backend,
            strategy,
            order,
            full_width,
            full_height,
            sequence: 0,
            stage: RenderStage::Idle,
            reduction: ReductionPolicy::new(max_reduction_factor),
            last_metrics: TimingMetrics::default(),
            cancel_tx,
            cancel_rx,
            satellites,
        })
    }

    pub fn stage(&self) -> RenderStage {
        self.stage
    }

    pub fn last_metrics(&self) -> TimingMetrics {
        self.last_metrics
    }

    pub fn reduction_factor(&self) -> u32 {
        self.reduction.factor()
    }

    /// Abandons the in-flight frame, if any. In-flight exchanges drain into
    /// buffered channels so no peer is left blocked; the composite result is
    /// discarded and the next PreRender broadcast resynchronizes everyone.
    pub fn cancel_frame(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Delivery happens outside the manager; the measured transfer time is
    /// folded back in here for the next adaptation step.
    pub fn record_transfer_time(&mut self, transfer_time: f64) {
        self.last_metrics.transfer_time = transfer_time;
    }

    /// Runs one complete frame and returns the composited image. Every
    /// error is scoped to this frame: the group stays healthy and the next
    /// request starts clean.
    pub async fn request_frame(&mut self, view: &ViewState) -> RenderResult<CompositeResult> {
        self.cancel_tx.send_replace(false);

        // PreRender: same view, same sequence, same resolution everywhere.
        self.stage = RenderStage::PreRender;
        self.sequence += 1;
        let factor = self.reduction.factor();
        let (width, height) = reduced_size(self.full_width, self.full_height, factor);
        let info = FrameInfo {
            sequence: self.sequence,
            view: view.clone(),
            reduction_factor: factor,
            width,
            height,
        };
        self.controller.broadcast(RankMessage::FrameInfo(info))?;

        self.stage = RenderStage::LocalRender;
        let render_timer = Instant::now();
        let frame = render_rank(
            self.backend.as_mut(),
            self.controller.rank(),
            self.sequence,
            view,
            width,
            height,
            factor,
        )?;
        let render_time = render_timer.elapsed().as_secs_f64();

        self.stage = RenderStage::Composite;
        let composite_timer = Instant::now();
        let outcome = compose(
            self.strategy,
            &mut self.controller,
            frame,
            &self.order,
            Some(&self.cancel_rx),
        )
        .await;
        let composite_time = composite_timer.elapsed().as_secs_f64();

        // Everyone meets here whether the frame survived or not, so a
        // dropped frame cannot skew the next one's exchanges.
        self.stage = RenderStage::PostRender;
        self.controller.barrier().await?;

        // Transport cost scales with the pixel count just like compositing,
        // so the previous frame's transfer time belongs in the same budget.
        let prior_transfer = self.last_metrics.transfer_time;
        self.last_metrics = TimingMetrics {
            render_time,
            composite_time,
            transfer_time: 0.0,
        };
        self.reduction.update(
            view.desired_update_rate,
            render_time,
            composite_time + prior_transfer,
            (self.full_width * self.full_height) as usize,
        );
        self.stage = RenderStage::Idle;

        match outcome? {
            Some(result) => Ok(result),
            // Rank 0 always holds the merged image when compose succeeds.
            None => Err(CompositeError::InvalidLayout(
                "composite produced no image on the root rank".to_string(),
            )),
        }
    }

    pub async fn shutdown(mut self) {
        if self.controller.broadcast(RankMessage::Shutdown).is_err() {
            debug!("some satellites were already gone at shutdown");
        }
        for satellite in self.satellites.drain(..) {
            _ = satellite.await;
        }
    }
}

fn render_rank(
    backend: &mut dyn RenderBackend,
    rank: usize,
    sequence: u64,
    view: &ViewState,
    width: u32,
    height: u32,
    factor: u32,
) -> RenderResult<RenderFrame> {
    let (color, depth) = backend.render(view, width, height);
    RenderFrame::new(
        rank,
        sequence,
        color,
        depth,
        Viewport::new(0, 0, width, height),
        factor,
    )
}

/// Satellite ranks sit in this loop for the whole session: wait for the
/// PreRender broadcast, render the local partition, composite, resync.
/// A failed frame is logged and dropped; the next broadcast realigns the
/// rank via its sequence number.
async fn satellite_loop(
    mut ctl: ChannelController<RankMessage>,
    mut backend: Box<dyn RenderBackend>,
    strategy: CompositeStrategy,
    order: VisibilityOrder,
) {
    loop {
        let envelope = match ctl.recv().await {
            Ok(envelope) => envelope,
            // Idle between frames; keep waiting.
            Err(CompositeError::Timeout { .. }) => continue,
            Err(e) => {
                error!("rank {} lost its controller: {}", ctl.rank(), e);
                return;
            }
        };
        match envelope.payload {
            RankMessage::Shutdown => return,
            RankMessage::FrameInfo(info) => {
                let sequence = info.sequence;
                if let Err(e) = satellite_frame(&mut ctl, backend.as_mut(), strategy, &order, info).await
                {
                    error!("rank {} dropped frame {}: {}", ctl.rank(), sequence, e);
                }
                if let Err(e) = ctl.barrier().await {
                    error!("rank {} missed the post-render barrier: {}", ctl.rank(), e);
                }
            }
            RankMessage::Part(part) => {
                debug!(
                    "rank {} drained a part of abandoned frame {}",
                    ctl.rank(),
                    part.sequence
                );
            }
        }
    }
}

async fn satellite_frame(
    ctl: &mut ChannelController<RankMessage>,
    backend: &mut dyn RenderBackend,
    strategy: CompositeStrategy,
    order: &VisibilityOrder,
    info: FrameInfo,
) -> RenderResult<()> {
    let frame = render_rank(
        backend,
        ctl.rank(),
        info.sequence,
        &info.view,
        info.width,
        info.height,
        info.reduction_factor,
    )?;
    compose(strategy, ctl, frame, order, None).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SlabBackend;

    fn test_manager(ranks: usize, strategy: CompositeStrategy) -> ParallelRenderManager {
        let backends: Vec<Box<dyn RenderBackend>> = (0..ranks)
            .map(|rank| Box::new(SlabBackend::new(rank, ranks)) as Box<dyn RenderBackend>)
            .collect();
        ParallelRenderManager::new(strategy, 32, 16, 16, backends).unwrap()
    }

    #[tokio::test]
    async fn request_frame_returns_full_size_image() {
        let mut manager = test_manager(4, CompositeStrategy::TreeComposite);
        let result = manager.request_frame(&ViewState::default()).await.unwrap();
        assert_eq!((result.width, result.height), (32, 16));
        assert_eq!(result.sequence, 1);
        assert_eq!(manager.stage(), RenderStage::Idle);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn identical_requests_yield_bit_identical_frames() {
        for strategy in [CompositeStrategy::TreeComposite, CompositeStrategy::BinarySwap] {
            let mut manager = test_manager(4, strategy);
            let view = ViewState::default();
            let first = manager.request_frame(&view).await.unwrap();
            let second = manager.request_frame(&view).await.unwrap();
            assert_eq!(first.pixels, second.pixels, "{strategy:?}");
            assert_eq!(first.depth, second.depth);
            manager.shutdown().await;
        }
    }

    #[tokio::test]
    async fn single_rank_group_still_renders() {
        let mut manager = test_manager(1, CompositeStrategy::TreeComposite);
        let result = manager.request_frame(&ViewState::default()).await.unwrap();
        assert_eq!(result.pixels.len(), 32 * 16 * 4);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn slow_transfer_coarsens_the_next_frame() {
        let mut manager = test_manager(2, CompositeStrategy::TreeComposite);

        // First frame at rate 0 keeps the factor at 1, then its delivery
        // turns out to be far too slow for 10 fps.
        let mut view = ViewState::default();
        manager.request_frame(&view).await.unwrap();
        assert_eq!(manager.reduction_factor(), 1);
        manager.record_transfer_time(10.0);

        view.desired_update_rate = 10.0;
        manager.request_frame(&view).await.unwrap();
        assert!(
            manager.reduction_factor() > 1,
            "factor stayed at {}",
            manager.reduction_factor()
        );
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn sequence_advances_per_frame() {
        let mut manager = test_manager(2, CompositeStrategy::TreeComposite);
        let view = ViewState::default();
        assert_eq!(manager.request_frame(&view).await.unwrap().sequence, 1);
        assert_eq!(manager.request_frame(&view).await.unwrap().sequence, 2);
        manager.shutdown().await;
    }
}
