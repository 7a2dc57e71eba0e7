pub mod binary_swap;
pub mod merge;
pub mod tree;

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::controller::ChannelController;
use crate::errors::{CompositeError, RenderResult};
use crate::models::frame::{CompositeResult, RenderFrame, BYTES_PER_PIXEL};
use crate::models::view::ViewState;
use crate::networking::error::NetworkingError;

/// Sort-last compositing algorithm for the session. Chosen once at session
/// configuration time, never switched mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompositeStrategy {
    TreeComposite,
    BinarySwap,
}

impl std::str::FromStr for CompositeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tree" => Ok(CompositeStrategy::TreeComposite),
            "binary-swap" => Ok(CompositeStrategy::BinarySwap),
            other => Err(format!(
                "unknown strategy '{other}', expected 'tree' or 'binary-swap'"
            )),
        }
    }
}

/// Per-frame state broadcast from rank 0 in PreRender so every rank renders
/// the same view at the same resolution.
#[derive(Debug, Clone)]
pub struct FrameInfo {
    pub sequence: u64,
    pub view: ViewState,
    pub reduction_factor: u32,
    pub width: u32,
    pub height: u32,
}

/// Everything that flows between ranks over the controller channel.
#[derive(Debug, Clone)]
pub enum RankMessage {
    FrameInfo(FrameInfo),
    Part(FramePart),
    Shutdown,
}

/// A working buffer in flight between ranks: either a whole sub-image or,
/// during binary-swap, a contiguous scan-order pixel range of one. Tagged
/// with the frame sequence so no exchange can mix buffers from different
/// logical frames.
#[derive(Debug, Clone)]
pub struct FramePart {
    pub sequence: u64,
    /// Number of pixels covered, in row-major scan order.
    pub pixels: u32,
    /// Index of the first covered pixel in the full image's scan order.
    pub pixel_offset: u32,
    pub color: Vec<u8>,
    pub depth: Option<Vec<f32>>,
    /// Position of the frontmost contributor in the visibility order; used
    /// for the over/under decision when no depth buffers exist.
    pub front_order: usize,
    /// Lowest contributing rank; deterministic winner on depth ties.
    pub min_rank: usize,
}

impl FramePart {
    fn from_frame(frame: RenderFrame, order: &VisibilityOrder) -> Self {
        let owner = frame.owner;
        let sequence = frame.sequence;
        let viewport = frame.viewport;
        let (color, depth) = frame.into_planes();
        Self {
            sequence,
            pixels: viewport.pixel_count() as u32,
            pixel_offset: 0,
            color,
            depth,
            front_order: order.position(owner),
            min_rank: owner,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.pixels as usize
    }
}

/// Caller-supplied back-to-front rank ordering used when frames carry no
/// depth buffer. Index 0 is the rearmost rank.
#[derive(Debug, Clone)]
pub struct VisibilityOrder {
    back_to_front: Vec<usize>,
}

impl VisibilityOrder {
    /// Ranks in ascending order, rank 0 rearmost.
    pub fn identity(total: usize) -> Self {
        Self {
            back_to_front: (0..total).collect(),
        }
    }

    pub fn new(back_to_front: Vec<usize>) -> RenderResult<Self> {
        let n = back_to_front.len();
        let mut seen = vec![false; n];
        for &rank in &back_to_front {
            if rank >= n || seen[rank] {
                return Err(CompositeError::InvalidLayout(format!(
                    "visibility order is not a permutation of 0..{n}"
                )));
            }
            seen[rank] = true;
        }
        Ok(Self { back_to_front })
    }

    pub fn len(&self) -> usize {
        self.back_to_front.len()
    }

    pub fn is_empty(&self) -> bool {
        self.back_to_front.is_empty()
    }

    /// Higher position means nearer to the camera.
    pub fn position(&self, rank: usize) -> usize {
        self.back_to_front
            .iter()
            .position(|&r| r == rank)
            .unwrap_or(rank)
    }
}

/// Merges all ranks' frames for one logical frame. Returns the composited
/// image on rank 0 and `None` on every other rank. A single-rank group
/// short-circuits to the identity: the local frame comes back unmodified.
pub async fn compose(
    strategy: CompositeStrategy,
    ctl: &mut ChannelController<RankMessage>,
    frame: RenderFrame,
    order: &VisibilityOrder,
    cancel: Option<&watch::Receiver<bool>>,
) -> RenderResult<Option<CompositeResult>> {
    if order.len() != ctl.total() {
        return Err(CompositeError::InvalidLayout(format!(
            "visibility order covers {} ranks, controller has {}",
            order.len(),
            ctl.total()
        )));
    }

    let sequence = frame.sequence;
    let (width, height) = (frame.viewport.width, frame.viewport.height);

    if ctl.total() == 1 {
        let (color, depth) = frame.into_planes();
        return Ok(Some(CompositeResult::new(
            width, height, color, depth, sequence,
        )?));
    }

    let part = FramePart::from_frame(frame, order);
    let merged = match strategy {
        CompositeStrategy::TreeComposite => tree::run(ctl, part, cancel).await?,
        CompositeStrategy::BinarySwap => binary_swap::run(ctl, part, cancel).await?,
    };

    match merged {
        Some(part) => Ok(Some(CompositeResult::new(
            width, height, part.color, part.depth, sequence,
        )?)),
        None => Ok(None),
    }
}

/// Receives the next frame part for `expected`, draining leftovers of
/// abandoned frames. A part from a *newer* frame means this rank fell behind
/// the group and the whole frame must be dropped.
pub(crate) async fn recv_part(
    ctl: &mut ChannelController<RankMessage>,
    expected: u64,
) -> RenderResult<FramePart> {
    loop {
        let envelope = ctl.recv().await?;
        match envelope.payload {
            RankMessage::Part(part) if part.sequence == expected => return Ok(part),
            RankMessage::Part(part) if part.sequence < expected => {
                debug!(
                    "rank {} drained stale part (seq {} < {})",
                    ctl.rank(),
                    part.sequence,
                    expected
                );
            }
            RankMessage::Part(part) => {
                return Err(CompositeError::FrameMismatch {
                    expected,
                    received: part.sequence,
                })
            }
            RankMessage::FrameInfo(info) => {
                return Err(CompositeError::FrameMismatch {
                    expected,
                    received: info.sequence,
                })
            }
            RankMessage::Shutdown => {
                return Err(CompositeError::Connection(NetworkingError::ConnectionClosed))
            }
        }
    }
}

/// Merges `src` into `dst`. With depth planes this is a strict z-test (ties
/// go to the lower contributing rank); without, the part nearer the front of
/// the visibility order is alpha-blended over the other.
pub(crate) fn merge_parts(dst: &mut FramePart, src: FramePart) -> RenderResult<()> {
    if dst.pixels != src.pixels || dst.pixel_offset != src.pixel_offset {
        return Err(CompositeError::SizeMismatch {
            expected: dst.pixel_count() * BYTES_PER_PIXEL,
            actual: src.pixel_count() * BYTES_PER_PIXEL,
        });
    }

    match (&mut dst.depth, src.depth) {
        (Some(dst_z), Some(src_z)) => {
            if dst.min_rank < src.min_rank {
                merge::z_merge(&mut dst.color, dst_z, &src.color, &src_z);
            } else {
                // Flip the tie-break so the lower rank still wins.
                let mut color = src.color;
                let mut z = src_z;
                merge::z_merge(&mut color, &mut z, &dst.color, dst_z);
                dst.color = color;
                *dst_z = z;
            }
        }
        (None, None) => {
            if src.front_order > dst.front_order {
                merge::blend_over(&src.color, &mut dst.color);
            } else {
                let mut color = src.color;
                merge::blend_over(&dst.color, &mut color);
                dst.color = color;
            }
            dst.front_order = dst.front_order.max(src.front_order);
        }
        _ => {
            // Depth presence must be uniform across the group.
            return Err(CompositeError::SizeMismatch {
                expected: dst.pixel_count(),
                actual: 0,
            });
        }
    }

    dst.min_rank = dst.min_rank.min(src.min_rank);
    Ok(())
}

pub(crate) fn is_cancelled(cancel: Option<&watch::Receiver<bool>>) -> bool {
    cancel.map(|c| *c.borrow()).unwrap_or(false)
}
