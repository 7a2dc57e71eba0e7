//! Binary-swap: partners `rank ^ 2^r` exchange complementary halves of their
//! current pixel region each round, so after log2(N) rounds every rank owns
//! one disjoint region fully composited across all peers. Regions then
//! gather to rank 0. Better bandwidth scaling than tree composite at high
//! rank counts.
//!
//! Regions are contiguous scan-order pixel ranges, so halving keeps working
//! all the way down to single-pixel regions regardless of image shape.
//!
//! Non-power-of-two groups first fold the extra ranks into the largest
//! power-of-two subgroup: rank `p + i` sends its whole frame to rank `i`,
//! which pre-merges it and then swaps on the extra rank's behalf.

use tokio::sync::watch;

use super::{is_cancelled, merge_parts, recv_part, FramePart, RankMessage};
use crate::controller::ChannelController;
use crate::errors::{CompositeError, RenderResult};
use crate::models::frame::BYTES_PER_PIXEL;

pub(super) async fn run(
    ctl: &mut ChannelController<RankMessage>,
    mut part: FramePart,
    cancel: Option<&watch::Receiver<bool>>,
) -> RenderResult<Option<FramePart>> {
    let total = ctl.total();
    let rank = ctl.rank();
    let pow2 = largest_power_of_two(total);
    let extras = total - pow2;

    if rank >= pow2 {
        ctl.send(rank - pow2, RankMessage::Part(part))?;
        return Ok(None);
    }

    // Parts from later rounds can land in the queue before the one this
    // round is waiting for; they are parked here until their round comes.
    let mut pending: Vec<FramePart> = Vec::new();

    if rank < extras {
        let folded = recv_region(ctl, &mut pending, &part).await?;
        merge_parts(&mut part, folded)?;
    }

    let full_pixels = part.pixels;
    let sequence = part.sequence;

    let mut bit = 1usize;
    while bit < pow2 {
        let mid = part.pixels / 2;
        if mid == 0 {
            return Err(CompositeError::InvalidLayout(format!(
                "{}-pixel image is too small to swap across {} ranks",
                full_pixels, pow2
            )));
        }

        let partner = rank ^ bit;
        let (low, high) = split_pixels(part, mid);
        let (kept, sent) = if rank & bit == 0 { (low, high) } else { (high, low) };
        ctl.send(partner, RankMessage::Part(sent))?;
        part = kept;

        let incoming = recv_region(ctl, &mut pending, &part).await?;
        merge_parts(&mut part, incoming)?;

        if is_cancelled(cancel) {
            return Err(CompositeError::Cancelled);
        }
        bit <<= 1;
    }

    if rank != 0 {
        ctl.send(0, RankMessage::Part(part))?;
        return Ok(None);
    }

    // Root: place its own region, then collect the other pow2 - 1 disjoint
    // regions and paste them into the canonical image.
    let has_depth = part.depth.is_some();
    let mut canvas = FramePart {
        sequence,
        pixels: full_pixels,
        pixel_offset: 0,
        color: vec![0u8; full_pixels as usize * BYTES_PER_PIXEL],
        depth: has_depth.then(|| vec![f32::MAX; full_pixels as usize]),
        front_order: part.front_order,
        min_rank: part.min_rank,
    };
    paste_region(&mut canvas, &part)?;
    // Gather regions may already have been parked while the root was still
    // swapping; take those first, then receive the rest in any order.
    let mut gathered = pending.len();
    for region in pending.drain(..) {
        paste_region(&mut canvas, &region)?;
    }
    while gathered < pow2 - 1 {
        let region = recv_part(ctl, sequence).await?;
        paste_region(&mut canvas, &region)?;
        gathered += 1;
    }

    Ok(Some(canvas))
}

/// Receives the part covering exactly `expected`'s region (same pixel count
/// and offset), parking any other region that arrives early.
async fn recv_region(
    ctl: &mut ChannelController<RankMessage>,
    pending: &mut Vec<FramePart>,
    expected: &FramePart,
) -> RenderResult<FramePart> {
    let matches =
        |p: &FramePart| p.pixels == expected.pixels && p.pixel_offset == expected.pixel_offset;
    if let Some(at) = pending.iter().position(matches) {
        return Ok(pending.swap_remove(at));
    }
    loop {
        let part = recv_part(ctl, expected.sequence).await?;
        if matches(&part) {
            return Ok(part);
        }
        pending.push(part);
    }
}

fn largest_power_of_two(n: usize) -> usize {
    let mut p = 1;
    while p * 2 <= n {
        p *= 2;
    }
    p
}

/// Splits a part into its first `mid` pixels and the rest. Both halves keep
/// an offset relative to the full image, so partners always agree on which
/// region a buffer covers.
fn split_pixels(part: FramePart, mid: u32) -> (FramePart, FramePart) {
    let split_px = mid as usize;
    let mut low_color = part.color;
    let high_color = low_color.split_off(split_px * BYTES_PER_PIXEL);
    let (low_depth, high_depth) = match part.depth {
        Some(mut z) => {
            let high = z.split_off(split_px);
            (Some(z), Some(high))
        }
        None => (None, None),
    };

    let low = FramePart {
        sequence: part.sequence,
        pixels: mid,
        pixel_offset: part.pixel_offset,
        color: low_color,
        depth: low_depth,
        front_order: part.front_order,
        min_rank: part.min_rank,
    };
    let high = FramePart {
        sequence: part.sequence,
        pixels: part.pixels - mid,
        pixel_offset: part.pixel_offset + mid,
        color: high_color,
        depth: high_depth,
        front_order: part.front_order,
        min_rank: part.min_rank,
    };
    (low, high)
}

fn paste_region(canvas: &mut FramePart, region: &FramePart) -> RenderResult<()> {
    if region.pixel_offset + region.pixels > canvas.pixels {
        return Err(CompositeError::SizeMismatch {
            expected: canvas.pixel_count() * BYTES_PER_PIXEL,
            actual: region.pixel_count() * BYTES_PER_PIXEL,
        });
    }
    let start_px = region.pixel_offset as usize;
    let len_px = region.pixel_count();
    canvas.color[start_px * BYTES_PER_PIXEL..(start_px + len_px) * BYTES_PER_PIXEL]
        .copy_from_slice(&region.color);
    if let (Some(canvas_z), Some(region_z)) = (&mut canvas.depth, &region.depth) {
        canvas_z[start_px..start_px + len_px].copy_from_slice(region_z);
    }
    Ok(())
}
