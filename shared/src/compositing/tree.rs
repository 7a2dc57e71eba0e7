//! Tree composite: pairwise binary-tree reduction over ceil(log2 N) rounds.
//! In round r the rank with bit 2^r set ships its working buffer to
//! `rank - 2^r` and is done; the receiver merges. Rank 0 ends up holding
//! the whole image.

use tokio::sync::watch;

use super::{is_cancelled, merge_parts, recv_part, FramePart, RankMessage};
use crate::controller::ChannelController;
use crate::errors::{CompositeError, RenderResult};

pub(super) async fn run(
    ctl: &mut ChannelController<RankMessage>,
    mut part: FramePart,
    cancel: Option<&watch::Receiver<bool>>,
) -> RenderResult<Option<FramePart>> {
    let total = ctl.total();
    let rank = ctl.rank();

    let mut bit = 1usize;
    while bit < total {
        if rank & bit != 0 {
            // Buffered send: even if the receiver already aborted the frame,
            // this rank finishes without blocking.
            ctl.send(rank - bit, RankMessage::Part(part))?;
            return Ok(None);
        }

        let partner = rank + bit;
        if partner < total {
            let incoming = recv_part(ctl, part.sequence).await?;
            merge_parts(&mut part, incoming)?;
        }

        if is_cancelled(cancel) {
            return Err(CompositeError::Cancelled);
        }
        bit <<= 1;
    }

    Ok(Some(part))
}
