use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::timeout;

use crate::errors::{CompositeError, RenderResult};
use crate::networking::error::NetworkingError;

pub const DEFAULT_EXCHANGE_DEADLINE: Duration = Duration::from_secs(10);

/// Logical identity of a process within the collective. Stable for the
/// process lifetime; `rank < total` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerHandle {
    pub rank: usize,
    pub total: usize,
}

#[derive(Debug)]
pub struct Envelope<T> {
    pub from: usize,
    pub payload: T,
}

/// Point-to-point and collective communication between the render ranks of
/// one session, built on buffered in-process channels. Buffered sends never
/// block, so a rank that aborts a frame cannot leave its peers wedged on a
/// send; leftovers of an abandoned frame are drained by sequence filtering
/// at the compositing layer.
///
/// Every receive takes `&mut self`, which is what enforces the
/// one-concurrent-user-per-channel rule for the exchange phase.
pub struct ChannelController<T> {
    handle: ControllerHandle,
    data_txs: Vec<UnboundedSender<Envelope<T>>>,
    data_rx: UnboundedReceiver<Envelope<T>>,
    /// Envelopes set aside by `recv_from` while waiting on another sender.
    parked: Vec<Envelope<T>>,
    barrier_txs: Vec<UnboundedSender<usize>>,
    barrier_rx: UnboundedReceiver<usize>,
    deadline: Duration,
}

impl<T> ChannelController<T> {
    /// Builds one fully connected controller group. Element `i` of the
    /// returned vector belongs to rank `i`.
    pub fn group(total: usize) -> Vec<Self> {
        assert!(total >= 1, "controller group needs at least one rank");

        let mut data_txs = Vec::with_capacity(total);
        let mut data_rxs = Vec::with_capacity(total);
        let mut barrier_txs = Vec::with_capacity(total);
        let mut barrier_rxs = Vec::with_capacity(total);
        for _ in 0..total {
            let (tx, rx) = mpsc::unbounded_channel();
            data_txs.push(tx);
            data_rxs.push(rx);
            let (tx, rx) = mpsc::unbounded_channel();
            barrier_txs.push(tx);
            barrier_rxs.push(rx);
        }

        data_rxs
            .into_iter()
            .zip(barrier_rxs)
            .enumerate()
            .map(|(rank, (data_rx, barrier_rx))| Self {
                handle: ControllerHandle { rank, total },
                data_txs: data_txs.clone(),
                data_rx,
                parked: Vec::new(),
                barrier_txs: barrier_txs.clone(),
                barrier_rx,
                deadline: DEFAULT_EXCHANGE_DEADLINE,
            })
            .collect()
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn handle(&self) -> ControllerHandle {
        self.handle
    }

    pub fn rank(&self) -> usize {
        self.handle.rank
    }

    pub fn total(&self) -> usize {
        self.handle.total
    }

    pub fn send(&self, to: usize, payload: T) -> RenderResult<()> {
        self.data_txs[to]
            .send(Envelope {
                from: self.handle.rank,
                payload,
            })
            .map_err(|_| CompositeError::Connection(NetworkingError::ConnectionClosed))
    }

    /// Blocks until a message arrives or the exchange deadline expires.
    /// Envelopes parked by an earlier `recv_from` come out first, in
    /// arrival order.
    pub async fn recv(&mut self) -> RenderResult<Envelope<T>> {
        if !self.parked.is_empty() {
            return Ok(self.parked.remove(0));
        }
        match timeout(self.deadline, self.data_rx.recv()).await {
            Ok(Some(envelope)) => Ok(envelope),
            Ok(None) => Err(CompositeError::Connection(
                NetworkingError::ConnectionClosed,
            )),
            Err(_) => Err(CompositeError::Timeout {
                rank: self.handle.rank,
            }),
        }
    }

    /// Like `recv`, but only for messages from one sender. Messages from
    /// other ranks arriving in the meantime are parked for later receives.
    pub async fn recv_from(&mut self, from: usize) -> RenderResult<Envelope<T>> {
        if let Some(at) = self.parked.iter().position(|e| e.from == from) {
            return Ok(self.parked.remove(at));
        }
        loop {
            match timeout(self.deadline, self.data_rx.recv()).await {
                Ok(Some(envelope)) if envelope.from == from => return Ok(envelope),
                Ok(Some(envelope)) => self.parked.push(envelope),
                Ok(None) => {
                    return Err(CompositeError::Connection(
                        NetworkingError::ConnectionClosed,
                    ))
                }
                Err(_) => {
                    return Err(CompositeError::Timeout {
                        rank: self.handle.rank,
                    })
                }
            }
        }
    }

    /// Root-to-all fan-out.
    pub fn broadcast(&self, payload: T) -> RenderResult<()>
    where
        T: Clone,
    {
        for to in 0..self.handle.total {
            if to != self.handle.rank {
                self.send(to, payload.clone())?;
            }
        }
        Ok(())
    }

    /// Collective barrier: everyone checks in at rank 0, rank 0 releases.
    pub async fn barrier(&mut self) -> RenderResult<()> {
        let timeout_err = || CompositeError::Timeout {
            rank: self.handle.rank,
        };
        let closed_err = || CompositeError::Connection(NetworkingError::ConnectionClosed);

        if self.handle.total == 1 {
            return Ok(());
        }
        if self.handle.rank == 0 {
            for _ in 1..self.handle.total {
                match timeout(self.deadline, self.barrier_rx.recv()).await {
                    Ok(Some(_)) => {}
                    Ok(None) => return Err(closed_err()),
                    Err(_) => return Err(timeout_err()),
                }
            }
            for to in 1..self.handle.total {
                self.barrier_txs[to].send(0).map_err(|_| closed_err())?;
            }
        } else {
            self.barrier_txs[0]
                .send(self.handle.rank)
                .map_err(|_| closed_err())?;
            match timeout(self.deadline, self.barrier_rx.recv()).await {
                Ok(Some(_)) => {}
                Ok(None) => return Err(closed_err()),
                Err(_) => return Err(timeout_err()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_every_other_rank() {
        let mut group = ChannelController::<u32>::group(3);
        group[0].broadcast(42).unwrap();
        for ctl in group.iter_mut().skip(1) {
            let envelope = ctl.recv().await.unwrap();
            assert_eq!(envelope.from, 0);
            assert_eq!(envelope.payload, 42);
        }
    }

    #[tokio::test]
    async fn barrier_releases_all_ranks() {
        let group = ChannelController::<()>::group(4);
        let mut handles = Vec::new();
        for mut ctl in group {
            handles.push(tokio::spawn(async move { ctl.barrier().await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn recv_times_out_when_no_peer_sends() {
        let mut group = ChannelController::<u32>::group(2);
        let mut ctl = group.remove(1).with_deadline(Duration::from_millis(20));
        let err = ctl.recv().await.unwrap_err();
        assert!(matches!(err, CompositeError::Timeout { rank: 1 }));
    }

    #[tokio::test]
    async fn recv_from_parks_other_senders() {
        let mut group = ChannelController::<u32>::group(3);
        group[1].send(0, 11).unwrap();
        group[2].send(0, 22).unwrap();

        let mut root = group.remove(0);
        let envelope = root.recv_from(2).await.unwrap();
        assert_eq!(envelope.payload, 22);
        // Rank 1's message was parked, not lost.
        let envelope = root.recv().await.unwrap();
        assert_eq!((envelope.from, envelope.payload), (1, 11));
    }

    #[tokio::test]
    async fn send_targets_only_the_addressee() {
        let mut group = ChannelController::<&'static str>::group(3);
        group[1].send(2, "pixels").unwrap();
        let envelope = group[2].recv().await.unwrap();
        assert_eq!(envelope.from, 1);
        assert_eq!(envelope.payload, "pixels");
    }
}
