//! In-process transport: every rank is a thread of the same process.
//!
//! `LocalCluster::new(n)` builds an n×n mesh of unbounded channels. Sends
//! never block, so a collective is posted by sending eagerly to every target
//! and completed by receiving one packet from every source. Per-link FIFO
//! order plus the collective tag catch any rank that falls out of step.

use crate::transport::{CollectiveKind, Communicator, GatherRequest, Tag, TransportError};
use crate::TransportResult;
use bytes::Bytes;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use eventpass_types::Rank;
use std::time::Duration;
use tracing::trace;

#[derive(Debug)]
struct Packet {
    tag: Tag,
    payload: Bytes,
}

/// Builder for a set of connected in-process ranks.
pub struct LocalCluster;

impl LocalCluster {
    /// Default time a rank waits on a peer before declaring it stuck.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create `size` communicators, one per rank, in rank order.
    ///
    /// Each communicator is meant to be moved onto its own thread.
    pub fn new(size: u32, timeout: Duration) -> Vec<LocalCommunicator> {
        let n = size as usize;
        let mut senders: Vec<Vec<Sender<Packet>>> = (0..n).map(|_| Vec::with_capacity(n)).collect();
        let mut receivers: Vec<Vec<Receiver<Packet>>> =
            (0..n).map(|_| Vec::with_capacity(n)).collect();

        // senders[from][to] feeds receivers[to][from].
        for from_links in senders.iter_mut() {
            for to_links in receivers.iter_mut() {
                let (tx, rx) = channel::unbounded();
                from_links.push(tx);
                to_links.push(rx);
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (senders, receivers))| LocalCommunicator {
                rank: Rank(rank as u32),
                senders,
                receivers,
                seq: 0,
                timeout,
            })
            .collect()
    }
}

/// One rank's end of a [`LocalCluster`].
#[derive(Debug)]
pub struct LocalCommunicator {
    rank: Rank,
    /// Indexed by destination rank.
    senders: Vec<Sender<Packet>>,
    /// Indexed by source rank.
    receivers: Vec<Receiver<Packet>>,
    seq: u64,
    timeout: Duration,
}

impl LocalCommunicator {
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn next_tag(&mut self, kind: CollectiveKind) -> Tag {
        let tag = Tag {
            kind,
            seq: self.seq,
        };
        self.seq += 1;
        tag
    }

    fn check_rank(&self, rank: Rank) -> TransportResult<()> {
        if rank.index() < self.senders.len() {
            Ok(())
        } else {
            Err(TransportError::UnknownRank(rank))
        }
    }

    fn send(&self, to: Rank, tag: Tag, payload: Bytes) -> TransportResult<()> {
        self.senders[to.index()]
            .send(Packet { tag, payload })
            .map_err(|_| TransportError::PeerGone {
                rank: self.rank,
                peer: to,
            })
    }

    /// Send to `targets`, then hand back a request collecting from `sources`.
    /// A source equal to this rank is satisfied with our own payload.
    fn post(
        &mut self,
        kind: CollectiveKind,
        targets: &[Rank],
        sources: &[Rank],
        payload: Bytes,
    ) -> TransportResult<LocalGather> {
        for &rank in targets.iter().chain(sources) {
            self.check_rank(rank)?;
        }
        let tag = self.next_tag(kind);

        for &to in targets {
            if to != self.rank {
                self.send(to, tag, payload.clone())?;
            }
        }

        let blocks = sources
            .iter()
            .map(|&from| (from == self.rank).then(|| payload.clone()))
            .collect();

        trace!(
            rank = self.rank.0,
            %tag,
            targets = targets.len(),
            sources = sources.len(),
            "Posted collective"
        );

        Ok(LocalGather {
            rank: self.rank,
            tag,
            timeout: self.timeout,
            sources: sources.to_vec(),
            receivers: sources
                .iter()
                .map(|from| self.receivers[from.index()].clone())
                .collect(),
            blocks,
        })
    }

    fn all_ranks(&self) -> Vec<Rank> {
        (0..self.size()).map(Rank).collect()
    }
}

impl Communicator for LocalCommunicator {
    type Request = LocalGather;

    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> u32 {
        self.senders.len() as u32
    }

    fn broadcast(&mut self, root: Rank, payload: Option<Bytes>) -> TransportResult<Bytes> {
        self.check_rank(root)?;
        let tag = self.next_tag(CollectiveKind::Broadcast);

        if root == self.rank {
            let payload = payload.unwrap_or_default();
            for to in self.all_ranks() {
                if to != self.rank {
                    self.send(to, tag, payload.clone())?;
                }
            }
            return Ok(payload);
        }

        let packet = match self.receivers[root.index()].recv_timeout(self.timeout) {
            Ok(packet) => packet,
            Err(RecvTimeoutError::Timeout) => {
                return Err(TransportError::Timeout {
                    rank: self.rank,
                    from: root,
                    tag,
                    timeout: self.timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(TransportError::PeerGone {
                    rank: self.rank,
                    peer: root,
                })
            }
        };
        accept(self.rank, root, tag, packet)
    }

    fn post_all_gather(&mut self, payload: Bytes) -> TransportResult<LocalGather> {
        let ranks = self.all_ranks();
        self.post(CollectiveKind::AllGather, &ranks, &ranks, payload)
    }

    fn post_neighbor_all_gather(
        &mut self,
        targets: &[Rank],
        sources: &[Rank],
        payload: Bytes,
    ) -> TransportResult<LocalGather> {
        self.post(CollectiveKind::NeighborGather, targets, sources, payload)
    }

    fn barrier(&mut self) -> TransportResult<()> {
        let ranks = self.all_ranks();
        self.post(CollectiveKind::Barrier, &ranks, &ranks, Bytes::new())?
            .wait()
            .map(|_| ())
    }
}

/// A posted gather on a [`LocalCommunicator`].
#[derive(Debug)]
pub struct LocalGather {
    rank: Rank,
    tag: Tag,
    timeout: Duration,
    sources: Vec<Rank>,
    receivers: Vec<Receiver<Packet>>,
    blocks: Vec<Option<Bytes>>,
}

fn accept(rank: Rank, from: Rank, expected: Tag, packet: Packet) -> TransportResult<Bytes> {
    if packet.tag != expected {
        return Err(TransportError::Desync {
            rank,
            from,
            expected,
            got: packet.tag,
        });
    }
    Ok(packet.payload)
}

impl GatherRequest for LocalGather {
    fn test(&mut self) -> TransportResult<bool> {
        let mut complete = true;
        for (i, block) in self.blocks.iter_mut().enumerate() {
            if block.is_some() {
                continue;
            }
            let from = self.sources[i];
            match self.receivers[i].try_recv() {
                Ok(packet) => *block = Some(accept(self.rank, from, self.tag, packet)?),
                Err(TryRecvError::Empty) => complete = false,
                Err(TryRecvError::Disconnected) => {
                    return Err(TransportError::PeerGone {
                        rank: self.rank,
                        peer: from,
                    })
                }
            }
        }
        Ok(complete)
    }

    fn wait(self) -> TransportResult<Vec<Bytes>> {
        let mut payloads = Vec::with_capacity(self.blocks.len());
        for ((block, receiver), &from) in self
            .blocks
            .into_iter()
            .zip(&self.receivers)
            .zip(&self.sources)
        {
            let payload = match block {
                Some(payload) => payload,
                None => match receiver.recv_timeout(self.timeout) {
                    Ok(packet) => accept(self.rank, from, self.tag, packet)?,
                    Err(RecvTimeoutError::Timeout) => {
                        return Err(TransportError::Timeout {
                            rank: self.rank,
                            from,
                            tag: self.tag,
                            timeout: self.timeout,
                        })
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(TransportError::PeerGone {
                            rank: self.rank,
                            peer: from,
                        })
                    }
                },
            };
            payloads.push(payload);
        }
        Ok(payloads)
    }
}
