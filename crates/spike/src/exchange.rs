//! Two-phase spike exchange.
//!
//! Every exchange first gathers the number of spikes each source is about to
//! send, turns those counts into displacements into one contiguous receive
//! buffer, and then gathers the spikes themselves. Both phases count in
//! units of [`SpikeItem`], so the announced counts can be checked against
//! the payloads that arrive.

use crate::{CommunicationGraph, Communicator, GatherRequest, TransportError, TransportResult};
use bytes::{Buf, Bytes};
use eventpass_types::{decode_spikes, encode_spikes, Rank, SpikeItem, WireError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Prefix sum of `counts`: the offset of each source's block, plus the total.
pub fn compute_displacements(counts: &[usize]) -> (Vec<usize>, usize) {
    let mut displ = Vec::with_capacity(counts.len());
    let mut total = 0;
    for &count in counts {
        displ.push(total);
        total += count;
    }
    (displ, total)
}

/// Which ranks take part in an exchange, as exposed to configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolKind {
    /// Every rank gathers from every rank.
    #[default]
    Global,
    /// Ranks only gather from their in-neighbors.
    Neighbor,
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolKind::Global => write!(f, "global"),
            ProtocolKind::Neighbor => write!(f, "neighbor"),
        }
    }
}

/// Whether an exchange is completed in place or overlapped with other work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeMode {
    #[default]
    Blocking,
    NonBlocking,
}

impl fmt::Display for ExchangeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeMode::Blocking => write!(f, "blocking"),
            ExchangeMode::NonBlocking => write!(f, "non-blocking"),
        }
    }
}

/// Exchange protocol bound to this rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeProtocol {
    Global,
    Neighbor(CommunicationGraph),
}

impl ExchangeProtocol {
    pub fn kind(&self) -> ProtocolKind {
        match self {
            ExchangeProtocol::Global => ProtocolKind::Global,
            ExchangeProtocol::Neighbor(_) => ProtocolKind::Neighbor,
        }
    }

    fn route<C: Communicator>(&self, comm: &C) -> Route {
        match self {
            ExchangeProtocol::Global => Route {
                targets: None,
                sources: (0..comm.size()).map(Rank).collect(),
            },
            ExchangeProtocol::Neighbor(graph) => Route {
                targets: Some(graph.out_neighbors().iter().copied().collect()),
                sources: graph.in_neighbors().iter().copied().collect(),
            },
        }
    }
}

/// Resolved peers of one exchange. `targets` is `None` for a global gather.
#[derive(Debug, Clone)]
struct Route {
    targets: Option<Vec<Rank>>,
    sources: Vec<Rank>,
}

impl Route {
    fn post<C: Communicator>(&self, comm: &mut C, payload: Bytes) -> TransportResult<C::Request> {
        match &self.targets {
            None => comm.post_all_gather(payload),
            Some(targets) => comm.post_neighbor_all_gather(targets, &self.sources, payload),
        }
    }
}

/// Outgoing spikes of the current window, filled concurrently by every
/// cell group of the rank.
#[derive(Debug, Default)]
pub struct SpikeBuffers {
    spikeout: Mutex<Vec<SpikeItem>>,
}

impl SpikeBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: SpikeItem) {
        self.spikeout.lock().push(item);
    }

    pub fn extend(&self, items: impl IntoIterator<Item = SpikeItem>) {
        self.spikeout.lock().extend(items);
    }

    /// Take the window's spikes, leaving the buffer empty.
    pub fn take(&self) -> Vec<SpikeItem> {
        std::mem::take(&mut *self.spikeout.lock())
    }

    pub fn len(&self) -> usize {
        self.spikeout.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Spikes received by one exchange, laid out source by source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceivedSpikes {
    /// Rank each block came from.
    pub sources: Vec<Rank>,
    /// Spikes announced (and received) per source.
    pub nin: Vec<usize>,
    /// Offset of each source's block in `spikes`.
    pub displ: Vec<usize>,
    pub spikes: Vec<SpikeItem>,
}

impl ReceivedSpikes {
    /// Block of spikes received from the `i`-th source.
    pub fn block(&self, i: usize) -> &[SpikeItem] {
        let start = self.displ[i];
        &self.spikes[start..start + self.nin[i]]
    }

    pub fn len(&self) -> usize {
        self.spikes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spikes.is_empty()
    }
}

/// Running totals over all exchanges of a rank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExchangeStats {
    pub rounds: u64,
    pub spikes_out: u64,
    pub spikes_in: u64,
}

/// Spike exchange of one rank.
#[derive(Debug)]
pub struct SpikeExchange {
    protocol: ExchangeProtocol,
    stats: ExchangeStats,
}

impl SpikeExchange {
    pub fn new(protocol: ExchangeProtocol) -> Self {
        Self {
            protocol,
            stats: ExchangeStats::default(),
        }
    }

    pub fn protocol(&self) -> &ExchangeProtocol {
        &self.protocol
    }

    pub fn stats(&self) -> ExchangeStats {
        self.stats
    }

    /// Exchange `out` with the participating ranks and wait for the result.
    pub fn exchange<C: Communicator>(
        &mut self,
        comm: &mut C,
        out: &[SpikeItem],
    ) -> TransportResult<ReceivedSpikes> {
        let route = self.protocol.route(comm);
        let sizes = route.post(comm, encode_count(out.len()))?.wait()?;
        let nin = decode_counts(&sizes, &route.sources)?;
        let blocks = route.post(comm, encode_spikes(out))?.wait()?;
        let received = assemble(route.sources, nin, blocks)?;
        self.record(comm.rank(), out.len(), &received);
        Ok(received)
    }

    /// Post the size phase of an exchange and return without waiting.
    pub fn begin<C: Communicator>(
        &mut self,
        comm: &mut C,
        out: &[SpikeItem],
    ) -> TransportResult<ExchangeHandle<C::Request>> {
        let route = self.protocol.route(comm);
        let sizes = route.post(comm, encode_count(out.len()))?;
        Ok(ExchangeHandle {
            route,
            sent: out.len(),
            payload: encode_spikes(out),
            stage: Stage::Sizes(sizes),
        })
    }

    /// Wait for an exchange started with [`Self::begin`].
    pub fn finish<C: Communicator>(
        &mut self,
        comm: &mut C,
        handle: ExchangeHandle<C::Request>,
    ) -> TransportResult<ReceivedSpikes> {
        let sent = handle.sent;
        let received = handle.complete(comm)?;
        self.record(comm.rank(), sent, &received);
        Ok(received)
    }

    fn record(&mut self, rank: Rank, sent: usize, received: &ReceivedSpikes) {
        self.stats.rounds += 1;
        self.stats.spikes_out += sent as u64;
        self.stats.spikes_in += received.len() as u64;
        debug!(
            rank = rank.0,
            round = self.stats.rounds,
            sent,
            received = received.len(),
            sources = received.sources.len(),
            "Exchanged spikes"
        );
    }
}

#[derive(Debug)]
enum Stage<R> {
    /// Waiting on the spike counts.
    Sizes(R),
    /// Counts known, waiting on the spikes.
    Data { request: R, nin: Vec<usize> },
    /// Left behind by a failed transition.
    Abandoned,
}

/// An exchange in flight.
///
/// Call [`ExchangeHandle::progress`] while doing other work, then hand the
/// handle back to [`SpikeExchange::finish`]. No other collective may be
/// issued on the communicator until then.
#[derive(Debug)]
pub struct ExchangeHandle<R> {
    route: Route,
    sent: usize,
    payload: Bytes,
    stage: Stage<R>,
}

impl<R: GatherRequest> ExchangeHandle<R> {
    /// Advance the exchange without blocking.
    ///
    /// Posts the data phase as soon as the counts are in. Returns whether
    /// the whole exchange has completed.
    pub fn progress<C: Communicator<Request = R>>(&mut self, comm: &mut C) -> TransportResult<bool> {
        if let Stage::Sizes(sizes) = &mut self.stage {
            if !sizes.test()? {
                return Ok(false);
            }
            self.post_data(comm)?;
        }
        match &mut self.stage {
            Stage::Data { request, .. } => request.test(),
            Stage::Sizes(_) => Ok(false),
            Stage::Abandoned => Err(TransportError::Abandoned),
        }
    }

    fn post_data<C: Communicator<Request = R>>(&mut self, comm: &mut C) -> TransportResult<()> {
        if let Stage::Sizes(sizes) = std::mem::replace(&mut self.stage, Stage::Abandoned) {
            let nin = decode_counts(&sizes.wait()?, &self.route.sources)?;
            let request = self.route.post(comm, self.payload.clone())?;
            self.stage = Stage::Data { request, nin };
        }
        Ok(())
    }

    fn complete<C: Communicator<Request = R>>(
        mut self,
        comm: &mut C,
    ) -> TransportResult<ReceivedSpikes> {
        if matches!(self.stage, Stage::Sizes(_)) {
            self.post_data(comm)?;
        }
        match self.stage {
            Stage::Data { request, nin } => assemble(self.route.sources, nin, request.wait()?),
            Stage::Sizes(_) | Stage::Abandoned => Err(TransportError::Abandoned),
        }
    }
}

fn encode_count(count: usize) -> Bytes {
    Bytes::copy_from_slice(&(count as u32).to_le_bytes())
}

fn decode_counts(blocks: &[Bytes], sources: &[Rank]) -> TransportResult<Vec<usize>> {
    debug_assert_eq!(blocks.len(), sources.len());
    blocks
        .iter()
        .map(|block| {
            if block.len() != 4 {
                return Err(WireError::Truncated {
                    len: block.len(),
                    record: 4,
                }
                .into());
            }
            Ok(block.clone().get_u32_le() as usize)
        })
        .collect()
}

/// Lay the received blocks out at their displacements, checking every
/// block against its announced count.
fn assemble(
    sources: Vec<Rank>,
    nin: Vec<usize>,
    blocks: Vec<Bytes>,
) -> TransportResult<ReceivedSpikes> {
    let (displ, total) = compute_displacements(&nin);
    let mut spikes = Vec::with_capacity(total);

    for ((block, &count), &from) in blocks.iter().zip(&nin).zip(&sources) {
        if block.len() != count * SpikeItem::WIRE_SIZE {
            return Err(TransportError::CountMismatch {
                from,
                announced: count,
                bytes: block.len(),
            });
        }
        spikes.extend(decode_spikes(block)?);
    }
    debug_assert_eq!(spikes.len(), total);

    Ok(ReceivedSpikes {
        sources,
        nin,
        displ,
        spikes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventpass_types::Gid;

    #[test]
    fn test_displacements() {
        assert_eq!(
            compute_displacements(&[1, 2, 3, 4]),
            (vec![0, 1, 3, 6], 10)
        );
        assert_eq!(
            compute_displacements(&[6, 2, 5, 1]),
            (vec![0, 6, 8, 13], 14)
        );
        assert_eq!(compute_displacements(&[]), (vec![], 0));
        assert_eq!(compute_displacements(&[0, 0, 3]), (vec![0, 0, 0], 3));
    }

    fn spikes(gids: &[u32]) -> Vec<SpikeItem> {
        gids.iter()
            .map(|&g| SpikeItem::new(Gid(g), g as f64 + 0.5))
            .collect()
    }

    #[test]
    fn test_assemble_places_blocks() {
        let a = spikes(&[1]);
        let b = spikes(&[2, 3, 4]);
        let received = assemble(
            vec![Rank(0), Rank(2)],
            vec![1, 3],
            vec![encode_spikes(&a), encode_spikes(&b)],
        )
        .unwrap();

        assert_eq!(received.displ, vec![0, 1]);
        assert_eq!(received.len(), 4);
        assert_eq!(received.block(0), a.as_slice());
        assert_eq!(received.block(1), b.as_slice());
    }

    #[test]
    fn test_assemble_rejects_count_mismatch() {
        let err = assemble(
            vec![Rank(1)],
            vec![2],
            vec![encode_spikes(&spikes(&[7]))],
        )
        .unwrap_err();
        assert_eq!(
            err,
            TransportError::CountMismatch {
                from: Rank(1),
                announced: 2,
                bytes: 12
            }
        );
    }

    #[test]
    fn test_counts_codec() {
        let blocks = vec![encode_count(0), encode_count(70_000)];
        assert_eq!(
            decode_counts(&blocks, &[Rank(0), Rank(1)]).unwrap(),
            vec![0, 70_000]
        );
        let bad = vec![Bytes::from_static(&[1, 2])];
        assert!(matches!(
            decode_counts(&bad, &[Rank(0)]),
            Err(TransportError::Wire(_))
        ));
    }

    #[test]
    fn test_spike_buffers_take_resets() {
        let buffers = SpikeBuffers::new();
        buffers.push(SpikeItem::new(Gid(1), 1.0));
        buffers.extend(spikes(&[2, 3]));
        assert_eq!(buffers.len(), 3);
        assert_eq!(buffers.take().len(), 3);
        assert!(buffers.is_empty());
    }
}
