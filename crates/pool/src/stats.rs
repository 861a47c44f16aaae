//! Run statistics.

use serde::Serialize;
use std::fmt;

/// Counters of one rank, or of a whole run once accumulated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Events produced by the generators.
    pub generated: u64,
    /// Generated events sent to the generating cell group.
    pub local: u64,
    /// Generated events sent to another cell group.
    pub inter_thread: u64,
    /// Generated events sent as spikes.
    pub spikes_sent: u64,
    /// Events inserted into queues.
    pub enqueued: u64,
    /// Events delivered from queues.
    pub delivered: u64,
    /// Events deposited into mailboxes by other cell groups.
    pub inter_received: u64,
    /// Spikes received by exchanges.
    pub spikes_received: u64,
    /// Received spikes addressed to one of this rank's inputs.
    pub spikes_relevant: u64,
    /// Events re-injected from relevant spikes (one per netcon).
    pub spike_deliveries: u64,
    /// Exchange windows completed.
    pub windows: u64,
}

impl PoolStats {
    /// Sum per-rank statistics into run totals.
    ///
    /// `windows` is collective, so it is taken as the maximum rather than summed.
    pub fn accumulate(stats: &[PoolStats]) -> PoolStats {
        stats.iter().fold(PoolStats::default(), |acc, s| PoolStats {
            generated: acc.generated + s.generated,
            local: acc.local + s.local,
            inter_thread: acc.inter_thread + s.inter_thread,
            spikes_sent: acc.spikes_sent + s.spikes_sent,
            enqueued: acc.enqueued + s.enqueued,
            delivered: acc.delivered + s.delivered,
            inter_received: acc.inter_received + s.inter_received,
            spikes_received: acc.spikes_received + s.spikes_received,
            spikes_relevant: acc.spikes_relevant + s.spikes_relevant,
            spike_deliveries: acc.spike_deliveries + s.spike_deliveries,
            windows: acc.windows.max(s.windows),
        })
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Generated events:        {}", self.generated)?;
        writeln!(f, "  local:                 {}", self.local)?;
        writeln!(f, "  inter-thread:          {}", self.inter_thread)?;
        writeln!(f, "  spikes:                {}", self.spikes_sent)?;
        writeln!(f, "Total enqueued:          {}", self.enqueued)?;
        writeln!(f, "Total delivered:         {}", self.delivered)?;
        writeln!(f, "Inter-thread received:   {}", self.inter_received)?;
        writeln!(f, "Spikes received:         {}", self.spikes_received)?;
        writeln!(f, "Relevant spikes:         {}", self.spikes_relevant)?;
        writeln!(f, "Spike deliveries:        {}", self.spike_deliveries)?;
        write!(f, "Exchange windows:        {}", self.windows)
    }
}
