//! The time-stepped cell-group pool.

use crate::update::Cable;
use crate::{ConfigError, PoolConfig, PoolError, PoolStats, RuntimeContext};
use eventpass_environment::{Connectivity, EventClassifier, EventSource, EventStream};
use eventpass_queueing::{Inbox, ThreadContext};
use eventpass_spike::{
    CommunicationGraph, Communicator, ExchangeMode, ExchangeProtocol, ProtocolKind,
    ReceivedSpikes, SpikeBuffers, SpikeExchange,
};
use eventpass_types::{EventKind, Gid, Rank, SpikeItem};
use hdrhistogram::Histogram;
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace};

/// Where the pool is within a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPhase {
    /// Between windows.
    Idle,
    Generate,
    LocalDeliver,
    Update,
    Exchange,
    Filter,
    /// Every step has run.
    Finished,
}

impl fmt::Display for PoolPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoolPhase::Idle => "idle",
            PoolPhase::Generate => "generate",
            PoolPhase::LocalDeliver => "local-deliver",
            PoolPhase::Update => "update",
            PoolPhase::Exchange => "exchange",
            PoolPhase::Filter => "filter",
            PoolPhase::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Everything one cell group owns.
struct Worker {
    ctx: ThreadContext,
    stream: EventStream,
    cable: Cable,
    /// Spikes of the current step, flushed to the shared buffer in one go.
    outgoing: Vec<SpikeItem>,
    generated: u64,
    local: u64,
    inter_thread: u64,
    spikes: u64,
}

impl Worker {
    fn generate(&mut self, now: u64, min_delay: f64, spikeout: &SpikeBuffers) {
        while let Some(event) = self.stream.next_event(now) {
            self.generated += 1;
            match event.kind {
                EventKind::Local => {
                    self.local += 1;
                    self.ctx.self_send(event.target, event.time);
                }
                EventKind::InterThread => {
                    self.inter_thread += 1;
                    self.ctx.inter_send(event.target, event.time + min_delay);
                }
                EventKind::Spike => {
                    self.spikes += 1;
                    self.outgoing
                        .push(SpikeItem::new(Gid(event.target), event.time + min_delay));
                }
            }
        }
        if !self.outgoing.is_empty() {
            spikeout.extend(self.outgoing.drain(..));
        }
    }

    fn deliver(&mut self, now: u64) {
        self.ctx.enqueue_pending();
        let delivered = self.ctx.deliver_all(now as f64);
        trace!(cell_group = self.ctx.id().0, now, delivered, "Delivered");
    }
}

/// One rank's pool of cell groups.
///
/// Each step runs generation and local delivery in parallel across cell
/// groups. Every `min_delay` steps the rank exchanges the spikes of the
/// window with the other ranks and files relevant ones into the queues of
/// the cell groups they connect to.
pub struct Pool<C: Communicator> {
    ctx: RuntimeContext<C>,
    config: PoolConfig,
    connectivity: Connectivity,
    exchange: SpikeExchange,
    workers: Vec<Worker>,
    spikeout: SpikeBuffers,
    threads: rayon::ThreadPool,
    exchange_latency: Histogram<u64>,
    time: u64,
    phase: PoolPhase,
    windows: u64,
    spikes_received: u64,
    spikes_relevant: u64,
    spike_deliveries: u64,
}

impl<C: Communicator> Pool<C> {
    /// Build this rank's pool.
    ///
    /// Collective: with the neighbor protocol every rank takes part in
    /// graph discovery here.
    pub fn new(mut ctx: RuntimeContext<C>, config: PoolConfig) -> Result<Self, PoolError> {
        let rank = ctx.rank();
        config.validate(ctx.size())?;

        let connectivity = config
            .connectivity()
            .build(ctx.size(), config.cell_groups, rank)
            .map_err(ConfigError::from)?;

        let protocol = match config.protocol {
            ProtocolKind::Global => ExchangeProtocol::Global,
            ProtocolKind::Neighbor => ExchangeProtocol::Neighbor(CommunicationGraph::discover(
                ctx.comm_mut(),
                &connectivity,
            )?),
        };

        let outputs: Arc<[Gid]> = connectivity.output_ids().iter().copied().collect();
        let classifier = EventClassifier::new(
            config.percent_spike,
            config.percent_ite,
            config.cell_groups,
            outputs,
        )
        .map_err(ConfigError::from)?;
        let streams = EventSource::new(config.event_generator(), classifier, config.seed, rank.0)
            .map_err(ConfigError::from)?
            .into_streams();

        let inboxes: Arc<[Inbox]> = (0..config.cell_groups)
            .map(|_| Inbox::new(config.mailbox))
            .collect();
        let workers = ThreadContext::for_arena(&inboxes)
            .into_iter()
            .zip(streams)
            .map(|(ctx, stream)| Worker {
                cable: Cable::new(ctx.id().0),
                ctx,
                stream,
                outgoing: Vec::new(),
                generated: 0,
                local: 0,
                inter_thread: 0,
                spikes: 0,
            })
            .collect();

        let threads = rayon::ThreadPoolBuilder::new()
            .num_threads(config.cell_groups as usize)
            .thread_name(move |i| format!("rank{}-group-{}", rank.0, i))
            .build()
            .map_err(|e| PoolError::ThreadPool(e.to_string()))?;

        let exchange_latency =
            Histogram::<u64>::new(3).map_err(|e| PoolError::Histogram(format!("{e:?}")))?;

        info!(
            rank = rank.0,
            ranks = ctx.size(),
            cell_groups = config.cell_groups,
            simtime = config.simtime,
            min_delay = config.min_delay,
            protocol = %config.protocol,
            mode = %config.mode,
            mailbox = %config.mailbox,
            generator = %config.generator,
            "Pool ready"
        );

        Ok(Self {
            ctx,
            exchange: SpikeExchange::new(protocol),
            config,
            connectivity,
            workers,
            spikeout: SpikeBuffers::new(),
            threads,
            exchange_latency,
            time: 0,
            phase: PoolPhase::Idle,
            windows: 0,
            spikes_received: 0,
            spikes_relevant: 0,
            spike_deliveries: 0,
        })
    }

    pub fn rank(&self) -> Rank {
        self.ctx.rank()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn protocol(&self) -> &ExchangeProtocol {
        self.exchange.protocol()
    }

    /// Next step to run.
    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn phase(&self) -> PoolPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.time > self.config.simtime
    }

    /// Wall-clock time of each exchange, in microseconds.
    pub fn exchange_latency(&self) -> &Histogram<u64> {
        &self.exchange_latency
    }

    /// Run every remaining window.
    pub fn run(&mut self) -> Result<PoolStats, PoolError> {
        let started = Instant::now();
        while !self.is_finished() {
            self.fixed_step()?;
        }
        let stats = self.stats();
        info!(
            rank = self.rank().0,
            windows = stats.windows,
            generated = stats.generated,
            delivered = stats.delivered,
            spikes_sent = stats.spikes_sent,
            spikes_relevant = stats.spikes_relevant,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pool finished"
        );
        Ok(stats)
    }

    /// Run one exchange window: up to `min_delay` steps, then the exchange
    /// and the filtering of received spikes.
    pub fn fixed_step(&mut self) -> Result<(), PoolError> {
        if self.is_finished() {
            return Ok(());
        }

        let end = (self.time + self.config.min_delay).min(self.config.simtime + 1);
        let overlap = self.config.update_phase && self.config.mode == ExchangeMode::NonBlocking;

        while self.time < end {
            let now = self.time;
            self.set_phase(PoolPhase::Generate);
            self.generate(now);
            self.set_phase(PoolPhase::LocalDeliver);
            self.deliver(now);
            // The window's last update is held back to overlap the exchange.
            if self.config.update_phase && !(overlap && now + 1 == end) {
                self.set_phase(PoolPhase::Update);
                self.update();
            }
            self.time += 1;
        }

        self.set_phase(PoolPhase::Exchange);
        let started = Instant::now();
        let out = self.spikeout.take();
        let received = match self.config.mode {
            ExchangeMode::Blocking => self.exchange.exchange(self.ctx.comm_mut(), &out)?,
            ExchangeMode::NonBlocking => {
                let mut handle = self.exchange.begin(self.ctx.comm_mut(), &out)?;
                if overlap {
                    self.update();
                }
                handle.progress(self.ctx.comm_mut())?;
                self.exchange.finish(self.ctx.comm_mut(), handle)?
            }
        };
        self.exchange_latency
            .saturating_record(started.elapsed().as_micros() as u64);

        self.set_phase(PoolPhase::Filter);
        let relevant = self.filter(&received);
        self.windows += 1;

        debug!(
            rank = self.rank().0,
            window = self.windows,
            time = self.time,
            sent = out.len(),
            received = received.len(),
            relevant,
            "Window complete"
        );

        self.set_phase(if self.is_finished() {
            PoolPhase::Finished
        } else {
            PoolPhase::Idle
        });
        Ok(())
    }

    /// Per-rank counters so far.
    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats {
            spikes_received: self.spikes_received,
            spikes_relevant: self.spikes_relevant,
            spike_deliveries: self.spike_deliveries,
            windows: self.windows,
            ..Default::default()
        };
        for worker in &self.workers {
            let counters = worker.ctx.counters();
            stats.generated += worker.generated;
            stats.local += worker.local;
            stats.inter_thread += worker.inter_thread;
            stats.spikes_sent += worker.spikes;
            stats.enqueued += counters.enqueued;
            stats.delivered += counters.delivered;
            stats.inter_received += counters.inter_received;
        }
        stats
    }

    /// Compute-kernel passes run per cell group.
    pub fn updates(&self) -> Vec<u64> {
        self.workers.iter().map(|w| w.cable.updates()).collect()
    }

    pub fn into_context(self) -> RuntimeContext<C> {
        self.ctx
    }

    fn set_phase(&mut self, phase: PoolPhase) {
        trace!(rank = self.ctx.rank().0, time = self.time, %phase, "Phase");
        self.phase = phase;
    }

    fn generate(&mut self, now: u64) {
        let min_delay = self.config.min_delay as f64;
        let Self {
            threads,
            workers,
            spikeout,
            ..
        } = self;
        let spikeout = &*spikeout;
        threads.install(|| {
            workers
                .par_iter_mut()
                .for_each(|worker| worker.generate(now, min_delay, spikeout));
        });
    }

    fn deliver(&mut self, now: u64) {
        let Self {
            threads, workers, ..
        } = self;
        threads.install(|| {
            workers
                .par_iter_mut()
                .for_each(|worker| worker.deliver(now));
        });
    }

    fn update(&mut self) {
        let Self {
            threads, workers, ..
        } = self;
        threads.install(|| {
            workers
                .par_iter_mut()
                .for_each(|worker| worker.cable.update());
        });
    }

    /// Queue every received spike addressed to one of our inputs on each
    /// cell group it connects to. Returns how many spikes were relevant.
    fn filter(&mut self, received: &ReceivedSpikes) -> u64 {
        let mut relevant = 0;
        for spike in &received.spikes {
            let Some(targets) = self.connectivity.find_input(spike.dst) else {
                continue;
            };
            relevant += 1;
            for group in targets {
                self.workers[group.index()]
                    .ctx
                    .self_send(group.0, spike.time);
                self.spike_deliveries += 1;
            }
        }
        self.spikes_received += received.len() as u64;
        self.spikes_relevant += relevant;
        relevant
    }
}

impl<C: Communicator> fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("rank", &self.rank())
            .field("time", &self.time)
            .field("phase", &self.phase)
            .field("windows", &self.windows)
            .finish_non_exhaustive()
    }
}
