//! The chain actor: the single writer for all chain state.
//!
//! Every mutation — block addition, peak override, state replacement —
//! arrives as a [`ChainCommand`] in the actor's mailbox and is applied in
//! dispatch order. Synchronous callers attach a oneshot reply and wait;
//! fire-and-forget submissions omit it. The mailbox guarantees FIFO per
//! sender, and since only the actor task touches [`ChainState`], mutations
//! are totally ordered.

use crate::{
    fork_choice::{classify, refetch_canonical},
    manager::prefetch,
    BlockIndex, ChainCells, ChainConfig, ChainError, ChainEvent, ChainState, ChainStore,
    EventBus, ForkOutcome, Outbound,
};
use lode_protocol::{Block, BlockState, Transaction};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::{interval, timeout, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

/// The tri-state result of a block submission.
#[derive(Debug)]
pub enum AddOutcome {
    /// The block is, or already was, part of the main chain.
    Added,
    /// The block was stored on an alt branch; the peak is unchanged.
    Stored,
    /// The block failed the actor preconditions and was never enqueued.
    Rejected(ChainError),
}

impl AddOutcome {
    /// Whether the submission ended on the main chain.
    pub const fn is_added(&self) -> bool {
        matches!(self, Self::Added)
    }

    /// Whether the block was parked on an alt branch.
    pub const fn is_stored(&self) -> bool {
        matches!(self, Self::Stored)
    }
}

/// Commands accepted by the [`ChainActor`] mailbox.
#[derive(Debug)]
pub enum ChainCommand {
    /// Submit a candidate block. Without a reply sender this is
    /// fire-and-forget and failures are only logged.
    AddBlock {
        /// The verified candidate.
        block: Block,
        /// Whether to relay the block to peers on adoption.
        relay: bool,
        /// Reply handle for synchronous submission.
        reply: Option<oneshot::Sender<Result<AddOutcome, ChainError>>>,
    },
    /// Force the peak to the given block and refetch the index.
    SetPeak {
        /// The new peak.
        block: Block,
        /// Completion signal.
        reply: oneshot::Sender<Result<(), ChainError>>,
    },
    /// Read the current peak through the mailbox.
    Peak {
        /// Reply handle.
        reply: oneshot::Sender<Arc<Block>>,
    },
    /// Read the last finalized block, derived from the current peak.
    FinalBlock {
        /// Reply handle.
        reply: oneshot::Sender<Result<Option<Arc<Block>>, ChainError>>,
    },
    /// Read the executed state attached to the peak.
    PeakState {
        /// Reply handle.
        reply: oneshot::Sender<Option<BlockState>>,
    },
    /// A fence: replied to once every earlier command has been applied.
    Fence {
        /// Reply handle.
        reply: oneshot::Sender<()>,
    },
    /// Replace the entire chain state and rewrite the store to match.
    SetState {
        /// The new peak.
        peak: Block,
        /// Every block of the new chain, ascending.
        blocks: Vec<Block>,
        /// Completion signal, sent only after the store is consistent.
        reply: oneshot::Sender<Result<(), ChainError>>,
    },
    /// Reset to the seeded genesis chain.
    ResetState {
        /// Completion signal.
        reply: oneshot::Sender<Result<(), ChainError>>,
    },
}

/// The single-writer chain actor. See the module docs.
#[derive(Debug)]
pub struct ChainActor {
    state: ChainState,
    store: Arc<dyn ChainStore>,
    index: Arc<BlockIndex>,
    cells: Arc<ChainCells>,
    events: EventBus,
    outbound: Outbound,
    config: Arc<ChainConfig>,
    /// Genesis parent stub and genesis block, kept for state resets.
    genesis: (Block, Block),
    peak_tx: watch::Sender<Arc<Block>>,
    mailbox: mpsc::Receiver<ChainCommand>,
    cancellation: CancellationToken,
    /// Epoch awaiting a debounced ticket notification.
    ticket_pending: Option<u64>,
    last_ticket: Option<Instant>,
}

impl ChainActor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        state: ChainState,
        store: Arc<dyn ChainStore>,
        index: Arc<BlockIndex>,
        cells: Arc<ChainCells>,
        events: EventBus,
        outbound: Outbound,
        config: Arc<ChainConfig>,
        genesis: (Block, Block),
        peak_tx: watch::Sender<Arc<Block>>,
        mailbox: mpsc::Receiver<ChainCommand>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            state,
            store,
            index,
            cells,
            events,
            outbound,
            config,
            genesis,
            peak_tx,
            mailbox,
            cancellation,
            ticket_pending: None,
            last_ticket: None,
        }
    }

    /// Drains the mailbox until cancellation or until every handle is gone.
    pub async fn start(mut self) -> Result<(), ChainError> {
        info!(
            target: "chain",
            peak = %self.state.peak().hash(),
            number = self.state.peak().number(),
            "Starting chain actor"
        );

        let cancel = self.cancellation.clone();
        let mut ticket_tick = interval(self.config.ticket_debounce);
        ticket_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(target: "chain", "Received shutdown signal. Exiting chain actor task.");
                    return Ok(());
                }
                _ = ticket_tick.tick(), if self.ticket_pending.is_some() => {
                    self.flush_ticket();
                }
                cmd = self.mailbox.recv() => {
                    let Some(cmd) = cmd else {
                        info!(target: "chain", "All chain handles dropped. Exiting actor task.");
                        return Ok(());
                    };
                    self.dispatch(cmd);
                }
            }
        }
    }

    fn dispatch(&mut self, cmd: ChainCommand) {
        match cmd {
            ChainCommand::AddBlock { block, relay, reply } => {
                let result = self.handle_add_block(block, relay);
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(err) = result {
                            error!(target: "chain", %err, "Async block submission failed");
                        }
                    }
                }
            }
            ChainCommand::SetPeak { block, reply } => {
                let _ = reply.send(self.handle_set_peak(block));
            }
            ChainCommand::Peak { reply } => {
                let _ = reply.send(self.state.peak());
            }
            ChainCommand::FinalBlock { reply } => {
                let _ = reply.send(self.handle_final_block());
            }
            ChainCommand::PeakState { reply } => {
                let _ = reply.send(self.state.peak().state().cloned());
            }
            ChainCommand::Fence { reply } => {
                let _ = reply.send(());
            }
            ChainCommand::SetState { peak, blocks, reply } => {
                let _ = reply.send(self.handle_set_state(peak, blocks));
            }
            ChainCommand::ResetState { reply } => {
                let (parent, genesis) = self.genesis.clone();
                let _ = reply.send(self.handle_set_state(genesis.clone(), vec![parent, genesis]));
            }
        }
    }

    fn handle_add_block(&mut self, block: Block, relay: bool) -> Result<AddOutcome, ChainError> {
        let block = Arc::new(block);
        let peak = self.state.peak();

        match classify(&self.index, &peak, &block) {
            ForkOutcome::Duplicate => {
                debug!(target: "chain", hash = %block.hash(), "Duplicate block, nothing to do");
                Ok(AddOutcome::Added)
            }
            ForkOutcome::AltExtension => {
                self.store.put_new_block(&block)?;
                self.index.note_known(block.hash());
                debug!(
                    target: "chain",
                    hash = %block.hash(),
                    number = block.number(),
                    peak_td = %peak.total_difficulty(),
                    block_td = %block.total_difficulty(),
                    "Stored alt block"
                );
                Ok(AddOutcome::Stored)
            }
            ForkOutcome::MainExtension => {
                self.store.put_block(&block)?;
                self.index.put_full(Arc::clone(&block));
                self.index.put_number(block.number(), block.hash());
                if block.number() >= self.config.window {
                    self.index.evict_number(block.number() - self.config.window);
                }
                self.adopt(block, relay);
                Ok(AddOutcome::Added)
            }
            ForkOutcome::Reorg => {
                info!(
                    target: "chain",
                    hash = %block.hash(),
                    number = block.number(),
                    old_peak = %peak.hash(),
                    "Reorganizing onto a heavier branch"
                );
                self.store.put_peak(&block)?;
                refetch_canonical(
                    &self.index,
                    self.store.as_ref(),
                    Arc::clone(&block),
                    self.config.window,
                )?;
                #[cfg(feature = "metrics")]
                metrics::counter!(crate::metrics::CHAIN_REORG_COUNT).increment(1);
                self.adopt(block, relay);
                Ok(AddOutcome::Added)
            }
        }
    }

    fn handle_set_peak(&mut self, block: Block) -> Result<(), ChainError> {
        let block = Arc::new(block);
        self.store.put_peak(&block)?;
        refetch_canonical(
            &self.index,
            self.store.as_ref(),
            Arc::clone(&block),
            self.config.window,
        )?;
        self.adopt(block, false);
        Ok(())
    }

    fn handle_final_block(&self) -> Result<Option<Arc<Block>>, ChainError> {
        let peak = self.state.peak();
        let number = peak.number().saturating_sub(self.config.finality_depth);
        Ok(self.store.block(number)?.map(Arc::new))
    }

    /// Rewrites the store and every in-memory structure to the given chain.
    ///
    /// Replies only after the store is consistent again, so callers may rely
    /// on completion ordering.
    fn handle_set_state(&mut self, peak: Block, blocks: Vec<Block>) -> Result<(), ChainError> {
        self.store.truncate_blocks()?;
        for block in &blocks {
            self.store.put_new_block(block)?;
        }
        // Installing the peak rewrites its ancestry to main-chain status;
        // blocks off that branch stay alt.
        self.store.put_peak(&peak)?;

        self.index.clear_all();
        prefetch(&self.index, self.store.as_ref(), self.config.window)?;
        self.adopt(Arc::new(peak), false);
        Ok(())
    }

    /// Installs `block` as the peak and performs the adoption side effects.
    fn adopt(&mut self, block: Arc<Block>, relay: bool) {
        let epoch = block.epoch(self.config.epoch_length);
        self.state.set_peak(Arc::clone(&block));
        self.cells.publish(epoch, block.number());
        self.peak_tx.send_replace(Arc::clone(&block));

        let tx_hashes: Vec<_> = block.transactions().iter().map(Transaction::hash).collect();
        if !tx_hashes.is_empty() {
            self.outbound.mempool.remove_transactions(&tx_hashes);
        }

        self.events.publish(ChainEvent::PeakUpdated(Arc::clone(&block)));
        self.schedule_ticket(epoch);

        if relay {
            let payload = block.export();
            if block.miner() == self.config.miner {
                self.outbound.relay.broadcast(payload);
            } else {
                self.outbound.relay.relay(payload);
            }
        }
        self.outbound.miner.update();

        #[cfg(feature = "metrics")]
        metrics::gauge!(crate::metrics::CHAIN_PEAK_HEIGHT).set(block.number() as f64);

        info!(
            target: "chain",
            hash = %block.hash(),
            number = block.number(),
            td = %block.total_difficulty(),
            "New peak adopted"
        );
    }

    /// Notifies the ticket subsystem at most once per debounce interval.
    fn schedule_ticket(&mut self, epoch: u64) {
        let due = self
            .last_ticket
            .is_none_or(|last| last.elapsed() >= self.config.ticket_debounce);
        if due {
            self.last_ticket = Some(Instant::now());
            self.ticket_pending = None;
            self.outbound.tickets.peak_changed(epoch);
        } else {
            self.ticket_pending = Some(epoch);
        }
    }

    fn flush_ticket(&mut self) {
        if let Some(epoch) = self.ticket_pending.take() {
            self.last_ticket = Some(Instant::now());
            self.outbound.tickets.peak_changed(epoch);
        }
    }
}

/// Client handle to the [`ChainActor`].
///
/// Cheap to clone. Deduplication and precondition checks run on the caller's
/// task, outside the mailbox, so obviously-redundant or malformed
/// submissions never occupy the actor.
#[derive(Debug, Clone)]
pub struct ChainHandle {
    tx: mpsc::Sender<ChainCommand>,
    index: Arc<BlockIndex>,
    cells: Arc<ChainCells>,
    config: Arc<ChainConfig>,
}

impl ChainHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<ChainCommand>,
        index: Arc<BlockIndex>,
        cells: Arc<ChainCells>,
        config: Arc<ChainConfig>,
    ) -> Self {
        Self { tx, index, cells, config }
    }

    /// Submits a block and waits for the fork-choice outcome.
    ///
    /// Bounded by the configured call timeout.
    pub async fn add_block(&self, block: Block, relay: bool) -> Result<AddOutcome, ChainError> {
        if let Err(err) = precheck(&block) {
            warn!(target: "chain", %err, "Rejecting block before enqueue");
            return Ok(AddOutcome::Rejected(err));
        }
        if self.index.full_block(&block.hash()).is_some() {
            return Ok(AddOutcome::Added);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ChainCommand::AddBlock { block, relay, reply: Some(reply_tx) }).await?;
        self.await_reply(reply_rx).await?
    }

    /// Submits a block without waiting for the outcome.
    ///
    /// Precondition failures are still reported; everything after enqueueing
    /// is logged by the actor and discarded.
    pub async fn add_block_async(&self, block: Block, relay: bool) -> Result<(), ChainError> {
        if let Err(err) = precheck(&block) {
            warn!(target: "chain", %err, "Rejecting block before enqueue");
            return Err(err);
        }
        if self.index.full_block(&block.hash()).is_some() {
            return Ok(());
        }
        self.send(ChainCommand::AddBlock { block, relay, reply: None }).await
    }

    /// Forces the peak. Administrative; waits without bound.
    pub async fn set_peak(&self, block: Block) -> Result<(), ChainError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ChainCommand::SetPeak { block, reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| ChainError::ChannelClosed)?
    }

    /// Reads the peak through the mailbox, ordered after earlier mutations.
    pub async fn peak_block(&self) -> Result<Arc<Block>, ChainError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ChainCommand::Peak { reply: reply_tx }).await?;
        self.await_reply(reply_rx).await
    }

    /// Reads the last finalized block, derived from the current peak.
    pub async fn final_block(&self) -> Result<Option<Arc<Block>>, ChainError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ChainCommand::FinalBlock { reply: reply_tx }).await?;
        self.await_reply(reply_rx).await?
    }

    /// Reads the executed state attached to the peak.
    pub async fn peak_state(&self) -> Result<Option<BlockState>, ChainError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ChainCommand::PeakState { reply: reply_tx }).await?;
        self.await_reply(reply_rx).await
    }

    /// Returns once the mailbox has drained up to this call.
    pub async fn sync(&self) -> Result<(), ChainError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ChainCommand::Fence { reply: reply_tx }).await?;
        self.await_reply(reply_rx).await
    }

    /// Replaces the chain with the given blocks and peak, rewriting the
    /// store. Intended for tests and recovery tooling; waits without bound.
    pub async fn set_state(&self, peak: Block, blocks: Vec<Block>) -> Result<(), ChainError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ChainCommand::SetState { peak, blocks, reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| ChainError::ChannelClosed)?
    }

    /// Resets to the seeded genesis chain. Intended for tests; waits without
    /// bound.
    pub async fn reset_state(&self) -> Result<(), ChainError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ChainCommand::ResetState { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| ChainError::ChannelClosed)?
    }

    /// Returns the peak epoch from the process-global cell, without touching
    /// the actor.
    pub fn peak_epoch(&self) -> u64 {
        self.cells.peak_epoch()
    }

    async fn send(&self, cmd: ChainCommand) -> Result<(), ChainError> {
        self.tx.send(cmd).await.map_err(|_| ChainError::ChannelClosed)
    }

    async fn await_reply<T>(&self, rx: oneshot::Receiver<T>) -> Result<T, ChainError> {
        match timeout(self.config.call_timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(ChainError::ChannelClosed),
            Err(_) => Err(ChainError::Timeout),
        }
    }
}

/// Validates the actor preconditions for a candidate block.
fn precheck(block: &Block) -> Result<(), ChainError> {
    if !block.has_state() {
        return Err(ChainError::MissingState(block.hash()));
    }
    if block.number() < 1 {
        return Err(ChainError::InvalidGenesis { hash: block.hash(), number: block.number() });
    }
    Ok(())
}
