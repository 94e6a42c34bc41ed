//! Fleet orchestration
//!
//! The [`FleetManager`] owns every [`Worker`], keeps one supervisor per
//! token that restarts closed workers, picks workers for join requests and
//! routes platform events.
//!
//! Selection always returns the highest-priority open worker passing a
//! predicate. Every membership notification lowers the priority of every
//! open worker by one ([`FleetManager::decay_all`]), so workers that have
//! watched busy channels lose out to fresh or quiet ones.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::Result;
use crate::command::{self, Command, CommandDedup};
use crate::config::Config;
use crate::shed::{ShedPolicy, watch_idle};
use crate::speech::{SpeechProvider, make_provider};
use crate::transport::{
    Announce, ChannelRef, CommandMessage, Connection, Connector, FleetEvent, MembershipChange,
};
use crate::worker::Worker;

/// Capacity of the shared event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Reply when a worker joins on request
pub const JOIN_REPLY: &str = "Hello!";

/// Reply when every worker is busy
pub const NO_CAPACITY_REPLY: &str = "No available bots.";

/// Result of a join request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A worker was already in the channel
    AlreadyConnected(String),
    /// An idle worker joined the channel
    Joined(String),
    /// The chosen worker could not connect
    JoinFailed(String),
    /// Every worker is busy (or none is running)
    NoCapacity,
    /// The requester is not in a voice channel
    NotInVoice,
}

/// Owns the fleet of workers
pub struct FleetManager {
    workers: RwLock<HashMap<String, Arc<Worker>>>,
    running: AtomicBool,
    speech: RwLock<Arc<dyn SpeechProvider>>,
    config: Mutex<Config>,
    // Held across the check and the insert so only one delivery wins
    dedup: Mutex<CommandDedup>,
}

impl FleetManager {
    /// Create an empty, running fleet
    #[must_use]
    pub fn new(config: Config, speech: Arc<dyn SpeechProvider>) -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
            running: AtomicBool::new(true),
            speech: RwLock::new(speech),
            config: Mutex::new(config),
            dedup: Mutex::new(CommandDedup::default()),
        }
    }

    /// Whether the fleet still restarts and watches workers
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Snapshot of the configuration
    #[must_use]
    pub fn config(&self) -> Config {
        self.config_guard().clone()
    }

    fn config_guard(&self) -> MutexGuard<'_, Config> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Speech provider handed to new workers
    #[must_use]
    pub fn speech(&self) -> Arc<dyn SpeechProvider> {
        Arc::clone(&self.speech.read().unwrap_or_else(PoisonError::into_inner))
    }

    // --- fleet map ---

    /// Register a worker for an open connection, replacing any previous
    /// worker with the same id
    pub fn start_worker(&self, id: &str, connection: Arc<dyn Connection>) -> Arc<Worker> {
        let config = self.config();
        let worker = Arc::new(Worker::new(
            id,
            config.fleet.base_priority,
            connection,
            self.speech(),
            config.timing,
        ));
        self.insert(Arc::clone(&worker));
        worker
    }

    /// Add `worker` to the fleet
    pub fn insert(&self, worker: Arc<Worker>) {
        let id = worker.id().to_string();
        tracing::debug!(worker = %id, priority = worker.priority(), "worker registered");
        self.workers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, worker);
    }

    /// Remove `worker` if it is still the fleet's entry for its id
    pub fn remove(&self, worker: &Arc<Worker>) -> bool {
        let mut workers = self.workers.write().unwrap_or_else(PoisonError::into_inner);
        let current = workers.get(worker.id()).is_some_and(|w| Arc::ptr_eq(w, worker));
        if current {
            workers.remove(worker.id());
        }
        current
    }

    /// Look up a worker by id
    #[must_use]
    pub fn worker(&self, id: &str) -> Option<Arc<Worker>> {
        self.workers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Every registered worker, open or not
    #[must_use]
    pub fn workers(&self) -> Vec<Arc<Worker>> {
        self.workers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Number of registered workers
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no workers are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // --- selection ---

    /// Highest-priority open worker passing `predicate`
    ///
    /// Ties go to the first worker found.
    pub fn select(&self, predicate: impl Fn(&Worker) -> bool) -> Option<Arc<Worker>> {
        let workers = self.workers.read().unwrap_or_else(PoisonError::into_inner);
        let mut best: Option<&Arc<Worker>> = None;

        for worker in workers.values() {
            if worker.is_closed() || !predicate(&**worker) {
                continue;
            }
            if best.is_none_or(|b| worker.priority() > b.priority()) {
                best = Some(worker);
            }
        }

        best.cloned()
    }

    /// Worker already in `channel`
    #[must_use]
    pub fn get_already_connected(&self, channel: ChannelRef) -> Option<Arc<Worker>> {
        self.select(|w| w.is_connected_to(channel))
    }

    /// Worker with no human audience
    #[must_use]
    pub fn get_idling(&self) -> Option<Arc<Worker>> {
        self.select(|w| !w.check_is_active())
    }

    /// Any open worker
    #[must_use]
    pub fn get_any(&self) -> Option<Arc<Worker>> {
        self.select(|_| true)
    }

    /// Lower every open worker's priority by one
    pub fn decay_all(&self) {
        let workers = self.workers.read().unwrap_or_else(PoisonError::into_inner);
        for worker in workers.values().filter(|w| !w.is_closed()) {
            worker.decay_priority();
        }
    }

    // --- events ---

    /// Handle a membership change seen by `worker_id`
    ///
    /// Decays every worker's priority, then lets the receiving worker queue
    /// an announcement if the change concerns its channel.
    pub fn handle_membership(&self, worker_id: &str, change: &MembershipChange) -> Option<Announce> {
        tracing::debug!(
            worker = worker_id,
            member = change.member_id,
            before = ?change.before,
            after = ?change.after,
            "voice state update"
        );

        self.decay_all();
        self.worker(worker_id)?.handle_membership(change)
    }

    /// Handle a text message seen by any worker
    ///
    /// # Errors
    ///
    /// Returns error if a reply cannot be delivered
    pub async fn handle_command(&self, message: &CommandMessage) -> Result<()> {
        let (prefix, is_admin) = {
            let config = self.config_guard();
            (config.command_prefix.clone(), config.is_admin(message.author_id))
        };

        let Some(command) = command::parse(&prefix, &message.content) else {
            return Ok(());
        };

        let duplicate = self
            .dedup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_duplicate(message.message_id);
        if duplicate {
            return Ok(());
        }

        if command.requires_admin() && !is_admin {
            tracing::info!(author = message.author_id, ?command, "ignoring admin command from non-admin");
            return Ok(());
        }

        tracing::info!(author = message.author_id, ?command, "command");
        match command {
            Command::Join => {
                self.cmd_join(message).await?;
            }
            Command::Voice(name) => self.cmd_set_voice(&name, message).await,
            Command::Shutdown => self.shutdown().await,
        }

        Ok(())
    }

    /// Bring a worker into the requester's voice channel
    ///
    /// Prefers a worker already there, then an idling one; if every worker
    /// is busy, tells the requester instead of double-booking.
    ///
    /// # Errors
    ///
    /// Returns error if the reply's text channel is invalid
    pub async fn cmd_join(&self, message: &CommandMessage) -> Result<JoinOutcome> {
        let Some(channel) = message.author_voice else {
            tracing::debug!(author = message.author_id, "join requested outside a voice channel");
            return Ok(JoinOutcome::NotInVoice);
        };

        if let Some(worker) = self.get_already_connected(channel) {
            tracing::debug!(worker = worker.id(), channel = %channel, "already connected");
            return Ok(JoinOutcome::AlreadyConnected(worker.id().to_string()));
        }

        if let Some(worker) = self.get_idling() {
            let id = worker.id().to_string();
            if !worker.external_join_channel(channel).await {
                return Ok(JoinOutcome::JoinFailed(id));
            }
            worker.external_announce_self(channel).await;
            worker
                .external_send_message(message.text_channel_id, JOIN_REPLY)
                .await?;
            return Ok(JoinOutcome::Joined(id));
        }

        match self.get_any() {
            Some(worker) => {
                worker
                    .external_send_message(message.text_channel_id, NO_CAPACITY_REPLY)
                    .await?;
            }
            None => tracing::warn!(channel = %channel, "join requested but no workers are running"),
        }

        Ok(JoinOutcome::NoCapacity)
    }

    /// Switch every worker to the provider named `name` and persist it
    pub async fn cmd_set_voice(&self, name: &str, message: &CommandMessage) {
        let mut config = self.config();
        let speech = make_provider(name, &config.speech);

        config.voice = name.to_string();
        if let Err(e) = config.save() {
            tracing::warn!(error = %e, "failed to persist voice selection");
        }
        *self.config_guard() = config;
        *self.speech.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&speech);

        let workers = self.workers();
        for worker in &workers {
            worker.set_speech(Arc::clone(&speech));
        }

        // After every worker has the new voice
        if let Some(channel) = message.author_voice {
            for worker in &workers {
                worker.external_announce_self(channel).await;
            }
        }
    }

    /// Stop restarting workers and close every worker
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        tracing::info!("shutting down fleet");

        for worker in self.workers() {
            worker.close().await;
        }
    }

    /// Route one event
    ///
    /// Membership changes are applied inline so a worker sees them in
    /// order; commands run on their own task.
    pub fn dispatch(self: &Arc<Self>, event: FleetEvent) {
        match event {
            FleetEvent::Membership { worker, change } => {
                self.handle_membership(&worker, &change);
            }
            FleetEvent::Command { worker, message } => {
                let fleet = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(e) = fleet.handle_command(&message).await {
                        tracing::warn!(worker = %worker, error = %e, "command failed");
                    }
                });
            }
        }
    }

    // --- supervision ---

    /// Run one supervised worker per configured token until shutdown
    ///
    /// # Errors
    ///
    /// Returns error if no tokens are configured
    pub async fn run(self: &Arc<Self>, connector: Arc<dyn Connector>) -> Result<()> {
        let config = self.config();
        config.validate()?;

        let (events_tx, mut events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut supervisors = JoinSet::new();

        for (index, token) in config.tokens.into_iter().enumerate() {
            let fleet = Arc::clone(self);
            let connector = Arc::clone(&connector);
            let events = events_tx.clone();
            let id = format!("worker-{index}");
            supervisors.spawn(async move { fleet.supervise(id, token, connector, events).await });
        }
        drop(events_tx);

        tracing::info!(workers = supervisors.len(), "fleet running");

        loop {
            tokio::select! {
                event = events_rx.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
                joined = supervisors.join_next() => match joined {
                    Some(Ok(())) => {}
                    Some(Err(e)) => tracing::error!(error = %e, "worker supervisor failed"),
                    None => break,
                },
            }
        }

        tracing::info!("fleet stopped");
        Ok(())
    }

    /// Keep a worker alive for `token` while the fleet runs
    async fn supervise(
        self: Arc<Self>,
        id: String,
        token: String,
        connector: Arc<dyn Connector>,
        events: mpsc::Sender<FleetEvent>,
    ) {
        while self.is_running() {
            tracing::info!(worker = %id, "starting worker");

            match connector.open(&id, &token, events.clone()).await {
                Ok(connection) => {
                    let worker = self.start_worker(&id, connection);
                    self.serve(&worker).await;
                    self.remove(&worker);
                }
                Err(e) => tracing::warn!(worker = %id, error = %e, "failed to start worker"),
            }

            if self.is_running() {
                let delay = self.config_guard().timing.restart_delay;
                tokio::time::sleep(delay).await;
            }
        }

        tracing::debug!(worker = %id, "supervisor stopped");
    }

    /// Run the idle watchdog until the worker closes or is shed
    async fn serve(&self, worker: &Arc<Worker>) {
        let policy = {
            let config = self.config_guard();
            ShedPolicy::new(config.timing.watchdog_interval, config.fleet.shed_range)
        };

        tokio::select! {
            () = worker.connection().closed() => {
                tracing::info!(worker = %worker.id(), "connection closed");
            }
            _ = watch_idle(Arc::clone(worker), policy, || self.is_running()) => {}
        }

        worker.close().await;
    }
}

