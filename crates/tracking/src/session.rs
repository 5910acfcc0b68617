//! Owns the live subscription of one device and the track built from it.
//!
//! A single consumption loop is the only writer of the [`TrackState`]. Each
//! connection attempt runs in its own pump task which decodes the transport's
//! messages and pushes them onto a bounded queue, tagged with the generation
//! of the attempt.
//! Closing a connection aborts its pump and bumps the generation, so events
//! still queued from an old connection are dropped instead of being applied.

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use model::{DeviceId, LocationSample, SessionState, TrackSnapshot, TrackState};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{self, Instant},
};

use crate::{
    cache::Cache,
    config::SessionConfig,
    decoder,
    locator::Locator,
    reducer::{Applied, Reducer},
    transport::{Transport, TransportError},
    TrackingError, TrackingResult,
};

#[derive(Debug)]
pub enum Command {
    SetDevice {
        device: Option<DeviceId>,
        responder: oneshot::Sender<()>,
    },
    Relocate {
        responder: oneshot::Sender<()>,
    },
    Close {
        responder: oneshot::Sender<()>,
    },
}

#[derive(Debug)]
enum PumpEvent {
    Opened,
    Sample(LocationSample),
    /// A message arrived but could not be decoded.
    Rejected,
    Failed(TransportError),
}

#[derive(Debug)]
struct Envelope {
    generation: u64,
    event: PumpEvent,
}

/// Cloneable access to a running tracker. The tracker stops once every
/// handle has been dropped.
#[derive(Clone)]
pub struct TrackerHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<TrackSnapshot>,
}

impl TrackerHandle {
    pub fn subscribe(&self) -> watch::Receiver<TrackSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Tracks `device` from now on. The previous session is closed first;
    /// `None` leaves the tracker idle.
    pub async fn set_device(&self, device: Option<DeviceId>) -> TrackingResult<()> {
        let (responder, response) = oneshot::channel();
        self.commands
            .send(Command::SetDevice { device, responder })
            .await?;
        Ok(response.await?)
    }

    /// Asks the locator for the current device again.
    pub async fn relocate(&self) -> TrackingResult<()> {
        let (responder, response) = oneshot::channel();
        self.commands.send(Command::Relocate { responder }).await?;
        Ok(response.await?)
    }

    /// Closes the live session. Closing an already closed session has no
    /// effect.
    pub async fn close(&self) -> TrackingResult<()> {
        let (responder, response) = oneshot::channel();
        self.commands.send(Command::Close { responder }).await?;
        Ok(response.await?)
    }
}

pub struct SessionManager {
    config: SessionConfig,
    reducer: Reducer,
    transport: Arc<dyn Transport>,
    cache: Arc<dyn Cache>,
    locator: Arc<dyn Locator>,
}

impl SessionManager {
    pub fn new<T, C, L>(
        config: SessionConfig,
        reducer: Reducer,
        transport: T,
        cache: C,
        locator: L,
    ) -> Self
    where
        T: Transport,
        C: Cache,
        L: Locator,
    {
        Self {
            config,
            reducer,
            transport: Arc::new(transport),
            cache: Arc::new(cache),
            locator: Arc::new(locator),
        }
    }

    /// Seeds the track from the cache and starts the consumption loop on the
    /// current tokio runtime.
    pub async fn start(self) -> TrackerHandle {
        let cached = match self.cache.load().await {
            Ok(cached) => cached,
            Err(why) => {
                log::error!("could not load route history: {}", why);
                vec![]
            }
        };
        let state = self.reducer.init(cached);

        let (command_tx, command_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(TrackSnapshot {
            device: None,
            session: SessionState::Idle,
            reconnects: 0,
            track: state.clone(),
        });

        let session_loop = SessionLoop {
            config: self.config,
            reducer: self.reducer,
            transport: self.transport,
            cache: self.cache,
            locator: self.locator,
            state,
            device: None,
            session: SessionState::Idle,
            generation: 0,
            pump: None,
            attempt: 0,
            reconnects: 0,
            retry_at: None,
            events: event_tx,
            snapshots: snapshot_tx,
        };
        tokio::spawn(session_loop.run(command_rx, event_rx));

        TrackerHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        }
    }
}

struct SessionLoop {
    config: SessionConfig,
    reducer: Reducer,
    transport: Arc<dyn Transport>,
    cache: Arc<dyn Cache>,
    locator: Arc<dyn Locator>,
    state: TrackState,
    device: Option<DeviceId>,
    session: SessionState,
    generation: u64,
    pump: Option<JoinHandle<()>>,
    attempt: u32,
    reconnects: u32,
    retry_at: Option<Instant>,
    events: mpsc::Sender<Envelope>,
    snapshots: watch::Sender<TrackSnapshot>,
}

impl SessionLoop {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::Receiver<Envelope>,
    ) {
        let device = self.locator.current_device_identifier();
        self.switch_device(device).await;

        loop {
            let retry_at = self.retry_at;
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(envelope) = events.recv() => self.handle_envelope(envelope).await,
                _ = time::sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    self.retry_at = None;
                    self.connect();
                }
            }
        }

        log::debug!("all tracker handles dropped, shutting down");
        self.close();
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetDevice { device, responder } => {
                self.switch_device(device).await;
                let _ = responder.send(());
            }
            Command::Relocate { responder } => {
                let device = self.locator.current_device_identifier();
                self.switch_device(device).await;
                let _ = responder.send(());
            }
            Command::Close { responder } => {
                self.close();
                let _ = responder.send(());
            }
        }
    }

    async fn handle_envelope(&mut self, envelope: Envelope) {
        if envelope.generation != self.generation {
            log::debug!(
                "dropping event of closed connection #{}",
                envelope.generation
            );
            return;
        }

        match envelope.event {
            PumpEvent::Opened => {
                if self.session == SessionState::Connecting {
                    self.set_session(SessionState::Streaming);
                    self.publish();
                }
            }
            PumpEvent::Sample(sample) => {
                self.mark_streaming();
                self.accept(sample).await;
            }
            PumpEvent::Rejected => self.mark_streaming(),
            PumpEvent::Failed(why) => self.schedule_retry(why),
        }
    }

    fn mark_streaming(&mut self) {
        self.attempt = 0;
        if self.session == SessionState::Connecting {
            self.set_session(SessionState::Streaming);
            self.publish();
        }
    }

    async fn accept(&mut self, sample: LocationSample) {
        let previous = std::mem::replace(&mut self.state, self.reducer.init(vec![]));
        match self.reducer.apply(previous, sample) {
            Applied::Appended(state) => {
                self.state = state;
                log::debug!(
                    "position {}, {} ({} samples)",
                    self.state.current().latitude(),
                    self.state.current().longitude(),
                    self.state.history().len()
                );
                self.publish();
                self.persist().await;
            }
            Applied::Discarded(state) => {
                self.state = state;
                log::debug!("discarded duplicate sample");
            }
        }
    }

    async fn persist(&self) {
        if let Err(why) = self.cache.save(self.state.history()).await {
            log::error!("could not persist route history: {}", why);
        }
    }

    async fn switch_device(&mut self, device: Option<DeviceId>) {
        let active = matches!(
            self.session,
            SessionState::Connecting | SessionState::Streaming | SessionState::Retrying
        );
        if active && device == self.device {
            return;
        }

        self.close_connection();
        if device != self.device && self.device.is_some() {
            // the trail belongs to the previous device
            self.state = self.reducer.init(vec![]);
            self.persist().await;
        }
        self.device = device;
        self.attempt = 0;

        if self.device.is_some() {
            self.connect();
        } else {
            self.set_session(SessionState::Idle);
            self.publish();
        }
    }

    fn connect(&mut self) {
        let Some(device) = self.device.clone() else {
            return;
        };
        self.close_connection();
        let url = self.config.endpoint.url_for(&device);
        log::info!("subscribing to {} (connection #{})", url, self.generation);

        self.pump = Some(tokio::spawn(pump(
            self.transport.clone(),
            url,
            self.config.connect_timeout,
            self.generation,
            self.events.clone(),
        )));
        self.set_session(SessionState::Connecting);
        self.publish();
    }

    fn schedule_retry(&mut self, why: TransportError) {
        log::warn!("stream of {:?} failed: {}", self.device, why);
        self.close_connection();

        let delay = self.config.backoff.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        self.reconnects = self.reconnects.saturating_add(1);
        self.retry_at = Some(Instant::now() + delay);
        log::info!("reconnecting in {:?}", delay);

        self.set_session(SessionState::Retrying);
        self.publish();
    }

    fn close(&mut self) {
        self.close_connection();
        if self.session != SessionState::Closed {
            self.set_session(SessionState::Closed);
            self.publish();
        }
    }

    /// Aborts the running pump, if any, and invalidates its queued events.
    fn close_connection(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.generation += 1;
        self.retry_at = None;
    }

    fn set_session(&mut self, session: SessionState) {
        if self.session != session {
            log::info!("session {} -> {}", self.session, session);
            self.session = session;
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(TrackSnapshot {
            device: self.device.clone(),
            session: self.session,
            reconnects: self.reconnects,
            track: self.state.clone(),
        });
    }
}

async fn pump(
    transport: Arc<dyn Transport>,
    url: String,
    connect_timeout: Option<Duration>,
    generation: u64,
    events: mpsc::Sender<Envelope>,
) {
    let opened = match connect_timeout {
        Some(limit) => time::timeout(limit, transport.open(&url))
            .await
            .unwrap_or(Err(TransportError::Timeout(limit))),
        None => transport.open(&url).await,
    };
    let mut stream = match opened {
        Ok(stream) => stream,
        Err(why) => {
            let _ = emit(&events, generation, PumpEvent::Failed(why)).await;
            return;
        }
    };
    if !emit(&events, generation, PumpEvent::Opened).await {
        return;
    }

    while let Some(item) = stream.next().await {
        let (event, failed) = match item {
            Ok(data) => match decoder::decode(&data) {
                Ok(sample) => (PumpEvent::Sample(sample), false),
                Err(why) => {
                    log::warn!("rejected message: {} (data: {})", why, data);
                    (PumpEvent::Rejected, false)
                }
            },
            Err(why) => (PumpEvent::Failed(why), true),
        };
        if !emit(&events, generation, event).await || failed {
            return;
        }
    }
    emit(&events, generation, PumpEvent::Failed(TransportError::Closed)).await;
}

/// Queues `event`, waiting while the queue is full. Returns `false` once the
/// consumption loop is gone.
async fn emit(events: &mpsc::Sender<Envelope>, generation: u64, event: PumpEvent) -> bool {
    events.send(Envelope { generation, event }).await.is_ok()
}

impl From<mpsc::error::SendError<Command>> for TrackingError {
    fn from(_: mpsc::error::SendError<Command>) -> Self {
        Self::SessionGone
    }
}

impl From<oneshot::error::RecvError> for TrackingError {
    fn from(_: oneshot::error::RecvError) -> Self {
        Self::SessionGone
    }
}
