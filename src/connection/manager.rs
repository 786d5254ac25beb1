//! Transport task of one venue connection.
//!
//! The task owns the socket, the state machine, the subscription planner and
//! the venue normalizer. It only talks to the rest of the engine through the
//! [`EngineInput`] channel and the command channel of its
//! [`ConnectionHandle`].

use std::time::Duration;

use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, instrument};

use super::protocol::VenueProtocol;
use super::state::{ConnectionMachine, ConnectionState, HeartbeatAction};
use super::subscription::SubscriptionPlanner;
use super::ConnectionConfig;
use crate::engine::EngineInput;
use crate::error::WsError;
use crate::market::Venue;
use crate::metrics;
use crate::normalizer::VenueNormalizer;
use crate::utils::now_ms;

const COMMAND_CAPACITY: usize = 16;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Instructions for a running connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCommand {
    /// Replace the desired subscription set.
    SetDesired(Vec<String>),
}

/// Handle kept by the runtime to steer one connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    venue: Venue,
    commands: mpsc::Sender<ConnectionCommand>,
    state: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    /// Venue of the connection.
    pub fn venue(&self) -> Venue {
        self.venue
    }

    /// Latest published state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Replace the desired subscription set. Returns `false` once the task
    /// has stopped.
    pub async fn set_desired(&self, ids: Vec<String>) -> bool {
        self.commands
            .send(ConnectionCommand::SetDesired(ids))
            .await
            .is_ok()
    }
}

enum SessionEnd {
    Shutdown,
    Lost(String),
}

/// Transport task state. Run it with [`ConnectionTask::run`].
pub struct ConnectionTask {
    config: ConnectionConfig,
    machine: ConnectionMachine,
    planner: SubscriptionPlanner,
    protocol: VenueProtocol,
    normalizer: VenueNormalizer,
    commands: mpsc::Receiver<ConnectionCommand>,
    state_tx: watch::Sender<ConnectionState>,
    events: mpsc::Sender<EngineInput>,
    shutdown: watch::Receiver<bool>,
}

/// Create the task for one venue and the handle that steers it.
pub fn spawn_connection(
    config: ConnectionConfig,
    events: mpsc::Sender<EngineInput>,
    shutdown: watch::Receiver<bool>,
) -> (ConnectionHandle, ConnectionTask) {
    let venue = config.venue;
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

    let handle = ConnectionHandle {
        venue,
        commands: command_tx,
        state: state_rx,
    };
    let task = ConnectionTask {
        machine: ConnectionMachine::new(venue, config.heartbeat.clone()),
        planner: SubscriptionPlanner::new(venue, config.subscription.clone()),
        protocol: VenueProtocol::new(venue),
        normalizer: VenueNormalizer::for_venue(venue),
        config,
        commands: command_rx,
        state_tx,
        events,
        shutdown,
    };
    (handle, task)
}

impl ConnectionTask {
    /// Connect, stream, reconnect with backoff, until shutdown or the attempt
    /// budget runs out.
    #[instrument(skip(self), fields(venue = %self.config.venue))]
    pub async fn run(mut self) {
        let venue = self.config.venue;
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            self.drain_commands();

            self.machine.connecting();
            if !self.publish().await {
                break;
            }
            info!(url = %self.config.url, attempt = self.machine.attempts(), "Connecting");

            let connect = tokio::select! {
                result = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(self.config.url.as_str())) => result,
                _ = self.shutdown.changed() => break,
            };
            let end = match connect {
                Ok(Ok((stream, _))) => {
                    self.machine.connected(now_ms());
                    if !self.publish().await {
                        break;
                    }
                    self.session(stream).await
                }
                Ok(Err(e)) => SessionEnd::Lost(WsError::ConnectionFailed(e.to_string()).to_string()),
                Err(_) => SessionEnd::Lost(WsError::ConnectionFailed("connect timed out".to_string()).to_string()),
            };
            let reason = match end {
                SessionEnd::Shutdown => break,
                SessionEnd::Lost(reason) => reason,
            };

            self.planner.on_disconnect();
            self.protocol.reset();
            self.normalizer = VenueNormalizer::for_venue(venue);
            let attempt = self.machine.disconnected(&reason);
            if !self.publish().await {
                break;
            }
            metrics::inc_ws_reconnects(venue);

            if self.config.backoff.exhausted(self.machine.attempts()) {
                error!(attempts = self.machine.attempts(), "Reconnect attempts exhausted, giving up");
                break;
            }
            let delay = self.config.backoff.delay(attempt);
            info!(delay_ms = delay.as_millis() as u64, attempt, "Reconnecting after delay");
            if !self.wait(delay).await {
                break;
            }
        }

        if self.machine.state() != ConnectionState::Disconnected {
            self.machine.disconnected("shutdown");
            self.publish().await;
        }
        info!("Connection task stopped");
    }

    /// Sleep out the backoff while still taking commands. Returns `false` on
    /// shutdown.
    async fn wait(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                Some(command) = self.commands.recv() => self.apply(command),
                _ = self.shutdown.changed() => return false,
            }
        }
    }

    async fn session<S>(&mut self, stream: S) -> SessionEnd
    where
        S: futures::Stream<Item = Result<Message, tungstenite::Error>>
            + Sink<Message, Error = tungstenite::Error>
            + Unpin,
    {
        let (mut write, mut read) = stream.split();
        let mut initial = true;

        let chunks = self.planner.resubscribe_all();
        for chunk in &chunks {
            let frames = self.protocol.subscribe(chunk, initial);
            initial = false;
            if let Err(e) = send_all(&mut write, frames).await {
                return SessionEnd::Lost(e.to_string());
            }
        }
        info!(ids = self.planner.desired_len(), chunks = chunks.len(), "Subscriptions sent");

        let mut heartbeat = tokio::time::interval(Duration::from_millis(self.config.heartbeat.interval_ms));
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        heartbeat.tick().await;
        let mut flush = tokio::time::interval(Duration::from_millis(self.config.subscription.debounce_ms.max(10)));
        flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(message)) => {
                        if let Some(end) = self.on_message(message).await {
                            return end;
                        }
                    }
                    Some(Err(e)) => return SessionEnd::Lost(WsError::from(e).to_string()),
                    None => {
                        return SessionEnd::Lost(
                            WsError::ConnectionClosed { code: None, reason: "stream ended".to_string() }.to_string(),
                        )
                    }
                },
                _ = heartbeat.tick() => {
                    match self.machine.on_heartbeat_tick(now_ms()) {
                        HeartbeatAction::Probe => {
                            if let Err(e) = send_all(&mut write, vec![self.protocol.probe()]).await {
                                return SessionEnd::Lost(e.to_string());
                            }
                        }
                        HeartbeatAction::Reconnect { missed } => {
                            return SessionEnd::Lost(WsError::HeartbeatTimeout { missed }.to_string());
                        }
                    }
                    if !self.publish().await {
                        return SessionEnd::Shutdown;
                    }
                }
                _ = flush.tick() => {
                    let Some(batch) = self.planner.flush(now_ms(), true) else {
                        continue;
                    };
                    debug!(
                        subscribe = batch.subscribe.iter().map(Vec::len).sum::<usize>(),
                        unsubscribe = batch.unsubscribe.iter().map(Vec::len).sum::<usize>(),
                        "Applying subscription change"
                    );
                    let mut frames = Vec::new();
                    for chunk in &batch.unsubscribe {
                        frames.extend(self.protocol.unsubscribe(chunk));
                    }
                    for chunk in &batch.subscribe {
                        frames.extend(self.protocol.subscribe(chunk, initial));
                        initial = false;
                    }
                    if let Err(e) = send_all(&mut write, frames).await {
                        return SessionEnd::Lost(e.to_string());
                    }
                }
                Some(command) = self.commands.recv() => self.apply(command),
                _ = self.shutdown.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    /// Handle one inbound frame. Returns how the session ends, if it does.
    async fn on_message(&mut self, message: Message) -> Option<SessionEnd> {
        let venue = self.config.venue;
        let received_ms = now_ms();
        self.machine.on_liveness(received_ms);
        if !self.publish().await {
            return Some(SessionEnd::Shutdown);
        }

        match message {
            Message::Text(text) => {
                metrics::inc_ws_messages_received(venue);
                if self.protocol.handle_control(&text) {
                    return None;
                }
                let events = self.normalizer.normalize_frame(&text, received_ms);
                if events.is_empty() {
                    return None;
                }
                for event in &events {
                    metrics::inc_events_normalized(venue, event.kind().into());
                }
                if self.events.send(EngineInput::Events(events)).await.is_err() {
                    debug!("Dispatch loop gone, stopping connection");
                    return Some(SessionEnd::Shutdown);
                }
                None
            }
            Message::Close(frame) => {
                let (code, reason) = frame
                    .map(|f| (Some(u16::from(f.code)), f.reason.to_string()))
                    .unwrap_or((None, String::new()));
                Some(SessionEnd::Lost(WsError::ConnectionClosed { code, reason }.to_string()))
            }
            Message::Binary(bytes) => {
                debug!(len = bytes.len(), "Ignoring binary frame");
                None
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
        }
    }

    fn apply(&mut self, command: ConnectionCommand) {
        match command {
            ConnectionCommand::SetDesired(ids) => {
                self.planner.set_desired(ids, now_ms());
                metrics::set_desired_subscriptions(self.config.venue, self.planner.desired_len());
            }
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }
    }

    /// Publish the machine state if it changed. Returns `false` once the
    /// dispatch loop is gone.
    async fn publish(&mut self) -> bool {
        let state = self.machine.state();
        if *self.state_tx.borrow() == state {
            return true;
        }
        self.state_tx.send_replace(state);
        self.events
            .send(EngineInput::Connection {
                venue: self.config.venue,
                state,
            })
            .await
            .is_ok()
    }
}

async fn send_all<W>(write: &mut W, frames: Vec<Message>) -> Result<(), WsError>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    for frame in frames {
        write
            .send(frame)
            .await
            .map_err(|e| WsError::SendFailed(e.to_string()))?;
    }
    Ok(())
}
