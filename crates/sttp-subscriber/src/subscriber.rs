//! Public subscriber API (C7): connect/disconnect, subscribe/unsubscribe,
//! event-sink registration, and the pull-mode reader alternative.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use sttp_core::subscription::{AssemblyInfo, SubscriptionInfo};
use sttp_core::{Result, SttpError};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::config::Config;
use crate::connector::Connector;
use crate::events::{NoopEventSink, SubscriberEventSink};
use crate::metadata::MetadataRegistry;
use crate::reader::{self, MeasurementReader};
use crate::session::SessionCore;

const ASSEMBLY_SOURCE: &str = "sttp-rs";
const ASSEMBLY_VERSION: &str = env!("CARGO_PKG_VERSION");
const ASSEMBLY_UPDATED_ON: &str = "2026-07-28";

/// Commands the public API hands to the running session's read/dispatch
/// loop, since the `SessionCore` itself is owned by the background task
/// once a connection is up.
enum SessionCommand {
    Subscribe(SubscriptionInfo),
    Unsubscribe,
}

/// A single publisher connection: owns the reconnect loop's lifetime and the
/// running session's read task.
pub struct DataSubscriber {
    config: Config,
    event_sink: Arc<RwLock<Arc<dyn SubscriberEventSink>>>,
    metadata: Arc<RwLock<MetadataRegistry>>,
    last_subscription: RwLock<Option<SubscriptionInfo>>,
    connector: Option<Arc<Connector>>,
    command_tx: Option<mpsc::Sender<SessionCommand>>,
    pending_reader_tx: Option<mpsc::Sender<Vec<sttp_core::Measurement>>>,
    session_task: Option<JoinHandle<()>>,
    shutdown: Arc<Notify>,
}

impl DataSubscriber {
    pub fn new(config: Config) -> Self {
        DataSubscriber {
            config,
            event_sink: Arc::new(RwLock::new(Arc::new(NoopEventSink) as Arc<dyn SubscriberEventSink>)),
            metadata: Arc::new(RwLock::new(MetadataRegistry::new())),
            last_subscription: RwLock::new(None),
            connector: None,
            command_tx: None,
            pending_reader_tx: None,
            session_task: None,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Replaces the registered event sink. Safe to call while a session is
    /// running: the read task always loads the current `Arc` before
    /// dispatching an event.
    pub fn set_event_sink(&self, sink: Arc<dyn SubscriberEventSink>) {
        *self.event_sink.write() = sink;
    }

    /// Switches future data packets from callback delivery to pull mode.
    /// Must be called before `connect`; the channel is wired into the
    /// session when the connection is established.
    pub fn enable_reader_mode(&mut self) -> MeasurementReader {
        let (tx, reader) = reader::channel();
        self.pending_reader_tx = Some(tx);
        reader
    }

    pub fn metadata(&self) -> Arc<RwLock<MetadataRegistry>> {
        Arc::clone(&self.metadata)
    }

    pub fn assembly_info() -> AssemblyInfo<'static> {
        AssemblyInfo {
            source: ASSEMBLY_SOURCE,
            version: ASSEMBLY_VERSION,
            updated_on: ASSEMBLY_UPDATED_ON,
        }
    }

    /// Connects to `addr` and runs the session's command-channel read loop
    /// on a background task until `disconnect` is called. If
    /// `config.auto_reconnect` is set, a dropped connection is retried by
    /// `Connector::run` transparently from inside the loop, and the last
    /// active subscription is replayed once the new session reaches
    /// `SUCCEEDED` on `DEFINEOPERATIONALMODES`.
    #[instrument(skip(self), fields(%addr))]
    pub async fn connect(&mut self, addr: SocketAddr) -> Result<()> {
        let connector = Arc::new(Connector::new(addr, self.config.clone()));
        let mut session = connector
            .run(Arc::clone(&self.event_sink), Arc::clone(&self.metadata))
            .await?;

        if let Some(tx) = &self.pending_reader_tx {
            session.attach_reader_channel(tx.clone());
        }

        self.event_sink.read().clone().on_connected().await;

        if let Some(subscription) = self.last_subscription.read().clone() {
            session.send_subscribe(&subscription, Self::assembly_info()).await?;
        }

        let (command_tx, command_rx) = mpsc::channel(8);
        self.command_tx = Some(command_tx);
        self.connector = Some(Arc::clone(&connector));

        let event_sink = Arc::clone(&self.event_sink);
        let metadata = Arc::clone(&self.metadata);
        let auto_reconnect = self.config.auto_reconnect;
        let shutdown = Arc::clone(&self.shutdown);
        let reader_tx = self.pending_reader_tx.clone();

        self.session_task = Some(tokio::spawn(async move {
            run_session_loop(
                session,
                connector,
                event_sink,
                metadata,
                auto_reconnect,
                shutdown,
                command_rx,
                reader_tx,
            )
            .await;
        }));

        Ok(())
    }

    /// Subscribes with the given parameters; the publisher applies them to
    /// all subsequent `DATAPACKET` frames once it responds `SUCCEEDED`. The
    /// subscription is also remembered so a reconnect re-issues it.
    pub async fn subscribe(&self, subscription: SubscriptionInfo) -> Result<()> {
        *self.last_subscription.write() = Some(subscription.clone());

        let tx = self
            .command_tx
            .as_ref()
            .ok_or_else(|| SttpError::Configuration("subscribe called before connect".into()))?;

        tx.send(SessionCommand::Subscribe(subscription))
            .await
            .map_err(|_| SttpError::Configuration("session task is no longer running".into()))
    }

    pub async fn unsubscribe(&self) -> Result<()> {
        *self.last_subscription.write() = None;

        let tx = self
            .command_tx
            .as_ref()
            .ok_or_else(|| SttpError::Configuration("unsubscribe called before connect".into()))?;

        tx.send(SessionCommand::Unsubscribe)
            .await
            .map_err(|_| SttpError::Configuration("session task is no longer running".into()))
    }

    pub fn active_subscription(&self) -> Option<SubscriptionInfo> {
        self.last_subscription.read().clone()
    }

    /// Stops the background session task and cancels any in-progress
    /// reconnect backoff.
    pub async fn disconnect(&mut self) {
        if let Some(connector) = &self.connector {
            connector.cancel();
        }
        self.shutdown.notify_waiters();
        if let Some(task) = self.session_task.take() {
            let _ = task.await;
        }
        self.command_tx = None;
        self.event_sink.read().clone().on_connection_terminated().await;
    }
}

impl Default for DataSubscriber {
    fn default() -> Self {
        DataSubscriber::new(Config::default())
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_session_loop(
    mut session: SessionCore<TcpStream>,
    connector: Arc<Connector>,
    event_sink: Arc<RwLock<Arc<dyn SubscriberEventSink>>>,
    metadata: Arc<RwLock<MetadataRegistry>>,
    auto_reconnect: bool,
    shutdown: Arc<Notify>,
    mut command_rx: mpsc::Receiver<SessionCommand>,
    reader_tx: Option<mpsc::Sender<Vec<sttp_core::Measurement>>>,
) {
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                info!("session loop stopping on disconnect request");
                return;
            }
            command = command_rx.recv() => {
                match command {
                    Some(SessionCommand::Subscribe(subscription)) => {
                        if let Err(e) = session.send_subscribe(&subscription, DataSubscriber::assembly_info()).await {
                            event_sink.read().clone().on_error(&e.to_string()).await;
                        }
                    }
                    Some(SessionCommand::Unsubscribe) => {
                        if let Err(e) = session.send_unsubscribe().await {
                            event_sink.read().clone().on_error(&e.to_string()).await;
                        }
                    }
                    None => {}
                }
            }
            result = session.process_next_frame() => {
                match result {
                    Ok(true) => continue,
                    Ok(false) => {
                        info!("session closed intentionally");
                        return;
                    }
                    Err(e) => {
                        event_sink.read().clone().on_error(&e.to_string()).await;
                        event_sink.read().clone().on_connection_terminated().await;

                        if !auto_reconnect || connector.is_canceled() {
                            return;
                        }

                        match connector.run(Arc::clone(&event_sink), Arc::clone(&metadata)).await {
                            Ok(mut new_session) => {
                                if let Some(tx) = &reader_tx {
                                    new_session.attach_reader_channel(tx.clone());
                                }
                                session = new_session;
                                event_sink.read().clone().on_connected().await;
                            }
                            Err(_) => return,
                        }
                    }
                }
            }
        }
    }
}
