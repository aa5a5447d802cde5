//! TCP accept loop (C10): one `ClientSession` per connection, run on its own
//! task until the client disconnects or a protocol error occurs.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use sttp_core::protocol::ServerResponse;
use sttp_core::Result;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::interval;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::client_session::ClientSession;
use crate::publication::{encode_compact_packet, encode_tssc_packet, DEFAULT_PUBLISH_INTERVAL};
use crate::source::MeasurementSource;

pub struct Listener {
    listener: TcpListener,
    source: Arc<dyn MeasurementSource>,
    publish_interval: Duration,
    clients: Arc<DashMap<Uuid, SocketAddr>>,
}

impl Listener {
    pub async fn bind(addr: SocketAddr, source: Arc<dyn MeasurementSource>) -> Result<Self> {
        let listener = sttp_transport::tcp::bind(addr).await?;
        Ok(Listener {
            listener,
            source,
            publish_interval: DEFAULT_PUBLISH_INTERVAL,
            clients: Arc::new(DashMap::new()),
        })
    }

    pub fn with_publish_interval(mut self, interval: Duration) -> Self {
        self.publish_interval = interval;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Snapshot of currently connected client IDs and their peer addresses.
    pub fn connected_clients(&self) -> Vec<(Uuid, SocketAddr)> {
        self.clients.iter().map(|entry| (*entry.key(), *entry.value())).collect()
    }

    /// Accepts connections forever, spawning one client task per connection.
    /// Returns only if `accept` itself fails (the listening socket died).
    #[instrument(skip_all)]
    pub async fn run(&self) -> Result<()> {
        loop {
            let (stream, peer) = sttp_transport::tcp::accept(&self.listener).await?;
            let client_id = Uuid::new_v4();
            info!(%peer, %client_id, "client connected");
            self.clients.insert(client_id, peer);

            let source = Arc::clone(&self.source);
            let publish_interval = self.publish_interval;
            let clients = Arc::clone(&self.clients);
            tokio::spawn(async move {
                if let Err(e) = run_client(stream, client_id, source, publish_interval).await {
                    warn!(%client_id, error = %e, "client session ended with an error");
                } else {
                    info!(%client_id, "client session ended");
                }
                clients.remove(&client_id);
            });
        }
    }
}

async fn run_client(
    stream: sttp_transport::FramedStream<TcpStream>,
    client_id: Uuid,
    source: Arc<dyn MeasurementSource>,
    publish_interval: Duration,
) -> Result<()> {
    let mut session = ClientSession::new(stream, client_id, Arc::clone(&source));
    let mut ticker = interval(publish_interval);
    let mut sequence_number: u16 = 0;

    loop {
        tokio::select! {
            result = session.process_next_command() => {
                match result {
                    Ok(true) => continue,
                    Ok(false) => return Ok(()),
                    Err(e) => return Err(e),
                }
            }
            _ = ticker.tick() => {
                let signal_ids = session.signal_ids();
                if signal_ids.is_empty() {
                    continue;
                }

                let Some(cache) = session.active_cache() else {
                    continue;
                };

                let measurements = source.poll(&signal_ids).await;
                if measurements.is_empty() {
                    continue;
                }

                let payload = if session.compress_payload() {
                    encode_tssc_packet(&measurements, &cache, session.cache_slot(), &mut sequence_number)
                } else {
                    encode_compact_packet(
                        &measurements,
                        &cache,
                        session.cache_slot(),
                        session.active_base_time_slot(),
                        session.base_time_offsets(),
                    )
                };

                session.send_response(ServerResponse::DataPacket, 0, &payload).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SignalDescriptor, StaticSource};

    #[tokio::test]
    async fn listener_binds_and_reports_its_local_address() {
        let source = Arc::new(StaticSource::new(vec![SignalDescriptor {
            signal_id: Uuid::new_v4(),
            source: "PMU:1".into(),
            numeric_id: 1,
        }]));
        let listener = Listener::bind("127.0.0.1:0".parse().unwrap(), source).await.unwrap();
        assert!(listener.local_addr().unwrap().port() > 0);
    }
}
