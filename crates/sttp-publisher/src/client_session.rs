//! Publisher-side mirror of the session state machine (C6/C10): parses
//! subscriber commands, builds and rotates the signal-index cache, and
//! drives the publication loop that turns `MeasurementSource::poll` results
//! into encoded data packets.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use sttp_core::cache::SignalIndexCache;
use sttp_core::protocol::{
    DataPacketFlags, OperationalModes, ServerCommand, ServerResponse,
};
use sttp_core::time;
use sttp_core::wire;
use sttp_core::{Result, SttpError};
use sttp_transport::FramedStream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::connection_string::parse_connection_string;
use crate::source::MeasurementSource;

/// Negotiated per-client state that the publication loop reads each tick.
pub struct ClientSession<S> {
    stream: FramedStream<S>,
    client_id: Uuid,

    caches: [ArcSwapOption<SignalIndexCache>; 2],
    active_cache_slot: AtomicUsize,
    base_time_offsets: [AtomicI64; 2],
    /// Mirrors the naming and rotation rule of the subscriber's own
    /// `next_base_time_slot`: the slot an `UPDATEBASETIMES` send will refresh
    /// next. The slot currently live for encoding is always the other one.
    next_base_time_slot: AtomicUsize,

    negotiated_modes: OperationalModes,
    compress_payload: bool,
    filter_expression: String,
    signal_ids: parking_lot::RwLock<Vec<Uuid>>,

    source: Arc<dyn MeasurementSource>,
}

pub type TcpClientSession = ClientSession<TcpStream>;

impl<S> ClientSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: FramedStream<S>, client_id: Uuid, source: Arc<dyn MeasurementSource>) -> Self {
        ClientSession {
            stream,
            client_id,
            caches: [ArcSwapOption::empty(), ArcSwapOption::empty()],
            active_cache_slot: AtomicUsize::new(0),
            base_time_offsets: [AtomicI64::new(0), AtomicI64::new(0)],
            next_base_time_slot: AtomicUsize::new(0),
            negotiated_modes: OperationalModes::default(),
            compress_payload: false,
            filter_expression: String::new(),
            signal_ids: parking_lot::RwLock::new(Vec::new()),
            source,
        }
    }

    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    pub fn cache_slot(&self) -> usize {
        self.active_cache_slot.load(Ordering::Acquire)
    }

    /// The signal index cache generation currently active for this client,
    /// if one has been built yet.
    pub fn active_cache(&self) -> Option<Arc<SignalIndexCache>> {
        self.caches[self.cache_slot()].load_full()
    }

    pub fn signal_ids(&self) -> Vec<Uuid> {
        self.signal_ids.read().clone()
    }

    pub fn compress_payload(&self) -> bool {
        self.compress_payload
    }

    pub fn filter_expression(&self) -> &str {
        &self.filter_expression
    }

    /// The base-time generation slot (0 or 1) currently active for this
    /// client's compact timestamp encoding.
    pub fn active_base_time_slot(&self) -> usize {
        1 - self.next_base_time_slot.load(Ordering::Acquire)
    }

    pub fn base_time_offsets(&self) -> [i64; 2] {
        [
            self.base_time_offsets[0].load(Ordering::Acquire),
            self.base_time_offsets[1].load(Ordering::Acquire),
        ]
    }

    /// Blocks on exactly one command frame and applies it. Returns `Ok(false)`
    /// when the client closes its side of the channel.
    #[instrument(skip_all)]
    pub async fn process_next_command(&mut self) -> Result<bool> {
        let command_code = match self.stream.read_u8().await {
            Ok(c) => c,
            Err(SttpError::Transport(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        let payload_length = self.stream.read_u32_be().await?;
        let payload = self.stream.read_exact(payload_length as usize).await?;

        let command = ServerCommand::from_u8(command_code)
            .ok_or_else(|| SttpError::Protocol(format!("unknown command code {command_code:#04x}")))?;

        match command {
            ServerCommand::DefineOperationalModes => self.handle_define_operational_modes(&payload).await?,
            ServerCommand::Subscribe => self.handle_subscribe(&payload).await?,
            ServerCommand::Unsubscribe => {
                self.signal_ids.write().clear();
                info!(client = %self.client_id, "client unsubscribed");
            }
            ServerCommand::ConfirmUpdateSignalIndexCache => {
                debug!(client = %self.client_id, "client confirmed signal index cache generation");
            }
            ServerCommand::ConfirmUpdateBaseTimes => {
                debug!(client = %self.client_id, "client confirmed base time generation");
            }
            other => {
                debug!(client = %self.client_id, ?other, "no handler for this command, ignoring");
            }
        }

        Ok(true)
    }

    async fn handle_define_operational_modes(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() < 4 {
            return Err(SttpError::Protocol("truncated DEFINEOPERATIONALMODES payload".into()));
        }
        let requested = OperationalModes(wire::read_u32_be(payload)?);
        // This publisher only ever speaks TSSC/UTF-8; downgrade anything else
        // rather than reject the connection.
        self.negotiated_modes = requested;
        self.compress_payload = requested.contains(OperationalModes::COMPRESS_PAYLOAD_DATA);
        Ok(())
    }

    async fn handle_subscribe(&mut self, payload: &[u8]) -> Result<()> {
        if payload.is_empty() {
            return Err(SttpError::Protocol("empty SUBSCRIBE payload".into()));
        }
        if payload.len() < 5 {
            return Err(SttpError::Protocol("truncated SUBSCRIBE payload".into()));
        }
        let encoded_length = wire::read_u32_be(&payload[1..])? as usize;
        if payload.len() < 5 + encoded_length {
            return Err(SttpError::Protocol("truncated SUBSCRIBE connection string".into()));
        }
        let connection_string = std::str::from_utf8(&payload[5..5 + encoded_length])
            .map_err(|e| SttpError::Protocol(format!("invalid utf-8 connection string: {e}")))?;

        let parameters = parse_connection_string(connection_string);
        self.filter_expression = parameters
            .get("filterExpression")
            .cloned()
            .unwrap_or_default();

        let descriptors = self.source.resolve_filter(&self.filter_expression).await;
        let next_slot = 1 - self.active_cache_slot.load(Ordering::Acquire);

        let mut cache = SignalIndexCache::new();
        let mut ids = Vec::with_capacity(descriptors.len());
        for (index, descriptor) in descriptors.into_iter().enumerate() {
            ids.push(descriptor.signal_id);
            cache.add(index as i32, descriptor.signal_id, descriptor.source, descriptor.numeric_id);
        }
        *self.signal_ids.write() = ids;

        self.caches[next_slot].store(Some(Arc::new(cache)));
        self.send_update_signal_index_cache(next_slot).await?;
        self.active_cache_slot.store(next_slot, Ordering::Release);

        self.send_update_base_times().await?;

        self.send_response(ServerResponse::Succeeded, ServerCommand::Subscribe as u8, &[])
            .await
    }

    /// Refreshes the inactive base-time slot with the current time and
    /// rotates it in, mirroring how `sttp-subscriber`'s `SessionCore` rotates
    /// its own `next_base_time_slot` on receipt of this same payload.
    async fn send_update_base_times(&mut self) -> Result<()> {
        let slot = self.next_base_time_slot.load(Ordering::Acquire);
        let new_offset = time::now() as i64;
        let other_offset = self.base_time_offsets[1 - slot].load(Ordering::Acquire);

        let mut body = Vec::with_capacity(16);
        wire::write_u64_be(&mut body, new_offset as u64);
        wire::write_u64_be(&mut body, other_offset as u64);

        self.base_time_offsets[slot].store(new_offset, Ordering::Release);
        self.next_base_time_slot.store(1 - slot, Ordering::Release);

        self.send_response(ServerResponse::UpdateBaseTimes, 0, &body).await
    }

    async fn send_update_signal_index_cache(&mut self, slot: usize) -> Result<()> {
        let cache = self.caches[slot].load_full().expect("just stored");

        let mut inner = Vec::new();
        inner.extend_from_slice(self.client_id.as_bytes());
        wire::write_u32_be(&mut inner, cache.count() as u32);

        for signal_id in cache.signal_ids() {
            let index = cache.signal_index(signal_id).expect("signal_ids come from this cache");
            let (_, source, numeric_id) = cache.record(index).expect("index came from signal_ids");
            wire::write_u32_be(&mut inner, index as u32);
            inner.extend_from_slice(signal_id.as_bytes());
            wire::write_u32_be(&mut inner, source.len() as u32);
            inner.extend_from_slice(source.as_bytes());
            wire::write_u64_be(&mut inner, numeric_id);
        }

        let mut body = Vec::with_capacity(4 + inner.len());
        wire::write_u32_be(&mut body, inner.len() as u32);
        body.extend_from_slice(&inner);

        self.send_response(ServerResponse::UpdateSignalIndexCache, 0, &body).await
    }

    pub async fn send_response(&mut self, response: ServerResponse, command_code: u8, payload: &[u8]) -> Result<()> {
        let mut body = Vec::with_capacity(6 + payload.len());
        body.push(response as u8);
        body.push(command_code);
        wire::write_u32_be(&mut body, payload.len() as u32);
        body.extend_from_slice(payload);

        self.stream.write_u32_be(body.len() as u32).await?;
        self.stream.write(&body).await?;
        self.stream.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

    /// A minimal in-memory duplex: reads drain a fixed byte vector, writes
    /// are discarded. Enough to drive one command through `ClientSession`.
    struct MockStream {
        input: std::io::Cursor<Vec<u8>>,
    }

    impl MockStream {
        fn new(input: Vec<u8>) -> Self {
            MockStream {
                input: std::io::Cursor::new(input),
            }
        }
    }

    impl AsyncRead for MockStream {
        fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
            let start = self.input.position() as usize;
            let data = self.input.get_ref();
            let available = &data[start.min(data.len())..];
            let n = available.len().min(buf.remaining());
            buf.put_slice(&available[..n]);
            self.input.set_position((start + n) as u64);
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for MockStream {
        fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }
        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn sample_subscribe_frame(filter: &str) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.push(DataPacketFlags::COMPACT.0);
        let encoded = format!("filterExpression={{{filter}}}");
        wire::write_u32_be(&mut payload, encoded.len() as u32);
        payload.extend_from_slice(encoded.as_bytes());

        let mut frame = Vec::new();
        frame.push(ServerCommand::Subscribe as u8);
        wire::write_u32_be(&mut frame, payload.len() as u32);
        frame.extend_from_slice(&payload);
        frame
    }

    #[tokio::test]
    async fn subscribe_builds_a_cache_from_the_resolved_filter() {
        let signal_id = Uuid::new_v4();
        let source = Arc::new(crate::source::StaticSource::new(vec![crate::source::SignalDescriptor {
            signal_id,
            source: "PMU:1".into(),
            numeric_id: 7,
        }]));

        let frame = sample_subscribe_frame("PMU:1");
        let stream = MockStream::new(frame);
        let mut session = ClientSession::new(FramedStream::new(stream), Uuid::new_v4(), source);

        assert!(session.process_next_command().await.unwrap());
        assert_eq!(session.signal_ids(), vec![signal_id]);
    }
}
