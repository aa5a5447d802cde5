//! Subscriber half of the session state machine (C6): command-channel frame
//! dispatch, cache/base-time generation rotation, and data-packet decode.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use parking_lot::RwLock;
use sttp_core::cache::SignalIndexCache;
use sttp_core::measurement_codec::{self, CompactEncodingContext};
use sttp_core::protocol::{DataPacketFlags, OperationalModes, ServerCommand, ServerResponse};
use sttp_core::subscription::{AssemblyInfo, SubscriptionInfo};
use sttp_core::time::Ticks;
use sttp_core::tssc::Decoder as TsscDecoder;
use sttp_core::wire;
use sttp_core::{Measurement, Result, StateFlags, SttpError};
use sttp_transport::FramedStream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::events::SubscriberEventSink;
use crate::metadata::MetadataRegistry;

const CACHE_MISS_WARNING_INTERVAL: Duration = Duration::from_secs(20);
const TSSC_DESYNC_WARNING_INTERVAL: Duration = Duration::from_secs(5);

/// The subscriber-side lifecycle of spec.md §4.6's state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
    Disconnecting,
}

/// Owns one subscriber connection's command-channel stream and all
/// per-connection protocol state. Driven by a single reader task; the two
/// cache/base-time generation slots are the only state a concurrent writer
/// (the same reader, when a rotation response arrives) touches through an
/// atomic swap rather than a lock.
pub struct SessionCore<S> {
    stream: FramedStream<S>,
    state: SessionState,

    caches: [ArcSwapOption<SignalIndexCache>; 2],
    next_cache_slot: AtomicUsize,
    base_time_offsets: [AtomicI64; 2],
    next_base_time_slot: AtomicUsize,

    tssc_decoder: TsscDecoder,
    last_cache_miss_warning: Option<Instant>,
    last_tssc_desync_warning: Option<Instant>,

    subscriber_id: Option<Uuid>,
    metadata: Arc<RwLock<MetadataRegistry>>,

    event_sink: Arc<RwLock<Arc<dyn SubscriberEventSink>>>,
    reader_tx: Option<mpsc::Sender<Vec<Measurement>>>,
}

impl<S> SessionCore<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: FramedStream<S>,
        event_sink: Arc<RwLock<Arc<dyn SubscriberEventSink>>>,
        metadata: Arc<RwLock<MetadataRegistry>>,
    ) -> Self {
        SessionCore {
            stream,
            state: SessionState::Connecting,
            caches: [ArcSwapOption::empty(), ArcSwapOption::empty()],
            next_cache_slot: AtomicUsize::new(0),
            base_time_offsets: [AtomicI64::new(0), AtomicI64::new(0)],
            next_base_time_slot: AtomicUsize::new(0),
            tssc_decoder: TsscDecoder::new(64),
            last_cache_miss_warning: None,
            last_tssc_desync_warning: None,
            subscriber_id: None,
            metadata,
            event_sink,
            reader_tx: None,
        }
    }

    pub fn attach_reader_channel(&mut self, tx: mpsc::Sender<Vec<Measurement>>) {
        self.reader_tx = Some(tx);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn metadata(&self) -> Arc<RwLock<MetadataRegistry>> {
        Arc::clone(&self.metadata)
    }

    /// Sends `DEFINEOPERATIONALMODES`, always the first frame on a fresh
    /// connection (spec.md §4.6).
    #[instrument(skip_all)]
    pub async fn send_operational_modes(&mut self, modes: OperationalModes) -> Result<()> {
        let mut payload = Vec::with_capacity(4);
        wire::write_u32_be(&mut payload, modes.0);
        self.send_command(ServerCommand::DefineOperationalModes, &payload).await?;
        self.state = SessionState::Connected;
        Ok(())
    }

    pub async fn send_subscribe(&mut self, subscription: &SubscriptionInfo, assembly: AssemblyInfo<'_>) -> Result<()> {
        let connection_string = subscription.to_connection_string(assembly);
        let encoded = connection_string.as_bytes();

        let mut payload = Vec::with_capacity(5 + encoded.len());
        payload.push(DataPacketFlags::COMPACT.0);
        wire::write_u32_be(&mut payload, encoded.len() as u32);
        payload.extend_from_slice(encoded);

        self.send_command(ServerCommand::Subscribe, &payload).await
    }

    pub async fn send_unsubscribe(&mut self) -> Result<()> {
        self.send_command(ServerCommand::Unsubscribe, &[]).await
    }

    async fn send_command(&mut self, command: ServerCommand, payload: &[u8]) -> Result<()> {
        self.stream.write_u8(command as u8).await?;
        self.stream.write_u32_be(payload.len() as u32).await?;
        self.stream.write(payload).await?;
        self.stream.flush().await
    }

    /// Reads and dispatches exactly one response frame. Returns `Ok(false)`
    /// once the stream has been intentionally closed.
    #[instrument(skip_all)]
    pub async fn process_next_frame(&mut self) -> Result<bool> {
        let total_length = match self.stream.read_u32_be().await {
            Ok(n) => n,
            Err(SttpError::Transport(_)) if self.state == SessionState::Disconnecting => return Ok(false),
            Err(e) => return Err(e),
        };

        let body = self.stream.read_exact(total_length as usize).await?;
        if body.len() < 6 {
            return Err(SttpError::Protocol("response frame shorter than its fixed header".into()));
        }

        let response_code = body[0];
        let command_code = body[1];
        let payload = &body[6..];

        let response = ServerResponse::from_u8(response_code)
            .ok_or_else(|| SttpError::Protocol(format!("unexpected server response code {response_code:#04x}")))?;
        let _ = ServerCommand::from_u8(command_code);

        match response {
            ServerResponse::Succeeded => self.handle_succeeded(command_code, payload).await?,
            ServerResponse::Failed => self.handle_failed(payload).await?,
            ServerResponse::DataPacket => self.handle_data_packet(payload).await?,
            ServerResponse::UpdateSignalIndexCache => self.handle_update_signal_index_cache(payload).await?,
            ServerResponse::UpdateBaseTimes => self.handle_update_base_times(payload).await?,
            ServerResponse::ProcessingComplete => {
                self.event_sink.read().clone().on_processing_complete().await;
            }
            ServerResponse::Notify => {
                let message = String::from_utf8_lossy(payload).into_owned();
                self.event_sink.read().clone().on_notification(&message).await;
            }
            ServerResponse::ConfigurationChanged => {
                debug!("publisher reports configuration changed; a metadata refresh is recommended");
            }
            ServerResponse::NoOp => {}
            ServerResponse::UpdateCipherKeys | ServerResponse::DataStartTime | ServerResponse::BufferBlock => {
                debug!(?response, "received response with no local handler");
            }
        }

        Ok(true)
    }

    async fn handle_succeeded(&mut self, command_code: u8, payload: &[u8]) -> Result<()> {
        if command_code == ServerCommand::Subscribe as u8 {
            self.state = SessionState::Subscribed;
            self.event_sink.read().clone().on_subscribed().await;
        } else if command_code == ServerCommand::MetadataRefresh as u8 {
            self.event_sink.read().clone().on_metadata(payload).await;
        }
        Ok(())
    }

    async fn handle_failed(&mut self, payload: &[u8]) -> Result<()> {
        let message = String::from_utf8_lossy(payload).into_owned();
        Err(SttpError::Subscribe(message))
    }

    async fn handle_update_signal_index_cache(&mut self, payload: &[u8]) -> Result<()> {
        let (subscriber_id, cache) = SignalIndexCache::decode(payload)?;
        self.subscriber_id = Some(subscriber_id);

        for signal_id in cache.signal_ids() {
            if let Some((_, source, numeric_id)) = cache
                .signal_index(signal_id)
                .and_then(|idx| cache.record(idx))
            {
                self.metadata.write().observe(signal_id, source, numeric_id);
            }
        }

        let slot = self.next_cache_slot.load(Ordering::Acquire);
        self.caches[slot].store(Some(Arc::new(cache)));
        self.next_cache_slot.store(1 - slot, Ordering::Release);

        self.send_command(ServerCommand::ConfirmUpdateSignalIndexCache, &[]).await?;
        self.event_sink
            .read()
            .clone()
            .on_subscription_updated(self.caches[slot].load().as_ref().map_or(0, |c| c.count()))
            .await;
        Ok(())
    }

    async fn handle_update_base_times(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() < 16 {
            return Err(SttpError::Protocol("truncated UPDATEBASETIMES payload".into()));
        }
        let offset0 = wire::read_u64_be(payload)? as i64;
        let offset1 = wire::read_u64_be(&payload[8..])? as i64;

        let slot = self.next_base_time_slot.load(Ordering::Acquire);
        self.base_time_offsets[slot].store(offset0, Ordering::Release);
        self.base_time_offsets[1 - slot].store(offset1, Ordering::Release);
        self.next_base_time_slot.store(1 - slot, Ordering::Release);

        self.send_command(ServerCommand::ConfirmUpdateBaseTimes, &[]).await
    }

    async fn handle_data_packet(&mut self, payload: &[u8]) -> Result<()> {
        if payload.is_empty() {
            return Err(SttpError::Protocol("empty data packet".into()));
        }

        let flags = DataPacketFlags(payload[0]);
        let cache_index = usize::from(flags.contains(DataPacketFlags::CACHE_INDEX));
        let cache = self.caches[cache_index].load_full().ok_or_else(|| {
            SttpError::Protocol("data packet referenced a signal index cache generation not yet received".into())
        })?;

        let measurements = if flags.contains(DataPacketFlags::COMPRESSED) {
            self.decode_tssc_batch(&payload[1..], &cache)?
        } else {
            self.decode_compact_batch(&payload[1..], &cache)?
        };

        self.deliver(measurements).await;
        Ok(())
    }

    fn decode_tssc_batch(&mut self, payload: &[u8], cache: &SignalIndexCache) -> Result<Vec<Measurement>> {
        if payload.len() < 4 {
            return Err(SttpError::Protocol("truncated TSSC frame header".into()));
        }
        let _version = wire::read_u16_be(payload)?;
        let sequence_number = wire::read_u16_be(&payload[2..])?;

        if sequence_number < self.tssc_decoder.sequence_number {
            self.report_tssc_desync(sequence_number);
        } else if sequence_number == 0 {
            self.tssc_decoder.reset();
        }
        self.tssc_decoder.sequence_number = sequence_number;
        self.tssc_decoder.set_buffer(payload[4..].to_vec());

        let mut measurements = Vec::new();
        while let Some(point) = self.tssc_decoder.try_get_measurement()? {
            match cache.signal_id(point.point_id) {
                Some(signal_id) => measurements.push(Measurement {
                    signal_id,
                    value: point.value as f64,
                    timestamp: point.timestamp as Ticks,
                    flags: StateFlags(point.state_flags),
                }),
                None => self.report_cache_miss(point.point_id),
            }
        }
        Ok(measurements)
    }

    fn decode_compact_batch(&mut self, payload: &[u8], cache: &SignalIndexCache) -> Result<Vec<Measurement>> {
        if payload.len() < 4 {
            return Err(SttpError::Protocol("truncated compact measurement count".into()));
        }
        let count = wire::read_u32_be(payload)?;

        let ctx = CompactEncodingContext {
            include_time: true,
            use_millisecond_resolution: false,
            base_time_offsets: [
                self.base_time_offsets[0].load(Ordering::Acquire),
                self.base_time_offsets[1].load(Ordering::Acquire),
            ],
        };

        let mut offset = 4;
        let mut measurements = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (measurement, consumed) = measurement_codec::decode(&payload[offset..], cache, &ctx)?;
            offset += consumed;
            match measurement {
                Some(measurement) => measurements.push(measurement),
                None => self.report_cache_miss(-1),
            }
        }
        Ok(measurements)
    }

    fn report_cache_miss(&mut self, runtime_index: i32) {
        let now = Instant::now();
        let should_warn = self
            .last_cache_miss_warning
            .map_or(true, |last| now.duration_since(last) >= CACHE_MISS_WARNING_INTERVAL);
        if should_warn {
            warn!(runtime_index, "measurement referenced an unknown signal index; skipping");
            self.last_cache_miss_warning = Some(now);
        }
    }

    fn report_tssc_desync(&mut self, sequence_number: u16) {
        let now = Instant::now();
        let should_warn = self
            .last_tssc_desync_warning
            .map_or(true, |last| now.duration_since(last) >= TSSC_DESYNC_WARNING_INTERVAL);
        if should_warn {
            warn!(sequence_number, expected_at_least = self.tssc_decoder.sequence_number, "TSSC sequence number regressed");
            self.last_tssc_desync_warning = Some(now);
        }
    }

    async fn deliver(&mut self, measurements: Vec<Measurement>) {
        if measurements.is_empty() {
            return;
        }
        if let Some(tx) = &self.reader_tx {
            let _ = tx.send(measurements).await;
        } else {
            self.event_sink.read().clone().on_new_measurements(&measurements).await;
        }
    }

    pub fn begin_disconnecting(&mut self) {
        self.state = SessionState::Disconnecting;
    }
}
