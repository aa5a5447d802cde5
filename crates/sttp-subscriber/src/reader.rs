//! Pull-style delivery: an alternative to `SubscriberEventSink::on_new_measurements`
//! for consumers that want a blocking `next_batch()` call instead of a
//! callback running on the reader task (spec.md §4.7, §5).

use sttp_core::Measurement;
use tokio::sync::mpsc;

pub(crate) const READER_CHANNEL_DEPTH: usize = 1;

pub struct MeasurementReader {
    rx: mpsc::Receiver<Vec<Measurement>>,
}

impl MeasurementReader {
    pub(crate) fn new(rx: mpsc::Receiver<Vec<Measurement>>) -> Self {
        MeasurementReader { rx }
    }

    /// Blocks until the next decoded data-packet batch arrives, or returns
    /// `None` once the session has shut down and no more batches will come.
    pub async fn next_batch(&mut self) -> Option<Vec<Measurement>> {
        self.rx.recv().await
    }
}

pub(crate) fn channel() -> (mpsc::Sender<Vec<Measurement>>, MeasurementReader) {
    let (tx, rx) = mpsc::channel(READER_CHANNEL_DEPTH);
    (tx, MeasurementReader::new(rx))
}
