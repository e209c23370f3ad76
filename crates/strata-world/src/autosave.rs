//! Periodic background flushing of dirty chunks.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};

use crate::format::Format;

/// Runs [`Format::save_chunks`] on a background thread every `interval`.
///
/// Failed passes are logged and retried on the next tick. The thread stops
/// on [`stop`](Self::stop) or when the autosaver is dropped.
pub struct Autosaver {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
    passes: Arc<AtomicU64>,
}

impl Autosaver {
    /// Starts saving `format` every `interval`.
    pub fn spawn(format: Arc<dyn Format>, interval: Duration) -> std::io::Result<Self> {
        let (stop, stop_rx) = bounded::<()>(1);
        let passes = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&passes);

        let handle = std::thread::Builder::new()
            .name("chunk-autosave".into())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    match format.save_chunks() {
                        Ok(()) => tracing::trace!("autosave pass complete"),
                        Err(e) => tracing::warn!("autosave failed: {}", e),
                    }
                    counter.fetch_add(1, Ordering::Relaxed);
                }
                tracing::debug!("autosave stopped");
            })?;

        tracing::info!("autosaving every {:?}", interval);
        Ok(Self {
            stop,
            handle: Some(handle),
            passes,
        })
    }

    /// Number of save passes run so far.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Stops the thread and waits for any pass in progress.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!("autosave thread panicked");
        }
    }
}

impl Drop for Autosaver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::chunk::ChunkPos;
    use crate::dimension::Dimension;
    use crate::format::Provider;
    use crate::generator::VoidGenerator;
    use crate::store::{ChunkStore, MemoryStore};

    #[test]
    fn test_autosave_flushes_dirty_chunks() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(Provider::open(
            store.clone(),
            Arc::new(VoidGenerator),
            Dimension::Overworld,
        ));
        provider.load_chunk(0, 0, true).unwrap();

        let saver = Autosaver::spawn(provider.clone(), Duration::from_millis(10)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !store.chunk_exists(ChunkPos::new(0, 0)).unwrap() {
            assert!(Instant::now() < deadline, "autosave never ran");
            std::thread::sleep(Duration::from_millis(5));
        }
        saver.stop();
        assert!(provider.dirty_chunks().is_empty());
    }

    #[test]
    fn test_stop_returns_promptly() {
        let provider = Arc::new(Provider::open(
            Arc::new(MemoryStore::new()),
            Arc::new(VoidGenerator),
            Dimension::Overworld,
        ));
        let saver = Autosaver::spawn(provider, Duration::from_secs(3600)).unwrap();
        let start = Instant::now();
        saver.stop();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_drop_stops_thread() {
        let provider = Arc::new(Provider::open(
            Arc::new(MemoryStore::new()),
            Arc::new(VoidGenerator),
            Dimension::Overworld,
        ));
        let saver = Autosaver::spawn(provider, Duration::from_secs(3600)).unwrap();
        assert_eq!(saver.passes(), 0);
        drop(saver);
    }
}
