use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, info, warn};

use crate::display::buffer::SharedDisplayBuffer;
use crate::source::SignalSource;

/// Acquisition-side pump: drains a [`SignalSource`] into the shared
/// display buffer on its own thread at a fixed pace. The buffer lock is
/// held only for the append, never across a source read or the sleep.
pub struct Producer {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Producer {
    pub fn spawn<S>(mut source: S, buffer: SharedDisplayBuffer, pace: Duration) -> Self
    where
        S: SignalSource + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            info!("acquisition producer started");
            while !stop_flag.load(Ordering::Relaxed) {
                match source.next_batch() {
                    Ok(Some(batch)) => {
                        if let Err(err) = buffer.lock().push_batch(&batch) {
                            warn!("dropping batch: {err}");
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        error!("signal source failed: {err}");
                        break;
                    }
                }
                thread::sleep(pace);
            }
            info!("acquisition producer stopped");
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signal the thread to stop and wait for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
