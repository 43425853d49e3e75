use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// A dumb repeating tick source. The state machine owns start/stop/pause as
/// data; this just emits events on an interval until stopped or the
/// receiver goes away.
pub struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn spawn<T, F>(interval: Duration, tx: Sender<T>, event: F) -> Self
    where
        T: Send + 'static,
        F: Fn() -> T + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = std::thread::spawn(move || loop {
            std::thread::sleep(interval);
            if stop_flag.load(Ordering::Relaxed) {
                break;
            }
            if tx.send(event()).is_err() {
                break;
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop the tick thread and wait for it to exit. After this returns no
    /// further events will be sent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
