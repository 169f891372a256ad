//! Connector controller thread

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::debug;

/// Single thread that periodically runs a control cycle
///
/// The thread sleeps between cycles for the configured interval and is
/// woken early by [`Controller::wake`].
pub struct Controller {
    running: Arc<AtomicBool>,
    wake_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    daemon: bool,
}

impl Controller {
    /// Start the controller thread
    ///
    /// # Errors
    ///
    /// Returns error if the thread cannot be spawned
    pub fn spawn<F>(name: &str, sleep: Duration, daemon: bool, mut control: F) -> io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let (wake_tx, wake_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name(format!("{name}-controller"))
            .spawn(move || {
                while flag.load(Ordering::Acquire) {
                    if control() {
                        debug!("Controller cycle handled pending messages");
                    }

                    match wake_rx.recv_timeout(sleep) {
                        Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }

                flag.store(false, Ordering::Release);
                done_tx.send(()).ok();
            })?;

        Ok(Self {
            running,
            wake_tx,
            done_rx,
            handle: Mutex::new(Some(handle)),
            daemon,
        })
    }

    /// Whether the control loop is still going
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether the thread is left behind on stop
    #[must_use]
    pub fn is_daemon(&self) -> bool {
        self.daemon
    }

    /// Interrupt the current sleep so a cycle runs now
    pub fn wake(&self) {
        // A pending wake-up already covers this one
        self.wake_tx.try_send(()).ok();
    }

    /// Stop the loop and wait for the thread, up to `timeout`
    ///
    /// A daemon controller is not waited for. Returns whether the thread
    /// finished within the timeout.
    pub fn stop(&self, timeout: Duration) -> bool {
        self.running.store(false, Ordering::Release);
        self.wake();

        if self.daemon {
            self.handle.lock().take();
            return true;
        }

        match self.done_rx.recv_timeout(timeout) {
            Ok(()) => {
                if let Some(handle) = self.handle.lock().take() {
                    handle.join().ok();
                }
                true
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.handle.lock().take();
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("running", &self.is_running())
            .field("daemon", &self.daemon)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[test]
    fn test_wake_runs_a_cycle() {
        let cycles = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&cycles);
        let controller = Controller::spawn("test", Duration::from_secs(60), false, move || {
            seen.fetch_add(1, Ordering::SeqCst);
            false
        })
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while cycles.load(Ordering::SeqCst) < 1 {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(5));
        }

        controller.wake();
        while cycles.load(Ordering::SeqCst) < 2 {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(5));
        }

        assert!(controller.stop(Duration::from_secs(5)));
        assert!(!controller.is_running());
    }

    #[test]
    fn test_daemon_stop_does_not_wait() {
        let controller =
            Controller::spawn("daemon", Duration::from_millis(10), true, || false).unwrap();

        assert!(controller.is_daemon());
        assert!(controller.stop(Duration::ZERO));
        assert!(!controller.is_running());
    }
}
