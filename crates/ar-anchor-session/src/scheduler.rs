//! Render-loop scheduler.
//!
//! A single loop thread waits on a refresh signal (one message per display
//! refresh) and calls the frame handler once per tick. `stop()` joins the
//! thread, so once it returns no further frame callback can fire.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};

use crate::error::SchedulerError;

const LOOP_THREAD_NAME: &str = "ar-render-loop";

/// One refresh of the render loop.
#[derive(Clone, Copy, Debug)]
pub struct FrameTick {
    /// Ticks since this loop was started.
    pub seq: u64,
    /// When the refresh signal fired.
    pub at: Instant,
}

struct LoopHandle {
    // Dropping the sender disconnects the stop channel and wakes the loop.
    stop_tx: Sender<()>,
    exit: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Continuous, restartable frame loop.
pub struct RenderLoop {
    refresh: Receiver<Instant>,
    running: Option<LoopHandle>,
}

impl RenderLoop {
    /// Loop driven by an arbitrary refresh signal.
    ///
    /// Every message on `refresh` is one display refresh. Tests use a
    /// rendezvous channel to step the loop by hand.
    pub fn new(refresh: Receiver<Instant>) -> Self {
        Self {
            refresh,
            running: None,
        }
    }

    /// Loop paced by a fixed-rate timer.
    pub fn with_refresh_rate(hz: f64) -> Self {
        let period = Duration::from_secs_f64(1.0 / hz.max(1.0e-3));
        Self::new(tick(period))
    }

    /// Start calling `handler` on every refresh. No-op if already running.
    pub fn start<F>(&mut self, handler: F) -> Result<(), SchedulerError>
    where
        F: FnMut(FrameTick) + Send + 'static,
    {
        if self.is_running() {
            log::debug!("render loop already running");
            return Ok(());
        }
        // Reap a loop that exited on its own (refresh signal closed).
        self.stop();

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let exit = Arc::new(AtomicBool::new(false));
        let refresh = self.refresh.clone();
        let loop_exit = Arc::clone(&exit);
        let thread = thread::Builder::new()
            .name(LOOP_THREAD_NAME.to_owned())
            .spawn(move || run_loop(refresh, stop_rx, loop_exit, handler))?;

        self.running = Some(LoopHandle {
            stop_tx,
            exit,
            thread,
        });
        log::debug!("render loop started");
        Ok(())
    }

    /// Stop the loop and wait for the in-flight frame (if any) to finish.
    ///
    /// Idempotent and safe to call before `start`. When called from inside
    /// the frame handler the loop is told to exit after the current frame
    /// instead of joining itself. Returns whether a loop was stopped.
    pub fn stop(&mut self) -> bool {
        let Some(handle) = self.running.take() else {
            return false;
        };
        handle.exit.store(true, Ordering::SeqCst);
        drop(handle.stop_tx);

        if handle.thread.thread().id() == thread::current().id() {
            log::debug!("render loop stop requested from its own frame");
            return true;
        }
        if handle.thread.join().is_err() {
            log::error!("render loop thread panicked");
        }
        log::debug!("render loop stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|h| !h.thread.is_finished())
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop<F>(refresh: Receiver<Instant>, stop: Receiver<()>, exit: Arc<AtomicBool>, mut handler: F)
where
    F: FnMut(FrameTick),
{
    let mut seq = 0u64;
    // A tick that was already received is always handled; the exit flag is
    // only checked between ticks.
    while !exit.load(Ordering::SeqCst) {
        select! {
            recv(stop) -> _ => break,
            recv(refresh) -> msg => {
                let Ok(at) = msg else {
                    log::debug!("refresh signal closed, leaving render loop");
                    break;
                };
                handler(FrameTick { seq, at });
                seq += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn manual_loop() -> (Sender<Instant>, RenderLoop) {
        let (tx, rx) = bounded(0);
        (tx, RenderLoop::new(rx))
    }

    #[test]
    fn stop_before_start_is_a_no_op() {
        let (_tx, mut render_loop) = manual_loop();
        assert!(!render_loop.stop());
        assert!(!render_loop.stop());
        assert!(!render_loop.is_running());
    }

    #[test]
    fn no_callback_after_stop_returns() {
        let (tx, mut render_loop) = manual_loop();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        render_loop
            .start(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .expect("start");
        assert!(render_loop.is_running());

        for _ in 0..5 {
            tx.send(Instant::now()).expect("tick");
        }
        assert!(render_loop.stop());
        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert!(!render_loop.is_running());

        // Nobody is listening any more.
        let late = tx.send_timeout(Instant::now(), Duration::from_millis(50));
        assert!(late.is_err());
        assert_eq!(count.load(Ordering::SeqCst), 5);

        render_loop.stop();
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn restart_numbers_ticks_from_zero() {
        let (tx, mut render_loop) = manual_loop();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for _ in 0..2 {
            let s = Arc::clone(&seen);
            render_loop
                .start(move |t: FrameTick| s.lock().push(t.seq))
                .expect("start");
            for _ in 0..3 {
                tx.send(Instant::now()).expect("tick");
            }
            render_loop.stop();
        }
        assert_eq!(*seen.lock(), vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn closed_refresh_signal_ends_the_loop() {
        let (tx, mut render_loop) = manual_loop();
        render_loop.start(|_| {}).expect("start");
        drop(tx);
        let deadline = Instant::now() + Duration::from_secs(5);
        while render_loop.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!render_loop.is_running());
        render_loop.stop();
    }

    #[test]
    fn timer_loop_ticks_on_its_own() {
        let mut render_loop = RenderLoop::with_refresh_rate(500.0);
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        render_loop
            .start(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .expect("start");
        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        render_loop.stop();
        assert!(count.load(Ordering::SeqCst) >= 3);
    }
}
