//! Periodic-work scheduler. One dedicated thread drives every registered
//! callback sequentially; callbacks are expected to be non-blocking. Uses
//! monotonic time throughout so wall-clock jumps never fire work early.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

const TICK: Duration = Duration::from_millis(100);

type Callback = Box<dyn FnMut() + Send>;

struct Registration {
    callback: Callback,
    period: Duration,
    next_due: Instant,
}

struct Shared {
    registrations: Mutex<Vec<Registration>>,
    shutdown: AtomicBool,
}

/// Recurring-callback scheduler backed by one thread.
pub struct Timer {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Timer {
    pub fn new() -> Timer {
        let shared = Arc::new(Shared {
            registrations: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
        });
        let worker = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("tapstack-timer".to_string())
            .spawn(move || run(worker))
            .ok();
        Timer { shared, thread }
    }

    /// Schedule `callback` to run every `period`, first firing one period
    /// from now.
    pub fn register<F>(&self, callback: F, period: Duration)
    where
        F: FnMut() + Send + 'static,
    {
        let mut registrations = self.shared.registrations.lock();
        registrations.push(Registration {
            callback: Box::new(callback),
            period,
            next_due: Instant::now() + period,
        });
    }

    /// Signal the teardown window. No callback runs after this returns.
    pub fn shutdown(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(shared: Arc<Shared>) {
    loop {
        thread::sleep(TICK);
        if shared.shutdown.load(Ordering::SeqCst) {
            trace!("timer thread observed shutdown");
            return;
        }
        let now = Instant::now();
        let mut registrations = shared.registrations.lock();
        for registration in registrations.iter_mut() {
            if shared.shutdown.load(Ordering::SeqCst) {
                return;
            }
            if now >= registration.next_due {
                (registration.callback)();
                registration.next_due = now + registration.period;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn registered_callback_fires_repeatedly() {
        let mut timer = Timer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        timer.register(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            Duration::from_millis(100),
        );
        thread::sleep(Duration::from_millis(450));
        timer.shutdown();
        let count = fired.load(Ordering::SeqCst);
        assert!(count >= 2, "expected at least 2 firings, got {count}");
    }

    #[test]
    fn no_callback_after_shutdown() {
        let mut timer = Timer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        timer.register(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            Duration::from_millis(100),
        );
        timer.shutdown();
        let after_shutdown = fired.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(300));
        assert_eq!(fired.load(Ordering::SeqCst), after_shutdown);
    }
}
