//! Change coalescing: a burst of change events produces one rescan.
//!
//! A `Debouncer` owns a worker thread that waits for the first event, then
//! keeps absorbing events until the configured quiet period passes without
//! one, and only then runs its action once with everything it collected.
//! Pending work can be cancelled, and dropping the debouncer cancels and
//! joins the worker so nothing runs against a torn-down page.

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

/// Kinds of change that can move footnote references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeEvent {
    /// Article or viewport geometry changed (e.g. an image finished loading).
    ContainerResize,
    /// Nodes inside the article were added, removed, or replaced.
    ContentMutation,
}

/// Messages from handles to the worker.
#[derive(Debug, Clone, Copy)]
enum Signal {
    /// Discard whatever is pending.
    Cancel,
    /// A change happened.
    Change(ChangeEvent),
    /// Stop the worker without running pending work.
    Shutdown,
}

/// Cloneable, thread-safe handle for reporting changes to a `Debouncer`.
#[derive(Debug, Clone)]
pub struct Trigger {
    /// Channel into the worker.
    tx: Sender<Signal>,
}

impl Trigger {
    /// Drop any burst still waiting for its quiet period.
    pub fn cancel(&self) {
        let _ = self.tx.send(Signal::Cancel);
    }

    /// Report a change. Ignored once the debouncer is gone.
    pub fn notify(&self, event: ChangeEvent) {
        let _ = self.tx.send(Signal::Change(event));
    }
}

/// Cancellable deferred action fired at most once per quiet window.
#[derive(Debug)]
pub struct Debouncer {
    /// Channel into the worker.
    tx: Sender<Signal>,
    /// Worker thread, taken on drop.
    worker: Option<JoinHandle<()>>,
}

impl Debouncer {
    /// Start the worker. `action` receives the distinct events of each burst,
    /// in first-seen order.
    ///
    /// # Errors
    ///
    /// Returns `std::io::Error` if the worker thread cannot be spawned.
    pub fn spawn<F>(delay: Duration, action: F) -> std::io::Result<Self>
    where
        F: FnMut(Vec<ChangeEvent>) + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = std::thread::Builder::new()
            .name("sidenotes-debounce".to_string())
            .spawn(move || return run_worker(&rx, delay, action))?;
        return Ok(Self {
            tx,
            worker: Some(worker),
        });
    }

    /// A handle that other threads (e.g. a filesystem watcher) can notify through.
    pub fn trigger(&self) -> Trigger {
        return Trigger { tx: self.tx.clone() };
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        let _ = self.tx.send(Signal::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Worker loop: block for the first change, then coalesce until quiet.
fn run_worker<F>(rx: &Receiver<Signal>, delay: Duration, mut action: F)
where
    F: FnMut(Vec<ChangeEvent>),
{
    loop {
        let first = match rx.recv() {
            Ok(Signal::Change(event)) => event,
            Ok(Signal::Cancel) => continue,
            Ok(Signal::Shutdown) | Err(_) => return,
        };

        let mut burst = vec![first];
        let mut cancelled = false;
        loop {
            match rx.recv_timeout(delay) {
                Ok(Signal::Change(event)) => {
                    if !burst.contains(&event) {
                        burst.push(event);
                    }
                },
                Ok(Signal::Cancel) => {
                    cancelled = true;
                    break;
                },
                Ok(Signal::Shutdown) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => break,
            }
        }

        if cancelled {
            log::debug!("pending rescan cancelled");
            continue;
        }
        action(burst);
    }
}
