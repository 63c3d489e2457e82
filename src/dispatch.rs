//! Inline or pooled hand-off of built events to a sink
//!
//! Inline dispatch delivers on the caller's thread. Pooled dispatch pushes
//! onto a bounded queue drained by a fixed set of worker threads: the caller
//! never waits, a full queue drops the event (and says so), and shutdown
//! drains whatever is still queued.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::config::SplunkConfig;
use crate::error::DeliveryError;
use crate::event::EventDocument;
use crate::transport::{Outcome, Sink};

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    disabled: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub disabled: u64,
    pub failed: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Inline,
    Pooled,
}

struct WorkerPool {
    sender: SyncSender<EventDocument>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn spawn(workers: usize, capacity: usize, sink: Arc<dyn Sink>, counters: Arc<Counters>) -> Self {
        let (sender, receiver) = mpsc::sync_channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .filter_map(|i| {
                let receiver = Arc::clone(&receiver);
                let sink = Arc::clone(&sink);
                let counters = Arc::clone(&counters);
                thread::Builder::new()
                    .name(format!("splunk-delivery-{}", i))
                    .spawn(move || worker_loop(&receiver, sink.as_ref(), &counters))
                    .map_err(|e| log::warn!("Failed to spawn delivery worker {}: {}", i, e))
                    .ok()
            })
            .collect();

        Self { sender, workers }
    }

    fn submit(&self, event: EventDocument) -> Result<(), DeliveryError> {
        match self.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DeliveryError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(DeliveryError::QueueClosed),
        }
    }

    fn join(self) {
        // Closing the channel lets workers finish the backlog and exit
        drop(self.sender);
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

fn worker_loop(receiver: &Mutex<Receiver<EventDocument>>, sink: &dyn Sink, counters: &Counters) {
    loop {
        let next = match receiver.lock() {
            Ok(receiver) => receiver.recv(),
            Err(_) => return,
        };
        match next {
            Ok(event) => deliver_one(sink, counters, &event),
            Err(_) => return,
        }
    }
}

fn deliver_one(sink: &dyn Sink, counters: &Counters, event: &EventDocument) {
    let result = catch_unwind(AssertUnwindSafe(|| sink.try_deliver(event)));
    match result {
        Ok(Ok(Outcome::Delivered)) => {
            counters.delivered.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Ok(Outcome::Disabled)) => {
            counters.disabled.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Err(e)) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            sink.report(&e);
        }
        Err(_) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Hands events to a sink according to the configured delivery mode
pub struct Dispatcher {
    sink: Arc<dyn Sink>,
    mode: Mode,
    pool: Mutex<Option<WorkerPool>>,
    counters: Arc<Counters>,
}

impl Dispatcher {
    /// Deliver on the caller's thread
    pub fn inline(sink: Arc<dyn Sink>) -> Self {
        Self {
            sink,
            mode: Mode::Inline,
            pool: Mutex::new(None),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Deliver on `workers` background threads through a queue of `capacity` events
    pub fn pooled(sink: Arc<dyn Sink>, workers: usize, capacity: usize) -> Self {
        let counters = Arc::new(Counters::default());
        let pool = WorkerPool::spawn(workers, capacity, Arc::clone(&sink), Arc::clone(&counters));
        log::debug!("Started {} delivery workers, queue capacity {}", pool.workers.len(), capacity);

        Self {
            sink,
            mode: Mode::Pooled,
            pool: Mutex::new(Some(pool)),
            counters,
        }
    }

    /// Pooled when `threaded`, unless delivery is disabled and there is nothing to queue
    pub fn from_config(config: &SplunkConfig, sink: Arc<dyn Sink>) -> Self {
        if config.threaded && config.enabled {
            Self::pooled(sink, config.workers, config.queue_capacity)
        } else {
            Self::inline(sink)
        }
    }

    pub fn is_pooled(&self) -> bool {
        self.mode == Mode::Pooled
    }

    /// Hand off one event. Never blocks on the network in pooled mode and never fails.
    pub fn dispatch(&self, event: EventDocument) {
        if self.mode == Mode::Inline {
            deliver_one(self.sink.as_ref(), &self.counters, &event);
            return;
        }

        let submitted = match self.pool.lock() {
            Ok(pool) => match pool.as_ref() {
                Some(pool) => pool.submit(event),
                None => Err(DeliveryError::QueueClosed),
            },
            Err(_) => Err(DeliveryError::QueueClosed),
        };

        if let Err(e) = submitted {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            self.sink.report(&e);
        }
    }

    pub fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            disabled: self.counters.disabled.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting events, drain the queue and join the workers
    pub fn shutdown(&self) {
        let pool = match self.pool.lock() {
            Ok(mut pool) => pool.take(),
            Err(_) => None,
        };
        if let Some(pool) = pool {
            pool.join();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
