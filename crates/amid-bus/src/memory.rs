//! In-process publisher
//!
//! Keeps every event it receives for the service tests. The discarding mode
//! used by `--dry-run` only logs and counts, so a long run stays bounded.

use amid_core::error::BusError;
use amid_core::models::BusEvent;
use amid_core::traits::BusPublisher;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info};

#[derive(Default)]
pub struct MemoryBusPublisher {
    events: Mutex<Vec<BusEvent>>,
    discard: bool,
    published: AtomicUsize,
    connected: AtomicBool,
    connects: AtomicUsize,
    closes: AtomicUsize,
    refuse_connect: AtomicBool,
    fail_after: Mutex<Option<usize>>,
}

impl MemoryBusPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count and log events without keeping them
    pub fn discarding() -> Self {
        Self {
            discard: true,
            ..Self::default()
        }
    }

    /// Make `connect` fail
    pub fn refusing_connections() -> Self {
        let bus = Self::default();
        bus.refuse_connect.store(true, Ordering::SeqCst);
        bus
    }

    /// Accept `count` events, then fail every publish
    pub fn failing_after(count: usize) -> Self {
        let bus = Self::default();
        *bus.fail_after.lock() = Some(count);
        bus
    }

    pub fn events(&self) -> Vec<BusEvent> {
        self.events.lock().clone()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.name.clone()).collect()
    }

    /// Events accepted, kept or not
    pub fn published(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }

    /// Successful `connect` calls
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// `close_connection` calls that actually closed a connection
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BusPublisher for MemoryBusPublisher {
    async fn connect(&self) -> Result<(), BusError> {
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(BusError::Connection("connection refused".to_string()));
        }
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.connects.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn publish(&self, event: &BusEvent) -> Result<(), BusError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BusError::NotConnected);
        }

        if let Some(limit) = *self.fail_after.lock() {
            if self.published() >= limit {
                return Err(BusError::Publish("broker unavailable".to_string()));
            }
        }

        self.published.fetch_add(1, Ordering::SeqCst);
        if self.discard {
            info!(routing_key = %event.routing_key(), "Dry run, bus event not published");
            return Ok(());
        }

        debug!(routing_key = %event.routing_key(), "Recorded bus event");
        self.events.lock().push(event.clone());
        Ok(())
    }

    async fn close_connection(&self) -> Result<(), BusError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
