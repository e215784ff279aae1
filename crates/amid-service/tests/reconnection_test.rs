// tests/reconnection_test.rs
//! AmiService against the scripted AMI server and the in-memory bus

use amid_ami::simulator::{AmiSimulator, FrameBuilder, Session};
use amid_ami::ConnectionState;
use amid_bus::MemoryBusPublisher;
use amid_core::config::AppConfig;
use amid_core::error::BusError;
use amid_core::models::BusEvent;
use amid_core::traits::BusPublisher;
use amid_service::{AmiService, ServiceError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};

const DELAY: Duration = Duration::from_millis(200);
const WITHIN: Duration = Duration::from_secs(5);

fn config_for(sim: &AmiSimulator) -> AppConfig {
    let mut config = AppConfig::default();
    config.ami.host = "127.0.0.1".to_string();
    config.ami.port = sim.port();
    config.ami.connect_timeout_secs = 1;
    config.ami.login_timeout_secs = 1;
    config
}

/// Bus whose calls can be held open
#[derive(Default)]
struct GatedBus {
    stall_connect: bool,
    stall_publish: bool,
    hold_first_publish: bool,
    release: Notify,
    attempts: AtomicUsize,
    published: Mutex<Vec<String>>,
    closes: AtomicUsize,
}

impl GatedBus {
    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }

    async fn wait_for_attempt(&self) {
        let deadline = Instant::now() + WITHIN;
        while self.attempts() == 0 && Instant::now() < deadline {
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(self.attempts(), 1);
    }
}

#[async_trait]
impl BusPublisher for GatedBus {
    async fn connect(&self) -> Result<(), BusError> {
        if self.stall_connect {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn publish(&self, event: &BusEvent) -> Result<(), BusError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.stall_publish {
            std::future::pending::<()>().await;
        }
        if self.hold_first_publish && attempt == 0 {
            self.release.notified().await;
        }
        self.published.lock().unwrap().push(event.name.clone());
        Ok(())
    }

    async fn close_connection(&self) -> Result<(), BusError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}

fn three_events() -> Session {
    Session::accept().send(format!(
        "{}{}{}",
        FrameBuilder::event("Newchannel").build(),
        FrameBuilder::event("Newstate").build(),
        FrameBuilder::event("Hangup").build(),
    ))
}

fn service_for(sim: &AmiSimulator, bus: Arc<MemoryBusPublisher>) -> Arc<AmiService> {
    Arc::new(AmiService::new(&config_for(sim), bus).with_reconnect_delay(DELAY))
}

#[tokio::test]
async fn test_publishes_messages_in_arrival_order() {
    let session = Session::accept().send(format!(
        "{}{}{}",
        FrameBuilder::event("Newchannel").header("Uniqueid", "1").build(),
        FrameBuilder::event("Newstate").header("Uniqueid", "1").build(),
        FrameBuilder::event("Hangup").header("Uniqueid", "1").build(),
    ));
    let sim = AmiSimulator::start(vec![session]).await.unwrap();
    let bus = Arc::new(MemoryBusPublisher::new());
    let config = config_for(&sim);
    let service = Arc::new(AmiService::new(&config, bus.clone()).with_reconnect_delay(DELAY));

    let runner = tokio::spawn({
        let service = service.clone();
        async move { service.run().await }
    });

    let deadline = Instant::now() + WITHIN;
    while bus.published() < 3 && Instant::now() < deadline {
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(service.state(), ConnectionState::Streaming);

    service.stop();
    timeout(WITHIN, runner).await.unwrap().unwrap().unwrap();

    assert_eq!(bus.event_names(), vec!["Newchannel", "Newstate", "Hangup"]);
    let events = bus.events();
    assert_eq!(events[2].routing_key(), "ami.Hangup");
    assert_eq!(events[2].required_access, "event.ami.Hangup");
    assert_eq!(events[2].data.get("Uniqueid"), Some("1"));
    assert!(events.iter().all(|e| e.origin_uuid == config.service.uuid));
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    let closing = Session::accept()
        .send_frame(FrameBuilder::event("FullyBooted"))
        .close();
    let sim = AmiSimulator::start(vec![closing]).await.unwrap();
    let bus = Arc::new(MemoryBusPublisher::new());
    let service = service_for(&sim, bus.clone());

    let runner = tokio::spawn({
        let service = service.clone();
        async move { service.run().await }
    });

    assert!(sim.wait_for_connections(3, WITHIN).await);
    for interval in sim.reconnect_intervals() {
        assert!(interval >= DELAY - Duration::from_millis(20), "{:?}", interval);
    }
    assert!(!runner.is_finished());

    service.stop();
    let result = timeout(WITHIN, runner).await.unwrap().unwrap();
    assert_eq!(result, Ok(()));
    assert!(bus.event_names().iter().all(|name| name == "FullyBooted"));
    assert!(bus.published() >= 2);
}

#[tokio::test]
async fn test_retries_while_server_rejects_login() {
    let sim = AmiSimulator::start(vec![Session::reject("Authentication failed")])
        .await
        .unwrap();
    let bus = Arc::new(MemoryBusPublisher::new());
    let service = service_for(&sim, bus.clone());

    let runner = tokio::spawn({
        let service = service.clone();
        async move { service.run().await }
    });

    assert!(sim.wait_for_connections(2, WITHIN).await);
    assert!(sim.logins().len() >= 2);

    service.stop();
    assert_eq!(timeout(WITHIN, runner).await.unwrap().unwrap(), Ok(()));
    assert_eq!(bus.published(), 0);
}

#[tokio::test]
async fn test_stop_closes_everything_once() {
    let sim = AmiSimulator::start(vec![Session::accept()]).await.unwrap();
    let bus = Arc::new(MemoryBusPublisher::new());
    let service = service_for(&sim, bus.clone());

    let runner = tokio::spawn({
        let service = service.clone();
        async move { service.run().await }
    });

    assert!(sim.wait_for_connections(1, WITHIN).await);
    sleep(Duration::from_millis(50)).await;

    let stopped_at = Instant::now();
    service.stop();
    service.stop();
    assert_eq!(timeout(WITHIN, runner).await.unwrap().unwrap(), Ok(()));
    assert!(stopped_at.elapsed() < DELAY + Duration::from_secs(1));

    assert!(sim.wait_for_client_disconnects(1, WITHIN).await);
    assert_eq!(sim.client_disconnects(), 1);
    assert_eq!(bus.connect_count(), 1);
    assert_eq!(bus.close_count(), 1);
    assert!(!bus.is_connected());
    assert_eq!(service.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_stop_during_reconnect_wait() {
    let sim = AmiSimulator::start(vec![Session::accept().close()]).await.unwrap();
    let bus = Arc::new(MemoryBusPublisher::new());
    let service = Arc::new(
        AmiService::new(&config_for(&sim), bus.clone()).with_reconnect_delay(Duration::from_secs(30)),
    );

    let runner = tokio::spawn({
        let service = service.clone();
        async move { service.run().await }
    });

    assert!(sim.wait_for_connections(1, WITHIN).await);
    sleep(Duration::from_millis(100)).await;

    service.stop();
    assert_eq!(timeout(WITHIN, runner).await.unwrap().unwrap(), Ok(()));
    assert_eq!(sim.connections(), 1);
    assert_eq!(bus.close_count(), 1);
}

#[tokio::test]
async fn test_publish_failure_is_fatal() {
    let session = Session::accept().send(format!(
        "{}{}",
        FrameBuilder::event("Newchannel").build(),
        FrameBuilder::event("Hangup").build(),
    ));
    let sim = AmiSimulator::start(vec![session]).await.unwrap();
    let bus = Arc::new(MemoryBusPublisher::failing_after(1));
    let service = service_for(&sim, bus.clone());

    let result = timeout(WITHIN, service.run()).await.unwrap();

    assert_eq!(
        result,
        Err(ServiceError::Bus(BusError::Publish("broker unavailable".to_string())))
    );
    assert_eq!(bus.event_names(), vec!["Newchannel"]);
    assert_eq!(bus.close_count(), 1);
    assert!(sim.wait_for_client_disconnects(1, WITHIN).await);
    assert_eq!(sim.connections(), 1);
}

#[tokio::test]
async fn test_bus_connect_failure_is_fatal() {
    let sim = AmiSimulator::start(vec![Session::accept()]).await.unwrap();
    let bus = Arc::new(MemoryBusPublisher::refusing_connections());
    let service = service_for(&sim, bus.clone());

    let err = timeout(WITHIN, service.run()).await.unwrap().unwrap_err();

    assert!(matches!(err, ServiceError::Bus(BusError::Connection(_))));
    assert_eq!(sim.connections(), 0);
}

#[tokio::test]
async fn test_second_run_is_rejected() {
    let sim = AmiSimulator::start(vec![Session::accept()]).await.unwrap();
    let bus = Arc::new(MemoryBusPublisher::new());
    let service = service_for(&sim, bus.clone());

    let runner = tokio::spawn({
        let service = service.clone();
        async move { service.run().await }
    });
    assert!(sim.wait_for_connections(1, WITHIN).await);

    assert_eq!(service.run().await, Err(ServiceError::AlreadyRunning));

    service.stop();
    assert_eq!(timeout(WITHIN, runner).await.unwrap().unwrap(), Ok(()));
    assert_eq!(sim.connections(), 1);
}

#[tokio::test]
async fn test_stop_abandons_stalled_publish() {
    let sim = AmiSimulator::start(vec![three_events()]).await.unwrap();
    let bus = Arc::new(GatedBus {
        stall_publish: true,
        ..GatedBus::default()
    });
    let service = Arc::new(AmiService::new(&config_for(&sim), bus.clone()).with_reconnect_delay(DELAY));

    let runner = tokio::spawn({
        let service = service.clone();
        async move { service.run().await }
    });
    bus.wait_for_attempt().await;

    service.stop();
    let result = timeout(Duration::from_secs(2), runner).await.unwrap().unwrap();

    assert_eq!(result, Ok(()));
    assert!(bus.published().is_empty());
    assert_eq!(bus.closes.load(Ordering::SeqCst), 1);
    assert!(sim.wait_for_client_disconnects(1, WITHIN).await);
}

#[tokio::test]
async fn test_stop_interrupts_stalled_bus_connect() {
    let sim = AmiSimulator::start(vec![Session::accept()]).await.unwrap();
    let bus = Arc::new(GatedBus {
        stall_connect: true,
        ..GatedBus::default()
    });
    let service = Arc::new(AmiService::new(&config_for(&sim), bus.clone()).with_reconnect_delay(DELAY));

    let runner = tokio::spawn({
        let service = service.clone();
        async move { service.run().await }
    });
    sleep(Duration::from_millis(300)).await;

    service.stop();
    let result = timeout(Duration::from_secs(2), runner).await.unwrap().unwrap();

    assert_eq!(result, Ok(()));
    assert_eq!(sim.connections(), 0);
    assert_eq!(bus.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_mid_batch_finishes_in_flight_publish() {
    let sim = AmiSimulator::start(vec![three_events()]).await.unwrap();
    let bus = Arc::new(GatedBus {
        hold_first_publish: true,
        ..GatedBus::default()
    });
    let service = Arc::new(
        AmiService::new(&config_for(&sim), bus.clone()).with_reconnect_delay(Duration::from_secs(5)),
    );

    let runner = tokio::spawn({
        let service = service.clone();
        async move { service.run().await }
    });
    bus.wait_for_attempt().await;
    assert_eq!(service.state(), ConnectionState::Streaming);

    service.stop();
    assert_eq!(service.state(), ConnectionState::Draining);
    sleep(Duration::from_millis(100)).await;
    assert!(!runner.is_finished());

    bus.release.notify_one();
    assert_eq!(timeout(WITHIN, runner).await.unwrap().unwrap(), Ok(()));

    assert_eq!(bus.published(), vec!["Newchannel"]);
    assert_eq!(bus.attempts(), 1);
    assert_eq!(service.state(), ConnectionState::Disconnected);
    assert_eq!(bus.closes.load(Ordering::SeqCst), 1);
}
