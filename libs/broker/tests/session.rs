use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use broker::{
    BrokerConnection, ConnectionParameters, Connector, DeliveryStream, SecureTransport,
    SessionManager, SessionState, Supervisor,
};
use subscriber_api::{Delivery, ErrorKind, MessageHandler, SecretsDir, Sleeper, SubscriberError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ═══════════════════════════════════════════════════════════════
//  Fakes
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
struct FakeBroker {
    /// Сколько первых connect'ов должно упасть.
    failures: AtomicUsize,
    attempts: AtomicUsize,
    closes: AtomicUsize,
    tls_seen: Mutex<Vec<bool>>,
    subscriptions: Mutex<Vec<String>>,
    /// Каждое успешное соединение отдаёт сюда свой канал доставки.
    sessions: Mutex<Option<mpsc::UnboundedSender<mpsc::UnboundedSender<Delivery>>>>,
}

struct FakeConnector(Arc<FakeBroker>);

impl Connector for FakeConnector {
    fn connect<'a>(
        &'a self,
        _params: &'a ConnectionParameters,
        tls: Option<SecureTransport>,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn BrokerConnection>, SubscriberError>> + Send + 'a>> {
        Box::pin(async move {
            let broker = &self.0;
            broker.attempts.fetch_add(1, Ordering::SeqCst);
            broker.tls_seen.lock().unwrap().push(tls.is_some());

            let remaining = broker.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                broker.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(SubscriberError::connection("connection refused"));
            }

            let (tx, rx) = mpsc::unbounded_channel();
            if let Some(sessions) = broker.sessions.lock().unwrap().as_ref() {
                let _ = sessions.send(tx);
            }
            Ok(Box::new(FakeConnection { broker: broker.clone(), rx: Some(rx) }) as Box<dyn BrokerConnection>)
        })
    }
}

struct FakeConnection {
    broker: Arc<FakeBroker>,
    rx: Option<mpsc::UnboundedReceiver<Delivery>>,
}

impl BrokerConnection for FakeConnection {
    fn subscribe<'a>(
        &'a mut self,
        topic: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), SubscriberError>> + Send + 'a>> {
        Box::pin(async move {
            self.broker.subscriptions.lock().unwrap().push(topic.to_string());
            Ok(())
        })
    }

    fn deliveries(&mut self) -> Result<Box<dyn DeliveryStream>, SubscriberError> {
        let rx = self.rx.take().ok_or_else(|| SubscriberError::connection("already started"))?;
        Ok(Box::new(FakeStream(rx)))
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.broker.closes.fetch_add(1, Ordering::SeqCst);
        })
    }
}

struct FakeStream(mpsc::UnboundedReceiver<Delivery>);

impl DeliveryStream for FakeStream {
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<Delivery>, SubscriberError>> + Send + '_>> {
        Box::pin(async move { Ok(self.0.recv().await) })
    }
}

#[derive(Default)]
struct RecordingSleeper(Mutex<Vec<Duration>>);

impl RecordingSleeper {
    fn sleeps(&self) -> Vec<Duration> {
        self.0.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.0.lock().unwrap().push(duration);
        Box::pin(tokio::task::yield_now())
    }
}

/// Пересылает payload'ы в тест; опционально считает параллельные вызовы.
struct ForwardingHandler {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    work: Duration,
}

impl ForwardingHandler {
    fn new(work: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = Self { tx, active: AtomicUsize::new(0), max_active: AtomicUsize::new(0), work };
        (Arc::new(handler), rx)
    }
}

impl MessageHandler for ForwardingHandler {
    fn on_message(&self, delivery: Delivery) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.work);
        if let Delivery::Binary(msg) = delivery {
            let _ = self.tx.send(msg.as_bytes().to_vec());
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

fn params() -> ConnectionParameters {
    ConnectionParameters {
        broker_url: "tcp://localhost:1883".into(),
        user_name: Some("subscriber".into()),
        password: Some("pw".into()),
        keystore_file: None,
        truststore_file: None,
        store_password: None,
        topic: "VSD".into(),
        client_id: "test".into(),
        keep_alive: Duration::from_secs(30),
    }
}

fn manager_with(params: ConnectionParameters, broker: &Arc<FakeBroker>) -> SessionManager {
    SessionManager::new(
        Arc::new(params),
        Arc::new(FakeConnector(broker.clone())),
        Arc::new(SecretsDir::new("/nonexistent")),
    )
}

// ═══════════════════════════════════════════════════════════════
//  SessionManager
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn walks_through_states() {
    let broker = Arc::new(FakeBroker::default());
    let mut manager = manager_with(params(), &broker);
    let (handler, _rx) = ForwardingHandler::new(Duration::ZERO);

    assert_eq!(manager.state(), SessionState::Disconnected);
    manager.open().await.unwrap();
    assert_eq!(manager.state(), SessionState::Connecting);
    manager.subscribe("VSD", handler).await.unwrap();
    assert_eq!(manager.state(), SessionState::Subscribed);
    manager.start().unwrap();
    assert_eq!(manager.state(), SessionState::Running);

    assert_eq!(*broker.subscriptions.lock().unwrap(), vec!["VSD".to_string()]);
    assert_eq!(*broker.tls_seen.lock().unwrap(), vec![false]);

    manager.close().await;
    assert_eq!(manager.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn close_is_idempotent() {
    let broker = Arc::new(FakeBroker::default());
    let mut manager = manager_with(params(), &broker);

    // Ничего не открыто
    manager.close().await;
    assert_eq!(broker.closes.load(Ordering::SeqCst), 0);

    manager.open().await.unwrap();
    manager.close().await;
    manager.close().await;
    assert_eq!(broker.closes.load(Ordering::SeqCst), 1);
    assert_eq!(manager.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn subscribe_before_open_fails() {
    let broker = Arc::new(FakeBroker::default());
    let mut manager = manager_with(params(), &broker);
    let (handler, _rx) = ForwardingHandler::new(Duration::ZERO);

    let err = manager.subscribe("VSD", handler).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(broker.subscriptions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn start_requires_subscription_and_is_idempotent() {
    let broker = Arc::new(FakeBroker::default());
    let mut manager = manager_with(params(), &broker);
    let (handler, _rx) = ForwardingHandler::new(Duration::ZERO);

    assert_eq!(manager.start().unwrap_err().kind(), ErrorKind::Connection);

    manager.open().await.unwrap();
    assert_eq!(manager.start().unwrap_err().kind(), ErrorKind::Connection);

    manager.subscribe("VSD", handler).await.unwrap();
    manager.start().unwrap();
    manager.start().unwrap();
    assert_eq!(manager.state(), SessionState::Running);
    manager.close().await;
}

#[tokio::test]
async fn deliveries_are_handled_one_at_a_time() {
    let broker = Arc::new(FakeBroker::default());
    let (sessions_tx, mut sessions_rx) = mpsc::unbounded_channel();
    *broker.sessions.lock().unwrap() = Some(sessions_tx);

    let mut manager = manager_with(params(), &broker);
    let (handler, mut received) = ForwardingHandler::new(Duration::from_millis(20));

    manager.open().await.unwrap();
    manager.subscribe("VSD", handler.clone()).await.unwrap();
    manager.start().unwrap();

    let tx = sessions_rx.recv().await.unwrap();
    for i in 0..5u8 {
        tx.send(Delivery::from_payload("VSD", vec![i])).unwrap();
    }
    for i in 0..5u8 {
        assert_eq!(received.recv().await.unwrap(), vec![i]);
    }
    assert_eq!(handler.max_active.load(Ordering::SeqCst), 1);

    // Брокер закрыл сессию
    drop(tx);
    manager.closed().await.unwrap();
    manager.close().await;
}

#[tokio::test]
async fn bad_store_fails_open_without_connecting() {
    let broker = Arc::new(FakeBroker::default());
    let mut p = params();
    p.keystore_file = Some("/nonexistent/client.pem".into());
    p.truststore_file = Some("/nonexistent/ca.pem".into());
    let mut manager = manager_with(p, &broker);

    let err = manager.open().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert_eq!(broker.attempts.load(Ordering::SeqCst), 0);
    assert_eq!(manager.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn single_store_means_plain_transport() {
    let broker = Arc::new(FakeBroker::default());
    let mut p = params();
    p.keystore_file = Some("/nonexistent/client.pem".into());
    let mut manager = manager_with(p, &broker);

    manager.open().await.unwrap();
    assert_eq!(*broker.tls_seen.lock().unwrap(), vec![false]);
    manager.close().await;
}

#[tokio::test]
async fn tls_configuration_is_built_once() {
    let dir = tempfile::tempdir().unwrap();
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let keystore = dir.path().join("client.pem");
    let truststore = dir.path().join("ca.pem");
    std::fs::write(&keystore, format!("{}{}", cert.pem(), key_pair.serialize_pem())).unwrap();
    std::fs::write(&truststore, cert.pem()).unwrap();

    let broker = Arc::new(FakeBroker::default());
    let mut p = params();
    p.broker_url = "ssl://localhost:8883".into();
    p.keystore_file = Some(keystore.to_string_lossy().into_owned());
    p.truststore_file = Some(truststore.to_string_lossy().into_owned());
    let mut manager = manager_with(p, &broker);

    manager.open().await.unwrap();
    manager.close().await;

    // Хранилища больше не читаются
    std::fs::remove_file(&keystore).unwrap();
    std::fs::remove_file(&truststore).unwrap();
    manager.open().await.unwrap();
    manager.close().await;

    assert_eq!(*broker.tls_seen.lock().unwrap(), vec![true, true]);
}

// ═══════════════════════════════════════════════════════════════
//  Supervisor
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn connect_retries_with_fixed_delay() {
    let broker = Arc::new(FakeBroker::default());
    broker.failures.store(3, Ordering::SeqCst);
    let mut manager = manager_with(params(), &broker);
    let sleeper = Arc::new(RecordingSleeper::default());
    let supervisor = Supervisor::new(Duration::from_secs(30), sleeper.clone());
    let (handler, _rx) = ForwardingHandler::new(Duration::ZERO);

    let attempts = supervisor.connect(&mut manager, handler).await;

    assert_eq!(attempts, 4);
    assert_eq!(broker.attempts.load(Ordering::SeqCst), 4);
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(30); 3]);
    assert_eq!(manager.state(), SessionState::Running);
    manager.close().await;
}

#[tokio::test]
async fn config_errors_are_retried_too() {
    let broker = Arc::new(FakeBroker::default());
    let mut p = params();
    p.keystore_file = Some("/nonexistent/client.pem".into());
    p.truststore_file = Some("/nonexistent/ca.pem".into());
    let mut manager = manager_with(p, &broker);
    let sleeper = Arc::new(RecordingSleeper::default());
    let supervisor = Supervisor::new(Duration::from_secs(5), sleeper.clone());
    let (handler, _rx) = ForwardingHandler::new(Duration::ZERO);

    // Успеха не будет никогда: проверяем, что цикл не выходит с ошибкой
    let result = tokio::time::timeout(
        Duration::from_millis(50),
        supervisor.connect(&mut manager, handler),
    )
    .await;
    assert!(result.is_err());
    assert!(sleeper.sleeps().len() > 1);
    assert_eq!(broker.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn run_reconnects_after_session_loss_until_cancelled() {
    let broker = Arc::new(FakeBroker::default());
    let (sessions_tx, mut sessions_rx) = mpsc::unbounded_channel();
    *broker.sessions.lock().unwrap() = Some(sessions_tx);

    let mut manager = manager_with(params(), &broker);
    let sleeper = Arc::new(RecordingSleeper::default());
    let supervisor = Supervisor::new(Duration::from_secs(30), sleeper.clone());
    let (handler, mut received) = ForwardingHandler::new(Duration::ZERO);
    let cancel = CancellationToken::new();

    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { supervisor.run(&mut manager, handler, cancel).await })
    };

    let first = sessions_rx.recv().await.unwrap();
    first.send(Delivery::from_payload("VSD", vec![1])).unwrap();
    assert_eq!(received.recv().await.unwrap(), vec![1]);

    // Потеря сессии: новый connect, та же подписка
    drop(first);
    let second = sessions_rx.recv().await.unwrap();
    second.send(Delivery::from_payload("VSD", vec![2])).unwrap();
    assert_eq!(received.recv().await.unwrap(), vec![2]);

    cancel.cancel();
    task.await.unwrap();

    assert_eq!(broker.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(broker.closes.load(Ordering::SeqCst), 2);
    assert_eq!(*broker.subscriptions.lock().unwrap(), vec!["VSD".to_string(), "VSD".to_string()]);
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(30)]);
}
