use std::sync::Arc;

use subscriber_api::{MessageHandler, SecretResolver, SubscriberError};
use tokio::task::JoinHandle;

use crate::{tls, BrokerConnection, ConnectionParameters, Connector, SecureTransport};

// ═══════════════════════════════════════════════════════════════
//  Session state machine
// ═══════════════════════════════════════════════════════════════

/// Состояние сессии с брокером.
///
/// `Disconnected → Connecting → Subscribed → Running`; при любой ошибке
/// `close()` возвращает в `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    /// Соединение открыто, подписки ещё нет.
    Connecting,
    Subscribed,
    Running,
}

/// Владелец единственной сессии: соединение, подписка, consumer.
///
/// Новая сессия после сбоя полностью заменяет старые handle'ы.
pub struct SessionManager {
    params: Arc<ConnectionParameters>,
    connector: Arc<dyn Connector>,
    secrets: Arc<dyn SecretResolver>,
    /// TLS конфигурация собирается один раз и переиспользуется.
    tls: Option<SecureTransport>,
    state: SessionState,
    connection: Option<Box<dyn BrokerConnection>>,
    handler: Option<Arc<dyn MessageHandler>>,
    consumer: Option<JoinHandle<Result<(), SubscriberError>>>,
}

impl SessionManager {
    pub fn new(
        params: Arc<ConnectionParameters>,
        connector: Arc<dyn Connector>,
        secrets: Arc<dyn SecretResolver>,
    ) -> Self {
        Self {
            params,
            connector,
            secrets,
            tls: None,
            state: SessionState::Disconnected,
            connection: None,
            handler: None,
            consumer: None,
        }
    }

    pub fn params(&self) -> &ConnectionParameters {
        &self.params
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Открыть соединение. TLS используется, только если заданы оба хранилища.
    pub async fn open(&mut self) -> Result<(), SubscriberError> {
        if self.connection.is_some() {
            return Ok(());
        }

        let tls = if self.params.has_stores() {
            Some(self.secure_transport()?)
        } else {
            None
        };

        let connection = self.connector.connect(&self.params, tls).await?;
        self.connection = Some(connection);
        self.state = SessionState::Connecting;
        Ok(())
    }

    fn secure_transport(&mut self) -> Result<SecureTransport, SubscriberError> {
        if let Some(tls) = &self.tls {
            return Ok(tls.clone());
        }
        let built = tls::build(&self.params, &*self.secrets)?;
        self.tls = Some(built.clone());
        Ok(built)
    }

    /// Подписаться на topic и зарегистрировать обработчик.
    pub async fn subscribe(
        &mut self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), SubscriberError> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| SubscriberError::connection("subscribe called before open"))?;

        connection.subscribe(topic).await?;
        self.handler = Some(handler);
        self.state = SessionState::Subscribed;
        Ok(())
    }

    /// Запустить доставку. Повторный вызов ничего не делает.
    pub fn start(&mut self) -> Result<(), SubscriberError> {
        if self.consumer.is_some() {
            return Ok(());
        }
        let (Some(connection), Some(handler)) = (self.connection.as_mut(), self.handler.clone()) else {
            return Err(SubscriberError::connection("start called before subscribe"));
        };

        let mut stream = connection.deliveries()?;
        let topic = self.params.topic.clone();

        self.consumer = Some(tokio::spawn(async move {
            loop {
                let delivery = match stream.next().await {
                    Ok(Some(delivery)) => delivery,
                    Ok(None) => {
                        tracing::info!(%topic, "broker closed the session");
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                };

                // Один обработчик за раз: следующее сообщение ждёт завершения предыдущего
                let handler = handler.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || handler.on_message(delivery)).await {
                    tracing::error!(%topic, error = %e, "message handler panicked");
                }
            }
        }));
        self.state = SessionState::Running;
        tracing::info!(topic = %self.params.topic, "delivery started");
        Ok(())
    }

    /// Дождаться окончания доставки: ошибка потока или отключение брокером.
    ///
    /// Без запущенной доставки возвращает сразу.
    pub async fn closed(&mut self) -> Result<(), SubscriberError> {
        let Some(consumer) = self.consumer.as_mut() else {
            return Ok(());
        };
        let result = match consumer.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(SubscriberError::new(format!("delivery task failed: {e}"))),
        };
        self.consumer = None;
        result
    }

    /// Закрыть consumer, подписку и соединение. Ошибок не бывает, идемпотентно.
    pub async fn close(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            consumer.abort();
            let _ = consumer.await;
        }
        self.handler = None;
        if let Some(mut connection) = self.connection.take() {
            connection.close().await;
            tracing::debug!("broker connection closed");
        }
        self.state = SessionState::Disconnected;
    }
}
