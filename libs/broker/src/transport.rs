use std::future::Future;
use std::pin::Pin;

use subscriber_api::{Delivery, SubscriberError};

use crate::{ConnectionParameters, SecureTransport};

// ════════════════════════════════════════════════════════════════
//  Broker seam
// ════════════════════════════════════════════════════════════════

/// Фабрика соединений с брокером.
///
/// Реализации: `MqttConnector` (rumqttc). Тесты подставляют свою.
pub trait Connector: Send + Sync {
    /// Установить соединение и дождаться подтверждения от брокера
    /// (ошибки аутентификации, DNS и сети всплывают здесь).
    ///
    /// `tls` передаётся, только если настроены оба хранилища.
    fn connect<'a>(
        &'a self,
        params: &'a ConnectionParameters,
        tls: Option<SecureTransport>,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn BrokerConnection>, SubscriberError>> + Send + 'a>>;
}

/// Открытое соединение с брокером.
pub trait BrokerConnection: Send {
    /// Подписаться на topic (non-durable, без селектора) и дождаться
    /// подтверждения подписки.
    fn subscribe<'a>(
        &'a mut self,
        topic: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), SubscriberError>> + Send + 'a>>;

    /// Забрать поток входящих сообщений. Вызывается один раз при старте доставки.
    fn deliveries(&mut self) -> Result<Box<dyn DeliveryStream>, SubscriberError>;

    /// Закрыть соединение. Best-effort: ошибки игнорируются.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Поток входящих сообщений подписки.
pub trait DeliveryStream: Send {
    /// Следующее сообщение. `Ok(None)`: брокер закрыл сессию,
    /// `Err`: фатальная ошибка соединения.
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<Delivery>, SubscriberError>> + Send + '_>>;
}
