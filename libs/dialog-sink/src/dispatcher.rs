use std::path::PathBuf;
use std::sync::Arc;

use ber_header::{DialogId, HeaderError, decode_dialog_id};
use subscriber_api::{Delivery, MessageHandler, RawMessage, SubscriberError};

use crate::{FileSink, RoutingTable};

/// Результат обработки одного сообщения.
#[derive(Debug)]
pub enum Outcome {
    /// Сообщение сохранено в файл.
    Written(PathBuf),
    /// DialogID не маршрутизируется, сообщение отброшено (не ошибка).
    Unrouted(DialogId),
    /// Заголовок не удалось разобрать.
    Malformed(HeaderError),
    /// Ошибка записи файла.
    Failed(SubscriberError),
    /// Неожиданная форма сообщения (не бинарный payload).
    Unexpected,
}

/// Consumer подписки: decode → route → write.
///
/// Состояния нет, кроме счётчика имён внутри `FileSink`; таблица
/// маршрутов неизменяема и разделяется через `Arc`.
pub struct DialogDispatcher {
    routes: Arc<RoutingTable>,
    sink: FileSink,
}

impl DialogDispatcher {
    pub fn new(routes: Arc<RoutingTable>, sink: FileSink) -> Self {
        Self { routes, sink }
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn sink(&self) -> &FileSink {
        &self.sink
    }

    /// Обработать одно сообщение. Все ошибки логируются здесь же.
    pub fn dispatch(&self, delivery: &Delivery) -> Outcome {
        match delivery {
            Delivery::Binary(msg) => self.dispatch_binary(msg),
            Delivery::Empty { topic } => {
                tracing::error!(%topic, "unexpected message shape: empty payload, dropping");
                Outcome::Unexpected
            }
        }
    }

    fn dispatch_binary(&self, msg: &RawMessage) -> Outcome {
        let id = match decode_dialog_id(msg.as_bytes()) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(topic = %msg.topic(), len = msg.len(), error = %e, "cannot decode DialogID, dropping");
                return Outcome::Malformed(e);
            }
        };

        let Some(prefix) = self.routes.route(id) else {
            tracing::trace!(dialog_id = %id, "no route, dropping");
            return Outcome::Unrouted(id);
        };

        match self.sink.write(prefix, msg.as_bytes()) {
            Ok(path) => {
                tracing::info!(dialog_id = %id, path = %path.display(), bytes = msg.len(), "writing file");
                Outcome::Written(path)
            }
            Err(e) => {
                tracing::error!(dialog_id = %id, error = ?e, "write error, dropping message");
                Outcome::Failed(e)
            }
        }
    }
}

impl MessageHandler for DialogDispatcher {
    fn on_message(&self, delivery: Delivery) {
        self.dispatch(&delivery);
    }
}
