use bytes::Bytes;

// ════════════════════════════════════════════════════════════════
//  Inbound messages
// ════════════════════════════════════════════════════════════════

/// Непрозрачный бинарный payload одного сообщения брокера.
///
/// Байты никогда не модифицируются: что пришло от транспорта,
/// то и уходит в файл.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawMessage {
    topic: String,
    payload: Bytes,
}

impl RawMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Topic, из которого пришло сообщение.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Сырые байты.
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// То, что транспорт передаёт обработчику.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Бинарное сообщение, ожидаемая форма.
    Binary(RawMessage),
    /// Publish без payload (например, очистка retained сообщения).
    /// Для обработчика это неожиданная форма сообщения.
    Empty { topic: String },
}

impl Delivery {
    /// Классифицировать payload: пустой → `Empty`, иначе `Binary`.
    pub fn from_payload(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let topic = topic.into();
        if payload.is_empty() {
            Delivery::Empty { topic }
        } else {
            Delivery::Binary(RawMessage::new(topic, payload))
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            Delivery::Binary(msg) => msg.topic(),
            Delivery::Empty { topic } => topic,
        }
    }
}

/// Обработчик сообщений, регистрируемый как consumer подписки.
///
/// Вызывается **блокирующе** (из blocking pool), строго по одному
/// сообщению за раз: следующее сообщение не доставляется, пока
/// не вернулся предыдущий вызов. Ошибки обработчик логирует сам:
/// наружу ничего не пробрасывается.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, delivery: Delivery);
}
