pub mod error;
pub mod secret;

mod clock;
mod message;

pub use clock::{Clock, Sleeper, SystemClock, TokioSleeper};
pub use error::{ErrorKind, SubscriberError};
pub use message::{Delivery, MessageHandler, RawMessage};
pub use secret::{SecretResolver, SecretsDir};
