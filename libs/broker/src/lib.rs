mod mqtt;
mod params;
mod session;
mod supervisor;
mod transport;

pub mod tls;

pub use mqtt::MqttConnector;
pub use params::{BrokerAddress, ConnectionParameters};
pub use session::{SessionManager, SessionState};
pub use supervisor::Supervisor;
pub use tls::SecureTransport;
pub use transport::{BrokerConnection, Connector, DeliveryStream};
