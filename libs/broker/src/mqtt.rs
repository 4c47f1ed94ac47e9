use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    SubscribeReasonCode, TlsConfiguration, Transport,
};
use subscriber_api::{Delivery, SubscriberError};

use crate::{BrokerAddress, BrokerConnection, ConnectionParameters, Connector, DeliveryStream, SecureTransport};

const REQUEST_CAPACITY: usize = 10;
/// Предел MQTT 3.1.1 для remaining length: входящий пакет любого
/// допустимого размера не рвёт сессию.
const MAX_INCOMING_PACKET_SIZE: usize = 268_435_455;
/// Исходящие пакеты только служебные (CONNECT, SUBSCRIBE, PING).
const MAX_OUTGOING_PACKET_SIZE: usize = 64 * 1024;
const DISCONNECT_FLUSH: Duration = Duration::from_secs(1);

/// Соединение с брокером по MQTT 3.1.1 (rumqttc).
#[derive(Debug, Clone, Copy, Default)]
pub struct MqttConnector;

impl MqttConnector {
    /// Опции клиента: адрес, учётные данные, транспорт.
    pub fn options(
        params: &ConnectionParameters,
        tls: Option<SecureTransport>,
    ) -> Result<MqttOptions, SubscriberError> {
        let addr = BrokerAddress::parse(&params.broker_url)?;

        let mut options = MqttOptions::new(params.client_id.clone(), addr.host.clone(), addr.port);
        options.set_keep_alive(params.keep_alive);
        // Non-durable подписка: брокер забывает её вместе с соединением
        options.set_clean_session(true);
        options.set_max_packet_size(MAX_INCOMING_PACKET_SIZE, MAX_OUTGOING_PACKET_SIZE);

        if let Some(user) = &params.user_name {
            options.set_credentials(user.clone(), params.password.clone().unwrap_or_default());
        }

        match tls {
            Some(tls) => {
                options.set_transport(Transport::Tls(TlsConfiguration::Rustls(tls.client_config())));
            }
            None if addr.tls => {
                // Без хранилищ: системные корневые сертификаты
                options.set_transport(Transport::Tls(Default::default()));
            }
            None => {}
        }

        Ok(options)
    }
}

impl Connector for MqttConnector {
    fn connect<'a>(
        &'a self,
        params: &'a ConnectionParameters,
        tls: Option<SecureTransport>,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn BrokerConnection>, SubscriberError>> + Send + 'a>> {
        Box::pin(async move {
            let options = Self::options(params, tls)?;
            let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        if ack.code != ConnectReturnCode::Success {
                            return Err(SubscriberError::connection(format!(
                                "broker refused connection: {:?}",
                                ack.code
                            )));
                        }
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        return Err(SubscriberError::connection(format!(
                            "connect {}: {e}",
                            params.broker_url
                        )));
                    }
                }
            }

            tracing::info!(broker = %params.broker_url, client_id = %params.client_id, "broker connection opened");
            Ok(Box::new(MqttConnection {
                client,
                eventloop: Some(eventloop),
                pending: VecDeque::new(),
            }) as Box<dyn BrokerConnection>)
        })
    }
}

struct MqttConnection {
    client: AsyncClient,
    /// Уходит в `MqttDeliveries` при старте доставки.
    eventloop: Option<EventLoop>,
    /// Publish'и, пришедшие раньше SUBACK.
    pending: VecDeque<Delivery>,
}

impl BrokerConnection for MqttConnection {
    fn subscribe<'a>(
        &'a mut self,
        topic: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), SubscriberError>> + Send + 'a>> {
        Box::pin(async move {
            let eventloop = self
                .eventloop
                .as_mut()
                .ok_or_else(|| SubscriberError::connection("delivery already started"))?;

            self.client
                .subscribe(topic, QoS::AtMostOnce)
                .await
                .map_err(|e| SubscriberError::connection(format!("subscribe '{topic}': {e}")))?;

            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::SubAck(ack))) => {
                        if ack
                            .return_codes
                            .iter()
                            .any(|code| matches!(code, SubscribeReasonCode::Failure))
                        {
                            return Err(SubscriberError::connection(format!(
                                "broker rejected subscription to '{topic}'"
                            )));
                        }
                        tracing::info!(%topic, "listener added to topic");
                        return Ok(());
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        self.pending
                            .push_back(Delivery::from_payload(publish.topic, publish.payload));
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        return Err(SubscriberError::connection(format!("subscribe '{topic}': {e}")));
                    }
                }
            }
        })
    }

    fn deliveries(&mut self) -> Result<Box<dyn DeliveryStream>, SubscriberError> {
        let eventloop = self
            .eventloop
            .take()
            .ok_or_else(|| SubscriberError::connection("delivery already started"))?;
        Ok(Box::new(MqttDeliveries {
            eventloop,
            pending: std::mem::take(&mut self.pending),
        }))
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let _ = self.client.try_disconnect();
            // Доставка не стартовала, eventloop у нас, прокачиваем его,
            // чтобы DISCONNECT ушёл брокеру. После старта eventloop живёт в
            // потоке доставки: он отбрасывается вместе с прерванным consumer'ом,
            // и DISCONNECT не отправляется. Сессия чистая (clean session),
            // поэтому брокер снимает подписку и при обрыве соединения.
            if let Some(mut eventloop) = self.eventloop.take() {
                let _ = tokio::time::timeout(DISCONNECT_FLUSH, async {
                    loop {
                        match eventloop.poll().await {
                            Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                            Ok(_) => {}
                        }
                    }
                })
                .await;
            }
            self.pending.clear();
        })
    }
}

struct MqttDeliveries {
    eventloop: EventLoop,
    pending: VecDeque<Delivery>,
}

impl DeliveryStream for MqttDeliveries {
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<Delivery>, SubscriberError>> + Send + '_>> {
        Box::pin(async move {
            if let Some(delivery) = self.pending.pop_front() {
                return Ok(Some(delivery));
            }
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        return Ok(Some(Delivery::from_payload(publish.topic, publish.payload)));
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => return Ok(None),
                    Ok(_) => continue,
                    Err(e) => return Err(SubscriberError::connection(e.to_string())),
                }
            }
        })
    }
}
