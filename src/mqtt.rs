use crate::config::Config;
use crate::error::StartupError;
use crate::handler::MessageHandler;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS, SubscribeReasonCode};
use tokio::time::{sleep, Duration};

const REQUEST_CAPACITY: usize = 64;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Multi-level wildcard under the configured prefix. The prefix is used as-is.
pub fn subscription_filter(topic_prefix: &str) -> String {
    format!("{topic_prefix}#")
}

/// Owns the broker session. Every CONNACK, including reconnects, triggers a fresh
/// subscription since the session is clean.
pub struct SubscriptionManager {
    client: AsyncClient,
    eventloop: EventLoop,
    filter: String,
    broker: String,
}

impl SubscriptionManager {
    /// Returns once the broker has accepted the first session and the subscribe
    /// request is queued.
    pub async fn connect(config: &Config) -> Result<Self, StartupError> {
        let mut mqttoptions = MqttOptions::new(
            config.mqtt_client_id.clone(),
            config.mqtt_host.clone(),
            config.mqtt_port,
        );
        mqttoptions.set_keep_alive(config.mqtt_keepalive());
        mqttoptions.set_clean_session(true);
        if let Some(username) = &config.mqtt_username {
            mqttoptions.set_credentials(
                username.clone(),
                config.mqtt_password.clone().unwrap_or_default(),
            );
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, REQUEST_CAPACITY);
        let broker = format!("{}:{}", config.mqtt_host, config.mqtt_port);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => break,
                Ok(_) => {}
                Err(source) => return Err(StartupError::BusConnect { broker, source }),
            }
        }
        tracing::info!(component = "mqtt", broker = %broker, "connected to broker");

        let manager = Self {
            client,
            eventloop,
            filter: subscription_filter(&config.mqtt_topic_prefix),
            broker,
        };
        subscribe(manager.client.clone(), manager.filter.clone()).await?;
        Ok(manager)
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Drives the event loop until a subscription fails. Each publish is handled
    /// on its own task; connection errors after startup only trigger a reconnect.
    pub async fn run(mut self, handler: MessageHandler) -> Result<(), StartupError> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        handler.handle(&publish.topic, &publish.payload).await;
                    });
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    tracing::info!(
                        component = "mqtt",
                        broker = %self.broker,
                        "reconnected to broker"
                    );
                    subscribe(self.client.clone(), self.filter.clone()).await?;
                }
                Ok(Event::Incoming(Incoming::SubAck(ack))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        return Err(StartupError::BusSubscribe {
                            filter: self.filter.clone(),
                            reason: "broker rejected subscription".to_string(),
                        });
                    }
                    tracing::info!(component = "mqtt", topic = %self.filter, "subscribed");
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(
                        component = "mqtt",
                        error = %err,
                        "MQTT connection dropped; reconnecting"
                    );
                    sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
}

/// Takes owned handles so no borrow of the manager, and with it the
/// non-`Sync` event loop, lives across the await.
async fn subscribe(client: AsyncClient, filter: String) -> Result<(), StartupError> {
    client
        .subscribe(filter.clone(), QoS::AtMostOnce)
        .await
        .map_err(|err| StartupError::BusSubscribe {
            filter,
            reason: err.to_string(),
        })
}
