use futures::StreamExt;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("event bus connect failed: {0}")]
    Connect(String),
    #[error("event bus publish failed: {0}")]
    Publish(String),
    #[error("event bus subscribe failed: {0}")]
    Subscribe(String),
}

#[derive(Debug, Clone)]
struct Envelope {
    topic: String,
    payload: Vec<u8>,
}

/// Embedded in-process broker: one fan-out channel, per-subscription topic
/// filter. Started on demand; dropping the last handle tears it down.
#[derive(Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<Envelope>,
}

impl LocalBus {
    pub fn start() -> Self {
        let (sender, _) = broadcast::channel(1024);
        LocalBus { sender }
    }
}

/// Topic-addressed pub/sub with fan-out semantics. The embedded variant runs
/// in-process; the external variant speaks to a NATS server by URL. Both are
/// at-least-once with best-effort ordering; consumers re-derive views from
/// the store rather than trusting delivery order.
#[derive(Clone)]
pub enum EventBus {
    Local(LocalBus),
    Nats(async_nats::Client),
}

impl EventBus {
    /// Empty URL starts the embedded broker; otherwise connect out.
    pub async fn connect(nats_url: &str) -> Result<Self, BusError> {
        if nats_url.is_empty() {
            return Ok(EventBus::Local(LocalBus::start()));
        }
        async_nats::connect(nats_url)
            .await
            .map(EventBus::Nats)
            .map_err(|e| BusError::Connect(e.to_string()))
    }

    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        match self {
            EventBus::Local(bus) => {
                // No subscribers is not an error
                let _ = bus.sender.send(Envelope {
                    topic: topic.to_string(),
                    payload,
                });
                Ok(())
            }
            EventBus::Nats(client) => client
                .publish(topic.to_string(), payload.into())
                .await
                .map_err(|e| BusError::Publish(e.to_string())),
        }
    }

    /// New subscription for `topic`. Every subscriber receives every message
    /// on its topic (no queue groups); subscriptions are never shared.
    pub async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        match self {
            EventBus::Local(bus) => Ok(Subscription(SubscriptionKind::Local {
                topic: topic.to_string(),
                rx: bus.sender.subscribe(),
                redeliver: bus.sender.clone(),
            })),
            EventBus::Nats(client) => client
                .subscribe(topic.to_string())
                .await
                .map(|sub| {
                    Subscription(SubscriptionKind::Nats {
                        sub,
                        client: client.clone(),
                    })
                })
                .map_err(|e| BusError::Subscribe(e.to_string())),
        }
    }
}

/// One consumer's view of a topic. Owned by exactly one connection;
/// dropped when that connection ends.
pub struct Subscription(SubscriptionKind);

enum SubscriptionKind {
    Local {
        topic: String,
        rx: broadcast::Receiver<Envelope>,
        redeliver: broadcast::Sender<Envelope>,
    },
    Nats {
        sub: async_nats::Subscriber,
        client: async_nats::Client,
    },
}

impl Subscription {
    /// Next delivery for this topic; `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<Delivery> {
        match &mut self.0 {
            SubscriptionKind::Local {
                topic,
                rx,
                redeliver,
            } => loop {
                match rx.recv().await {
                    Ok(env) if env.topic == *topic => {
                        return Some(Delivery {
                            topic: env.topic,
                            payload: env.payload,
                            channel: Redeliver::Local(redeliver.clone()),
                        });
                    }
                    Ok(_) => continue, // different topic
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
            SubscriptionKind::Nats { sub, client } => sub.next().await.map(|msg| Delivery {
                topic: msg.subject.to_string(),
                payload: msg.payload.to_vec(),
                channel: Redeliver::Nats(client.clone()),
            }),
        }
    }
}

enum Redeliver {
    Local(broadcast::Sender<Envelope>),
    Nats(async_nats::Client),
}

/// A single message plus its acknowledgement handle.
pub struct Delivery {
    pub topic: String,
    pub payload: Vec<u8>,
    channel: Redeliver,
}

impl Delivery {
    /// Acknowledge and drop the delivery.
    pub fn ack(self) {}

    /// Negative-acknowledge: re-publish so subscribers see it again.
    pub async fn nack(self) {
        match self.channel {
            Redeliver::Local(tx) => {
                let _ = tx.send(Envelope {
                    topic: self.topic,
                    payload: self.payload,
                });
            }
            Redeliver::Nats(client) => {
                let _ = client.publish(self.topic, self.payload.into()).await;
            }
        }
    }
}

/// Rocket-managed handle; `bus` is `None` when pub/sub is disabled and the
/// SSE layer serves through its polling fallback.
#[derive(Clone)]
pub struct PubSub {
    pub bus: Option<EventBus>,
}
