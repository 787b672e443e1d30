use crate::errors::{BalanceError, BalanceResult};
use crate::models::{GiftCard, GiftCardType};
use chrono::{DateTime, Utc};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gift card notification events
///
/// Published to Kafka for the mailer to render and send. Each event is
/// self-contained and addressed (`to` is the recipient email). The raw
/// redemption code appears only in the purchase/received events - this is
/// the one place it ever leaves the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "notificationType")]
pub enum NotificationEvent {
    #[serde(rename = "GIFT_CARD_PURCHASED")]
    GiftCardPurchased {
        to: String,
        purchaser_name: String,
        recipient_name: String,
        gift_card_id: String,
        card_type: GiftCardType,
        amount: Decimal,
        code: String,
        expiration_date: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "GIFT_CARD_RECEIVED")]
    GiftCardReceived {
        to: String,
        purchaser_name: String,
        recipient_name: String,
        gift_card_id: String,
        card_type: GiftCardType,
        amount: Decimal,
        code: String,
        message: Option<String>,
        expiration_date: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "GIFT_CARD_REDEEMED")]
    GiftCardRedeemed {
        to: String,
        gift_card_id: String,
        amount: Decimal,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "SERVICE_GIFT_CARD_USED")]
    ServiceGiftCardUsed {
        to: String,
        gift_card_id: String,
        recipient_name: String,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "GIFT_CARD_EXPIRED")]
    GiftCardExpired {
        to: String,
        gift_card_id: String,
        card_type: GiftCardType,
        amount: Decimal,
        timestamp: DateTime<Utc>,
    },
}

impl NotificationEvent {
    /// Get the event type as a string (useful for logging)
    pub fn event_type(&self) -> &str {
        match self {
            NotificationEvent::GiftCardPurchased { .. } => "GIFT_CARD_PURCHASED",
            NotificationEvent::GiftCardReceived { .. } => "GIFT_CARD_RECEIVED",
            NotificationEvent::GiftCardRedeemed { .. } => "GIFT_CARD_REDEEMED",
            NotificationEvent::ServiceGiftCardUsed { .. } => "SERVICE_GIFT_CARD_USED",
            NotificationEvent::GiftCardExpired { .. } => "GIFT_CARD_EXPIRED",
        }
    }

    /// Gift card ID used as the partition key - all events for the same
    /// card stay ordered
    pub fn gift_card_id(&self) -> &str {
        match self {
            NotificationEvent::GiftCardPurchased { gift_card_id, .. } => gift_card_id,
            NotificationEvent::GiftCardReceived { gift_card_id, .. } => gift_card_id,
            NotificationEvent::GiftCardRedeemed { gift_card_id, .. } => gift_card_id,
            NotificationEvent::ServiceGiftCardUsed { gift_card_id, .. } => gift_card_id,
            NotificationEvent::GiftCardExpired { gift_card_id, .. } => gift_card_id,
        }
    }
}

/// Notification sink
///
/// Strictly best-effort: every publish failure is logged and discarded,
/// never surfaced to the caller - gift card and balance state has already
/// been committed by the time a notification fires. Built without a
/// producer (no brokers configured) it degrades to a no-op.
pub struct Notifier {
    producer: Option<FutureProducer>,
    topic: String,
}

impl Notifier {
    pub fn new(brokers: &str, topic: String) -> BalanceResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .set("compression.type", "snappy")
            .create()
            .map_err(|e| {
                BalanceError::NotificationError(format!("Failed to create producer: {}", e))
            })?;

        Ok(Self {
            producer: Some(producer),
            topic,
        })
    }

    /// A sink that drops everything; used when no brokers are configured
    pub fn disabled() -> Self {
        Self {
            producer: None,
            topic: String::new(),
        }
    }

    async fn publish(&self, event: NotificationEvent) {
        let Some(producer) = &self.producer else {
            tracing::debug!(
                event_type = event.event_type(),
                "Notifications disabled, dropping event"
            );
            return;
        };

        let key = event.gift_card_id().to_string();
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize notification event");
                return;
            }
        };

        let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);

        match producer.send(record, Duration::from_secs(5)).await {
            Ok((partition, offset)) => {
                tracing::debug!(
                    event_type = event.event_type(),
                    partition = partition,
                    offset = offset,
                    "Notification event published"
                );
            }
            Err((e, _)) => {
                tracing::warn!(
                    event_type = event.event_type(),
                    error = %e,
                    "Failed to publish notification event"
                );
            }
        }
    }

    /// Purchase confirmation to the purchaser
    pub async fn notify_purchase(&self, card: &GiftCard, raw_code: &str) {
        self.publish(NotificationEvent::GiftCardPurchased {
            to: card.purchaser_email.clone(),
            purchaser_name: card.purchaser_name.clone(),
            recipient_name: card.recipient_name.clone(),
            gift_card_id: card.id.clone(),
            card_type: card.card_type,
            amount: card.amount,
            code: raw_code.to_string(),
            expiration_date: card.expiration_date,
            timestamp: Utc::now(),
        })
        .await;
    }

    /// Gift announcement (with the code) to the recipient
    pub async fn notify_received(&self, card: &GiftCard, raw_code: &str) {
        self.publish(NotificationEvent::GiftCardReceived {
            to: card.recipient_email.clone(),
            purchaser_name: card.purchaser_name.clone(),
            recipient_name: card.recipient_name.clone(),
            gift_card_id: card.id.clone(),
            card_type: card.card_type,
            amount: card.amount,
            code: raw_code.to_string(),
            message: card.message.clone(),
            expiration_date: card.expiration_date,
            timestamp: Utc::now(),
        })
        .await;
    }

    /// Redemption confirmation to the redeemer
    pub async fn notify_redeemed(&self, redeemer_email: &str, card: &GiftCard) {
        self.publish(NotificationEvent::GiftCardRedeemed {
            to: redeemer_email.to_string(),
            gift_card_id: card.id.clone(),
            amount: card.amount,
            timestamp: Utc::now(),
        })
        .await;
    }

    /// Heads-up to the original purchaser that the card was redeemed
    pub async fn notify_redeemed_to_purchaser(&self, card: &GiftCard) {
        self.publish(NotificationEvent::GiftCardRedeemed {
            to: card.purchaser_email.clone(),
            gift_card_id: card.id.clone(),
            amount: card.amount,
            timestamp: Utc::now(),
        })
        .await;
    }

    /// Usage confirmation for a service card, to recipient and purchaser
    pub async fn notify_service_used(&self, card: &GiftCard) {
        for to in [&card.recipient_email, &card.purchaser_email] {
            self.publish(NotificationEvent::ServiceGiftCardUsed {
                to: to.clone(),
                gift_card_id: card.id.clone(),
                recipient_name: card.recipient_name.clone(),
                timestamp: Utc::now(),
            })
            .await;
        }
    }

    /// Expiry notice to recipient and purchaser
    pub async fn notify_expired(&self, card: &GiftCard) {
        for to in [&card.recipient_email, &card.purchaser_email] {
            self.publish(NotificationEvent::GiftCardExpired {
                to: to.clone(),
                gift_card_id: card.id.clone(),
                card_type: card.card_type,
                amount: card.amount,
                timestamp: Utc::now(),
            })
            .await;
        }
    }
}
