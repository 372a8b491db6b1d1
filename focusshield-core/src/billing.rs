//! Payment webhook events
//!
//! The payment provider reports checkout completion and subscription changes
//! as JSON events. Only three event types change anything here; the user the
//! event belongs to comes from the `user_id` metadata attached at checkout.
//! Nothing in this module talks to the payment provider itself.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::error::Result;
use crate::remote::{RemoteStore, Table};
use crate::types::{Subscription, SubscriptionStatus};

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

/// Subscription fields carried by an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    pub user_id: Option<String>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub status: Option<SubscriptionStatus>,
    pub price_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEvent {
    CheckoutCompleted(SubscriptionUpdate),
    SubscriptionUpdated(SubscriptionUpdate),
    SubscriptionDeleted { user_id: Option<String> },
    /// Any other event type
    Ignored { event_type: String },
}

// ============================================
// Event payloads
// ============================================

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: RawData,
}

#[derive(Deserialize)]
struct RawData {
    object: serde_json::Value,
}

/// An id, or the expanded object carrying it.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdOrObject {
    Id(String),
    Object { id: String },
}

impl IdOrObject {
    fn into_id(self) -> String {
        match self {
            IdOrObject::Id(id) | IdOrObject::Object { id } => id,
        }
    }
}

#[derive(Deserialize)]
struct RawSubscription {
    id: Option<String>,
    customer: Option<IdOrObject>,
    status: Option<SubscriptionStatus>,
    current_period_end: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    items: Option<RawItems>,
}

#[derive(Deserialize)]
struct RawItems {
    #[serde(default)]
    data: Vec<RawItem>,
}

#[derive(Deserialize)]
struct RawItem {
    price: Option<IdOrObject>,
    current_period_end: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SubscriptionRef {
    Id(String),
    Expanded(Box<RawSubscription>),
}

#[derive(Deserialize)]
struct RawCheckout {
    customer: Option<IdOrObject>,
    subscription: Option<SubscriptionRef>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

fn period_end(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
}

impl RawSubscription {
    fn into_update(self, user_id: Option<String>) -> SubscriptionUpdate {
        let first_item = self.items.and_then(|items| items.data.into_iter().next());
        let (price_id, item_period_end) = match first_item {
            Some(item) => (item.price.map(IdOrObject::into_id), item.current_period_end),
            None => (None, None),
        };

        SubscriptionUpdate {
            user_id: user_id.or_else(|| self.metadata.get("user_id").cloned()),
            customer_id: self.customer.map(IdOrObject::into_id),
            subscription_id: self.id,
            status: self.status,
            price_id,
            current_period_end: item_period_end
                .or(self.current_period_end)
                .and_then(period_end),
        }
    }
}

impl RawCheckout {
    fn into_update(self) -> SubscriptionUpdate {
        let user_id = self.metadata.get("user_id").cloned();
        let customer_id = self.customer.map(IdOrObject::into_id);

        let mut update = match self.subscription {
            Some(SubscriptionRef::Expanded(sub)) => sub.into_update(user_id),
            // A completed checkout for a bare subscription id means it is paid
            Some(SubscriptionRef::Id(id)) => SubscriptionUpdate {
                user_id,
                subscription_id: Some(id),
                status: Some(SubscriptionStatus::Active),
                ..Default::default()
            },
            None => SubscriptionUpdate {
                user_id,
                ..Default::default()
            },
        };
        update.customer_id = customer_id.or(update.customer_id);
        update
    }
}

impl SubscriptionEvent {
    /// Parse a webhook body.
    pub fn parse(body: &str) -> Result<Self> {
        let raw: RawEvent = serde_json::from_str(body)?;

        let event = match raw.event_type.as_str() {
            CHECKOUT_COMPLETED => {
                let checkout: RawCheckout = serde_json::from_value(raw.data.object)?;
                SubscriptionEvent::CheckoutCompleted(checkout.into_update())
            }
            SUBSCRIPTION_UPDATED => {
                let sub: RawSubscription = serde_json::from_value(raw.data.object)?;
                SubscriptionEvent::SubscriptionUpdated(sub.into_update(None))
            }
            SUBSCRIPTION_DELETED => {
                let sub: RawSubscription = serde_json::from_value(raw.data.object)?;
                SubscriptionEvent::SubscriptionDeleted {
                    user_id: sub.metadata.get("user_id").cloned(),
                }
            }
            _ => SubscriptionEvent::Ignored {
                event_type: raw.event_type,
            },
        };
        Ok(event)
    }
}

/// Write an event to the subscription table.
///
/// Returns whether anything was written. Events without a user id and
/// unhandled event types are skipped.
pub fn apply_subscription_event(
    remote: &dyn RemoteStore,
    event: &SubscriptionEvent,
    now: DateTime<Utc>,
) -> Result<bool> {
    match event {
        SubscriptionEvent::CheckoutCompleted(update) => {
            if update.subscription_id.is_none() {
                tracing::warn!("No subscription id in checkout session");
                return Ok(false);
            }
            upsert_subscription(remote, update, now)
        }
        SubscriptionEvent::SubscriptionUpdated(update) => upsert_subscription(remote, update, now),
        SubscriptionEvent::SubscriptionDeleted { user_id } => {
            let Some(user_id) = user_id else {
                tracing::warn!("No user_id in subscription metadata");
                return Ok(false);
            };
            remote.update_by_key(
                Table::Subscriptions,
                "user_id",
                user_id,
                &json!({
                    "status": SubscriptionStatus::Canceled.as_str(),
                    "updated_at": now,
                }),
            )?;
            tracing::info!(user_id = %user_id, "Subscription canceled");
            Ok(true)
        }
        SubscriptionEvent::Ignored { event_type } => {
            tracing::debug!(event_type = %event_type, "Unhandled webhook event");
            Ok(false)
        }
    }
}

fn upsert_subscription(
    remote: &dyn RemoteStore,
    update: &SubscriptionUpdate,
    now: DateTime<Utc>,
) -> Result<bool> {
    let Some(user_id) = update.user_id.clone() else {
        tracing::warn!("No user_id in event metadata");
        return Ok(false);
    };

    let row = Subscription {
        user_id,
        stripe_customer_id: update.customer_id.clone(),
        stripe_subscription_id: update.subscription_id.clone(),
        status: update.status.clone(),
        price_id: update.price_id.clone(),
        current_period_end: update.current_period_end,
        updated_at: now,
    };

    remote.upsert(Table::Subscriptions, &[serde_json::to_value(&row)?], "user_id")?;
    tracing::info!(
        user_id = %row.user_id,
        status = row.status.as_ref().map(SubscriptionStatus::as_str).unwrap_or("none"),
        "Subscription updated"
    );
    Ok(true)
}
