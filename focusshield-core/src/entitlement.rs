//! Report paywall and plan tiers

use serde::Serialize;

use crate::config::BillingConfig;
use crate::types::Subscription;

/// Subscription tier of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    #[default]
    Free,
    Pro,
    ProPlus,
}

impl Plan {
    pub fn is_pro(&self) -> bool {
        !matches!(self, Plan::Free)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Plan::Free => "Free",
            Plan::Pro => "Pro",
            Plan::ProPlus => "Pro+",
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Whether the report for `week_offset` is hidden behind the paywall.
pub fn is_week_locked(is_pro: bool, week_offset: u32, free_tier_weeks: u32) -> bool {
    !is_pro && week_offset >= free_tier_weeks
}

/// Resolve a plan from the subscription row.
///
/// Only an `active` status grants a paid plan; the Pro+ price id picks the
/// higher tier. An active price that matches neither configured id is still
/// Pro.
pub fn plan_for(subscription: Option<&Subscription>, billing: &BillingConfig) -> Plan {
    match subscription {
        Some(sub) if sub.is_active() => {
            let price = sub.price_id.as_deref();
            if price.is_some() && price == billing.pro_plus_price_id.as_deref() {
                Plan::ProPlus
            } else if price.is_some() && price == billing.pro_price_id.as_deref() {
                Plan::Pro
            } else {
                if let Some(price) = price {
                    if billing.pro_price_id.is_some() || billing.pro_plus_price_id.is_some() {
                        tracing::warn!(price_id = price, "Active subscription has an unknown price");
                    }
                }
                Plan::Pro
            }
        }
        _ => Plan::Free,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubscriptionStatus;

    fn subscription(status: Option<SubscriptionStatus>, price_id: Option<&str>) -> Subscription {
        Subscription {
            user_id: "u1".to_string(),
            stripe_customer_id: None,
            stripe_subscription_id: None,
            status,
            price_id: price_id.map(String::from),
            current_period_end: None,
            updated_at: "2024-05-01T00:00:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn test_is_week_locked() {
        assert!(is_week_locked(false, 2, 2));
        assert!(!is_week_locked(false, 1, 2));
        assert!(!is_week_locked(true, 99, 2));
        assert!(!is_week_locked(false, 0, 2));
    }

    #[test]
    fn test_plan_resolution() {
        let billing = BillingConfig {
            pro_price_id: Some("price_pro".to_string()),
            pro_plus_price_id: Some("price_plus".to_string()),
            ..Default::default()
        };

        assert_eq!(plan_for(None, &billing), Plan::Free);

        let active_pro = subscription(Some(SubscriptionStatus::Active), Some("price_pro"));
        assert_eq!(plan_for(Some(&active_pro), &billing), Plan::Pro);

        let active_plus = subscription(Some(SubscriptionStatus::Active), Some("price_plus"));
        assert_eq!(plan_for(Some(&active_plus), &billing), Plan::ProPlus);

        let canceled = subscription(Some(SubscriptionStatus::Canceled), Some("price_plus"));
        assert_eq!(plan_for(Some(&canceled), &billing), Plan::Free);

        let trialing = subscription(Some(SubscriptionStatus::Trialing), None);
        assert_eq!(plan_for(Some(&trialing), &billing), Plan::Free);

        let no_status = subscription(None, Some("price_pro"));
        assert_eq!(plan_for(Some(&no_status), &billing), Plan::Free);
    }

    #[test]
    fn test_pro_price_resolves_when_ids_are_shared() {
        // A single price configured for both tiers picks the higher one
        let billing = BillingConfig {
            pro_price_id: Some("price_team".to_string()),
            pro_plus_price_id: Some("price_team".to_string()),
            ..Default::default()
        };
        let sub = subscription(Some(SubscriptionStatus::Active), Some("price_team"));
        assert_eq!(plan_for(Some(&sub), &billing), Plan::ProPlus);

        let billing = BillingConfig {
            pro_price_id: Some("price_pro".to_string()),
            pro_plus_price_id: None,
            ..Default::default()
        };
        let pro = subscription(Some(SubscriptionStatus::Active), Some("price_pro"));
        assert_eq!(plan_for(Some(&pro), &billing), Plan::Pro);
    }

    #[test]
    fn test_unknown_active_price_is_pro() {
        let billing = BillingConfig {
            pro_price_id: Some("price_pro".to_string()),
            pro_plus_price_id: Some("price_plus".to_string()),
            ..Default::default()
        };
        let legacy = subscription(Some(SubscriptionStatus::Active), Some("price_legacy"));
        assert_eq!(plan_for(Some(&legacy), &billing), Plan::Pro);
    }

    #[test]
    fn test_active_without_price_is_pro() {
        let sub = subscription(Some(SubscriptionStatus::Active), None);
        let plan = plan_for(Some(&sub), &BillingConfig::default());
        assert_eq!(plan, Plan::Pro);
        assert!(plan.is_pro());
        assert_eq!(Plan::ProPlus.to_string(), "Pro+");
    }
}
