use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Order Value Objects
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LineItem {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub image_ref: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct ShippingAddress {
    pub name: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

/// Money totals computed by checkout; stored as given, never recomputed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct OrderAmounts {
    pub items_total: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub grand_total: Decimal,
}

impl OrderAmounts {
    /// First negative component, by field name
    pub fn first_negative(&self) -> Option<&'static str> {
        [
            ("items_total", self.items_total),
            ("tax", self.tax),
            ("shipping", self.shipping),
            ("grand_total", self.grand_total),
        ]
        .into_iter()
        .find(|(_, value)| *value < Decimal::ZERO)
        .map(|(field, _)| field)
    }
}

/// Opaque record handed back by the payment provider.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PaymentReference {
    pub id: String,
    pub status: String,
    pub update_time: String,
    pub email_address: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct PaymentState {
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub reference: Option<PaymentReference>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    CancelRequested,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::CancelRequested,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::CancelRequested => "cancel_requested",
        }
    }

    /// `cancel_requested` is only entered through the cancellation flow.
    pub fn is_admin_settable(&self) -> bool {
        !matches!(self, OrderStatus::CancelRequested)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

/// Authenticated identity supplied by the auth collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn user(user_id: Uuid) -> Self {
        Self { user_id, role: Role::User }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self { user_id, role: Role::Admin }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Total quantity per product. Line items naming the same product collapse
/// into one stock adjustment.
pub fn quantities_by_product(items: &[LineItem]) -> BTreeMap<Uuid, i64> {
    let mut totals = BTreeMap::new();
    for item in items {
        *totals.entry(item.product_id).or_insert(0) += i64::from(item.quantity);
    }
    totals
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn item(product_id: Uuid, quantity: u32) -> LineItem {
        LineItem {
            product_id,
            name: "Widget".to_string(),
            quantity,
            unit_price: Decimal::new(1999, 2),
            image_ref: None,
        }
    }

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&OrderStatus::CancelRequested).unwrap();
        assert_eq!(json, "\"cancel_requested\"");

        let parsed: OrderStatus = serde_json::from_str("\"processing\"").unwrap();
        assert_eq!(parsed, OrderStatus::Processing);

        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert_eq!(
            "refunded".parse::<OrderStatus>(),
            Err(UnknownStatus("refunded".to_string()))
        );
        assert!(serde_json::from_str::<OrderStatus>("\"CancelRequested\"").is_err());
    }

    #[test]
    fn test_cancel_requested_is_not_admin_settable() {
        let settable: Vec<OrderStatus> = OrderStatus::ALL
            .into_iter()
            .filter(OrderStatus::is_admin_settable)
            .collect();

        assert_eq!(settable.len(), 5);
        assert!(!settable.contains(&OrderStatus::CancelRequested));
    }

    #[test]
    fn test_quantities_merge_duplicate_products() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let totals = quantities_by_product(&[item(a, 2), item(b, 1), item(a, 3)]);

        assert_eq!(totals.len(), 2);
        assert_eq!(totals[&a], 5);
        assert_eq!(totals[&b], 1);
    }

    #[test]
    fn test_first_negative_amount() {
        let mut amounts = OrderAmounts {
            items_total: Decimal::new(1000, 0),
            tax: Decimal::new(180, 0),
            shipping: Decimal::ZERO,
            grand_total: Decimal::new(1180, 0),
        };
        assert_eq!(amounts.first_negative(), None);

        amounts.tax = Decimal::new(-1, 0);
        assert_eq!(amounts.first_negative(), Some("tax"));
    }

    #[test]
    fn test_caller_roles() {
        let id = Uuid::new_v4();
        assert!(Caller::admin(id).is_admin());
        assert!(!Caller::user(id).is_admin());
    }
}
