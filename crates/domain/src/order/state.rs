//! Order state machines.

use serde::{Deserialize, Serialize};

use super::OrderError;

/// Fulfillment status of an order.
///
/// ```text
/// Placed    ──► Confirmed | Packed
/// Confirmed ──► Packed | Shipped
/// Packed    ──► Shipped
/// Shipped   ──► Delivered
/// ```
///
/// Every non-terminal status may move to `Cancelled`. `Delivered` and
/// `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Placed,
    Confirmed,
    #[serde(alias = "PROCESSING")]
    Packed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Placed,
        OrderStatus::Confirmed,
        OrderStatus::Packed,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Targets reachable from this status by any actor.
    pub fn allowed_targets(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Placed => &[Confirmed, Packed, Cancelled],
            Confirmed => &[Packed, Shipped, Cancelled],
            Packed => &[Shipped, Cancelled],
            Shipped => &[Delivered, Cancelled],
            Delivered | Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// Whether a vendor may request `target` from this status.
    ///
    /// Vendors move orders forward only; cancellation is reserved for the
    /// customer and the system.
    pub fn vendor_can_set(&self, target: OrderStatus) -> bool {
        target != OrderStatus::Cancelled && self.can_transition_to(target)
    }

    /// Statuses from which a customer may still cancel their own order.
    pub fn customer_can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Placed | OrderStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Placed => "PLACED",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Packed => "PACKED",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        if upper == "PROCESSING" {
            return Ok(OrderStatus::Packed);
        }
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == upper)
            .ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

/// Payment axis, independent of fulfillment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    /// The order was cancelled before payment was collected.
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn transition_table() {
        let legal = [
            (Placed, Confirmed),
            (Placed, Packed),
            (Placed, Cancelled),
            (Confirmed, Packed),
            (Confirmed, Shipped),
            (Confirmed, Cancelled),
            (Packed, Shipped),
            (Packed, Cancelled),
            (Shipped, Delivered),
            (Shipped, Cancelled),
        ];
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn terminal_statuses_go_nowhere() {
        assert!(Delivered.allowed_targets().is_empty());
        assert!(Cancelled.allowed_targets().is_empty());
        assert!(!Cancelled.vendor_can_set(Shipped));
    }

    #[test]
    fn vendors_cannot_cancel() {
        assert!(Placed.vendor_can_set(Confirmed));
        assert!(!Placed.vendor_can_set(Cancelled));
        assert!(!Shipped.vendor_can_set(Cancelled));
    }

    #[test]
    fn customer_cancel_window() {
        assert!(Placed.customer_can_cancel());
        assert!(Confirmed.customer_can_cancel());
        assert!(!Packed.customer_can_cancel());
        assert!(!Shipped.customer_can_cancel());
    }

    #[test]
    fn processing_is_an_alias_for_packed() {
        assert_eq!("processing".parse::<OrderStatus>().unwrap(), Packed);
        assert_eq!(
            serde_json::from_str::<OrderStatus>("\"PROCESSING\"").unwrap(),
            Packed
        );
        assert_eq!(serde_json::to_string(&Packed).unwrap(), "\"PACKED\"");
    }

    #[test]
    fn paid_is_not_a_fulfillment_status() {
        assert!(matches!(
            "PAID".parse::<OrderStatus>(),
            Err(OrderError::UnknownStatus(_))
        ));
    }
}
