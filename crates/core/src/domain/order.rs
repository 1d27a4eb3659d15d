use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    InProgress,
    Approved,
    Rejected,
    Completed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Orders in these states still accept decisions from the approval chain.
    pub fn accepts_decisions(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub applicant_id: UserId,
    pub store_id: String,
    pub items: Vec<OrderLine>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self.status, next),
            (OrderStatus::Pending, OrderStatus::InProgress)
                | (OrderStatus::Pending, OrderStatus::Approved)
                | (OrderStatus::Pending, OrderStatus::Rejected)
                | (OrderStatus::InProgress, OrderStatus::Approved)
                | (OrderStatus::InProgress, OrderStatus::Rejected)
                | (OrderStatus::Approved, OrderStatus::Completed)
        )
    }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            self.updated_at = Utc::now();
            return Ok(());
        }

        Err(DomainError::InvalidOrderTransition { from: self.status, to: next })
    }
}

/// Line item as submitted, before totals are computed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLineDraft {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub store_id: String,
    pub items: Vec<OrderLineDraft>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl OrderDraft {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.store_id.trim().is_empty() {
            return Err(DomainError::InvalidOrder("store_id must not be empty".to_owned()));
        }
        if self.items.is_empty() {
            return Err(DomainError::InvalidOrder("order must contain at least one item".to_owned()));
        }

        for (index, item) in self.items.iter().enumerate() {
            if item.description.trim().is_empty() {
                return Err(DomainError::InvalidOrder(format!(
                    "item {index} must have a description"
                )));
            }
            if item.quantity == 0 {
                return Err(DomainError::InvalidOrder(format!(
                    "item {index} must have a quantity greater than zero"
                )));
            }
            if item.unit_price.is_sign_negative() {
                return Err(DomainError::InvalidOrder(format!(
                    "item {index} must not have a negative unit price"
                )));
            }
        }

        if let Some(currency) = &self.currency {
            let currency = currency.trim();
            if currency.len() != 3 || !currency.chars().all(|ch| ch.is_ascii_alphabetic()) {
                return Err(DomainError::InvalidOrder(format!(
                    "currency `{currency}` must be a three-letter code"
                )));
            }
        }

        Ok(())
    }

    /// Builds a pending order with computed line totals, subtotal, tax, and total.
    pub fn into_order(
        self,
        id: OrderId,
        applicant_id: UserId,
        default_currency: &str,
        tax_rate_pct: Decimal,
    ) -> Result<Order, DomainError> {
        self.validate()?;

        let items = self
            .items
            .into_iter()
            .map(|item| {
                let line_total = Decimal::from(item.quantity)
                    .checked_mul(item.unit_price)
                    .ok_or_else(total_overflow)?;
                Ok(OrderLine {
                    line_total,
                    description: item.description.trim().to_owned(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
            })
            .collect::<Result<Vec<OrderLine>, DomainError>>()?;
        let totals = OrderTotals::compute(&items, tax_rate_pct)?;
        let currency = self
            .currency
            .map(|currency| currency.trim().to_ascii_uppercase())
            .unwrap_or_else(|| default_currency.to_owned());
        let now = Utc::now();

        Ok(Order {
            id,
            applicant_id,
            store_id: self.store_id.trim().to_owned(),
            items,
            subtotal: totals.subtotal,
            tax: totals.tax,
            total: totals.total,
            currency,
            status: OrderStatus::Pending,
            notes: self.notes.filter(|notes| !notes.trim().is_empty()),
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl OrderTotals {
    /// Fails with `InvalidOrder` when any amount leaves the `Decimal` range.
    pub fn compute(items: &[OrderLine], tax_rate_pct: Decimal) -> Result<Self, DomainError> {
        let subtotal = items
            .iter()
            .try_fold(Decimal::ZERO, |sum, item| sum.checked_add(item.line_total))
            .ok_or_else(total_overflow)?;
        let tax = subtotal
            .checked_mul(tax_rate_pct)
            .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
            .ok_or_else(total_overflow)?
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let total = subtotal.checked_add(tax).ok_or_else(total_overflow)?;
        Ok(Self { subtotal, tax, total })
    }
}

fn total_overflow() -> DomainError {
    DomainError::InvalidOrder("order total overflows".to_string())
}
