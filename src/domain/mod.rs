use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::Serialize;
use uuid::Uuid;

/// Currency units that must be spent to earn a single loyalty point
pub const CURRENCY_UNITS_PER_POINT: u32 = 50;

/// Currency units of discount granted for each redeemed point
pub const DISCOUNT_PER_POINT: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Member {
    /// Unique identifier for the `Member`
    pub member_id: Uuid,
    pub name: String,
    /// Unique across all members
    pub email: String,
    pub phone: Option<String>,
    /// Number of accrued loyalty points
    ///
    /// This is only ever changed through a ledger unit, so it always matches the sum of the
    /// member's ledger deltas.
    pub loyalty_points: u32,
    pub created_at: DateTime<Utc>,
}

impl Member {
    pub fn new(name: String, email: String, phone: Option<String>) -> Self {
        Self {
            member_id: Uuid::new_v4(),
            name,
            email,
            phone,
            loyalty_points: 0,
            created_at: Utc::now(),
        }
    }
}

/// Item that can be purchased in the shop
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Product {
    pub product_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Unit price, never negative
    pub price: Decimal,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn new(
        name: String,
        description: Option<String>,
        price: Decimal,
        category: Option<String>,
    ) -> Self {
        Self {
            product_id: Uuid::new_v4(),
            name,
            description,
            price,
            category,
            created_at: Utc::now(),
        }
    }
}

/// Partial edit of a product
///
/// Fields left as `None` keep their stored value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub category: Option<String>,
}

impl ProductChanges {
    pub fn apply(self, product: &mut Product) {
        if let Some(name) = self.name {
            product.name = name;
        }
        if let Some(description) = self.description {
            product.description = Some(description);
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(category) = self.category {
            product.category = Some(category);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Earned,
    Spent,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Earned => "earned",
            EntryKind::Spent => "spent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "earned" => Some(EntryKind::Earned),
            "spent" => Some(EntryKind::Spent),
            _ => None,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger entry waiting to be committed by a ledger unit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerDraft {
    pub product_id: Option<Uuid>,
    /// Difference in points
    ///
    /// A positive number adds points to the current total. A negative number removes from it.
    pub delta_points: i32,
    pub kind: EntryKind,
    pub description: String,
}

/// Committed, immutable record of one points-affecting event
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub entry_id: Uuid,
    pub member_id: Uuid,
    pub product_id: Option<Uuid>,
    pub delta_points: i32,
    pub kind: EntryKind,
    /// Message explaining the reason for this entry.
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn from_draft(member_id: Uuid, draft: LedgerDraft) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            member_id,
            product_id: draft.product_id,
            delta_points: draft.delta_points,
            kind: draft.kind,
            description: draft.description,
            created_at: Utc::now(),
        }
    }
}

/// Ledger entry joined with the product it references, if any
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LedgerRecord {
    #[serde(flatten)]
    pub entry: LedgerEntry,
    pub product_name: Option<String>,
    pub product_price: Option<Decimal>,
}

/// Sum of all deltas in a member's ledger
///
/// A member's balance must always be equal to this value.
#[cfg(test)]
pub(crate) fn ledger_total<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> i64 {
    entries
        .into_iter()
        .map(|entry| entry.delta_points as i64)
        .sum()
}

/// Points earned for a purchase of `total_amount`
///
/// Partial points are truncated: a purchase of 49 units earns nothing. Returns `None` if the
/// amount is negative or the result would not fit a points delta.
pub fn points_for_purchase(total_amount: Decimal) -> Option<u32> {
    if total_amount.is_sign_negative() {
        return None;
    }
    let points = (total_amount / Decimal::from(CURRENCY_UNITS_PER_POINT)).floor();
    points.to_i32().and_then(|points| u32::try_from(points).ok())
}

/// Outcome of applying points to a purchase
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Redemption {
    pub points_redeemed: u32,
    pub discount_amount: Decimal,
    pub original_amount: Decimal,
    /// Amount left to pay, floored at zero
    pub final_amount: Decimal,
    /// Points debited beyond what the purchase could absorb
    ///
    /// These are still taken from the balance in full.
    pub excess_points: u32,
}

impl Redemption {
    pub fn compute(points_redeemed: u32, purchase_amount: Decimal) -> Self {
        let discount_amount = Decimal::from(points_redeemed) * Decimal::from(DISCOUNT_PER_POINT);
        let final_amount = (purchase_amount - discount_amount).max(Decimal::ZERO);
        let excess = (discount_amount - purchase_amount).max(Decimal::ZERO);
        let excess_points = (excess / Decimal::from(DISCOUNT_PER_POINT))
            .floor()
            .to_u32()
            .unwrap_or(points_redeemed);

        Self {
            points_redeemed,
            discount_amount,
            original_amount: purchase_amount,
            final_amount,
            excess_points,
        }
    }
}
