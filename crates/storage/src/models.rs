use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ─── User ───────────────────────────────────────────────────────────────────

/// A registered chat user and their deposit address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: i64,
    pub address: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

// ─── Deposit ────────────────────────────────────────────────────────────────

/// An on-chain payment to an issued address, keyed by outpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Deposit {
    pub txid: String,
    pub vout: i32,
    pub user_id: i64,
    pub address: String,
    pub amount: Decimal,
    pub confirmations: i32,
    pub observed_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Deposit {
    pub fn is_settled(&self) -> bool {
        self.settled_at.is_some()
    }
}

/// Insert-ready deposit (no timestamps).
#[derive(Debug, Clone)]
pub struct NewDeposit {
    pub txid: String,
    pub vout: i32,
    pub user_id: i64,
    pub address: String,
    pub amount: Decimal,
    pub confirmations: i32,
}

/// Result of asking the ledger to settle a deposit.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// The deposit was settled now and its amount credited.
    Credited {
        user_id: i64,
        amount: Decimal,
        balance: Decimal,
    },
    /// A previous call already settled it; nothing changed.
    AlreadySettled,
}

// ─── Product ────────────────────────────────────────────────────────────────

/// A catalog entry. Prices share the unit of user balances (BTC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub category: String,
    pub name: String,
    pub price: Decimal,
    pub description: String,
}

/// Insert-ready product (no `id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub category: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub description: String,
}

// ─── PromoCode ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PromoCode {
    pub code: String,
    pub product_id: i64,
    pub used: bool,
}

// ─── Purchase ───────────────────────────────────────────────────────────────

/// Append-only record of a redeemed code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Purchase {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub code: String,
    pub price: Decimal,
    pub purchased_at: DateTime<Utc>,
}

/// Outcome of a successful redemption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redeemed {
    pub purchase: Purchase,
    /// Balance left after the price was deducted.
    pub balance: Decimal,
}
