use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

use crate::rpc::WalletTransaction;

/// Satoshi precision.
const BTC_SCALE: u32 = 8;

/// An incoming payment to one of the wallet's addresses.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedPayment {
    pub txid: String,
    pub vout: i32,
    pub address: String,
    pub amount: Decimal,
    pub confirmations: u32,
}

/// Attempt to decode a wallet entry as an incoming payment.
///
/// Only `receive` entries with an address and a positive amount qualify.
/// Conflicted transactions (negative confirmations) are dropped.
pub fn decode_receive(tx: &WalletTransaction) -> Option<ReceivedPayment> {
    if tx.category != "receive" || tx.confirmations < 0 {
        return None;
    }
    let address = tx.address.clone()?;
    let amount = btc_amount(tx.amount)?;
    if amount <= Decimal::ZERO {
        return None;
    }

    Some(ReceivedPayment {
        txid: tx.txid.clone(),
        vout: i32::try_from(tx.vout).ok()?,
        address,
        amount,
        confirmations: u32::try_from(tx.confirmations).unwrap_or(u32::MAX),
    })
}

/// Node amounts are JSON floats; round back to whole satoshis.
pub fn btc_amount(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value).map(|d| d.round_dp(BTC_SCALE))
}
