#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use satshop_bitcoin::{AddressDeriver, PaymentBatch, PaymentSource, ReceivedPayment, parse_network};
use satshop_core::{AddressKind, AppError};
use satshop_shop::{CreditNotice, Notifier, ShopContext};
use satshop_storage::models::*;
use satshop_storage::{Ledger, MemoryLedger};

pub const SEED: &str = "000102030405060708090a0b0c0d0e0f";

pub fn deriver() -> Arc<AddressDeriver> {
    Arc::new(
        AddressDeriver::new(
            SEED,
            parse_network("regtest").unwrap(),
            "m/84'/1'/0'",
            AddressKind::P2wpkh,
        )
        .unwrap(),
    )
}

pub fn btc(raw: &str) -> Decimal {
    raw.parse().unwrap()
}

/// Payment source driven by the test: whatever is in `payments` is reported on
/// every call, with `tip` as the next cursor.
#[derive(Default)]
pub struct ScriptedSource {
    pub payments: Mutex<Vec<ReceivedPayment>>,
    pub tip: Mutex<String>,
    pub cursors_seen: Mutex<Vec<Option<String>>>,
    /// Watched address and the rescan start it was registered with.
    pub watched: Mutex<HashMap<String, i64>>,
    pub fail_watch: Mutex<bool>,
}

impl ScriptedSource {
    pub fn pay(&self, txid: &str, vout: i32, address: &str, amount: Decimal, confirmations: u32) {
        let mut payments = self.payments.lock().unwrap();
        payments.retain(|p| !(p.txid == txid && p.vout == vout));
        payments.push(ReceivedPayment {
            txid: txid.into(),
            vout,
            address: address.into(),
            amount,
            confirmations,
        });
    }

    pub fn set_tip(&self, tip: &str) {
        *self.tip.lock().unwrap() = tip.into();
    }
}

#[async_trait]
impl PaymentSource for ScriptedSource {
    async fn payments_since(
        &self,
        cursor: Option<&str>,
        _target_confirmations: u32,
    ) -> Result<PaymentBatch, AppError> {
        self.cursors_seen
            .lock()
            .unwrap()
            .push(cursor.map(str::to_string));
        Ok(PaymentBatch {
            payments: self.payments.lock().unwrap().clone(),
            next_cursor: self.tip.lock().unwrap().clone(),
        })
    }

    async fn watch_address(&self, address: &str, _label: &str, since: i64) -> Result<(), AppError> {
        if *self.fail_watch.lock().unwrap() {
            return Err(AppError::Network("connection refused".into()));
        }
        self.watched.lock().unwrap().insert(address.to_string(), since);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<CreditNotice>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deposit_credited(&self, notice: &CreditNotice) -> Result<(), AppError> {
        self.notices.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

/// Ledger whose deposit writes fail for chosen transaction ids.
#[derive(Default)]
pub struct FlakyLedger {
    pub inner: MemoryLedger,
    pub broken_txids: Mutex<HashSet<String>>,
}

impl FlakyLedger {
    pub fn break_txid(&self, txid: &str) {
        self.broken_txids.lock().unwrap().insert(txid.into());
    }

    pub fn heal(&self) {
        self.broken_txids.lock().unwrap().clear();
    }

    fn check(&self, txid: &str) -> Result<(), AppError> {
        if self.broken_txids.lock().unwrap().contains(txid) {
            return Err(AppError::Database("could not serialize access".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for FlakyLedger {
    async fn create_user(&self, user_id: i64, address: &str) -> Result<User, AppError> {
        self.inner.create_user(user_id, address).await
    }

    async fn get_or_create_user(
        &self,
        user_id: i64,
        address: &str,
    ) -> Result<(User, bool), AppError> {
        self.inner.get_or_create_user(user_id, address).await
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>, AppError> {
        self.inner.get_user(user_id).await
    }

    async fn issued_addresses(&self) -> Result<HashMap<String, i64>, AppError> {
        self.inner.issued_addresses().await
    }

    async fn get_deposit(&self, txid: &str, vout: i32) -> Result<Option<Deposit>, AppError> {
        self.inner.get_deposit(txid, vout).await
    }

    async fn observe_deposit(&self, deposit: &NewDeposit) -> Result<Option<Deposit>, AppError> {
        self.check(&deposit.txid)?;
        self.inner.observe_deposit(deposit).await
    }

    async fn settle_deposit(
        &self,
        txid: &str,
        vout: i32,
        confirmations: i32,
    ) -> Result<Settlement, AppError> {
        self.check(txid)?;
        self.inner.settle_deposit(txid, vout, confirmations).await
    }

    async fn pending_deposits(&self) -> Result<Vec<Deposit>, AppError> {
        self.inner.pending_deposits().await
    }

    async fn list_products(&self) -> Result<Vec<Product>, AppError> {
        self.inner.list_products().await
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>, AppError> {
        self.inner.get_product(id).await
    }

    async fn insert_product(&self, product: &NewProduct) -> Result<Product, AppError> {
        self.inner.insert_product(product).await
    }

    async fn insert_promo_codes(&self, product_id: i64, codes: &[String]) -> Result<u64, AppError> {
        self.inner.insert_promo_codes(product_id, codes).await
    }

    async fn unused_codes(&self, product_id: i64) -> Result<Vec<PromoCode>, AppError> {
        self.inner.unused_codes(product_id).await
    }

    async fn redeem(&self, user_id: i64, product: &Product) -> Result<Redeemed, AppError> {
        self.inner.redeem(user_id, product).await
    }

    async fn purchases(&self, user_id: i64, limit: i64) -> Result<Vec<Purchase>, AppError> {
        self.inner.purchases(user_id, limit).await
    }

    async fn scan_cursor(&self) -> Result<Option<String>, AppError> {
        self.inner.scan_cursor().await
    }

    async fn set_scan_cursor(&self, cursor: &str) -> Result<(), AppError> {
        self.inner.set_scan_cursor(cursor).await
    }
}

pub struct Harness<L: Ledger + 'static> {
    pub ledger: Arc<L>,
    pub source: Arc<ScriptedSource>,
    pub notifier: Arc<RecordingNotifier>,
    pub shop: ShopContext,
}

pub fn harness<L: Ledger + Default + 'static>() -> Harness<L> {
    let ledger = Arc::new(L::default());
    let source = Arc::new(ScriptedSource::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let shop = ShopContext::new(ledger.clone())
        .with_source(source.clone())
        .with_deriver(deriver())
        .with_notifier(notifier.clone())
        .with_confirmations(2);
    Harness {
        ledger,
        source,
        notifier,
        shop,
    }
}

/// Give `user_id` a settled balance of `amount` directly through the ledger.
pub async fn fund(ledger: &dyn Ledger, user_id: i64, amount: Decimal) {
    if ledger.get_user(user_id).await.unwrap().is_none() {
        ledger
            .create_user(user_id, &format!("bcrt1qfunded{user_id}"))
            .await
            .unwrap();
    }
    let txid = format!("fund-{user_id}-{amount}");
    let address = ledger.get_user(user_id).await.unwrap().unwrap().address;
    ledger
        .observe_deposit(&NewDeposit {
            txid: txid.clone(),
            vout: 0,
            user_id,
            address,
            amount,
            confirmations: 6,
        })
        .await
        .unwrap();
    ledger.settle_deposit(&txid, 0, 6).await.unwrap();
}

pub async fn stocked_product(ledger: &dyn Ledger, price: Decimal, codes: &[&str]) -> Product {
    let product = ledger
        .insert_product(&NewProduct {
            category: "games".into(),
            name: "Steam key".into(),
            price,
            description: "Activation key".into(),
        })
        .await
        .unwrap();
    if !codes.is_empty() {
        let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
        ledger.insert_promo_codes(product.id, &codes).await.unwrap();
    }
    product
}
