use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use satshop_core::AppError;
use tokio::sync::Mutex;

use crate::ledger::Ledger;
use crate::models::*;

/// In-process ledger. A single mutex is held across each operation, which
/// gives every multi-entity mutation the same all-or-nothing visibility as a
/// database transaction.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<i64, User>,
    deposits: BTreeMap<(String, i32), Deposit>,
    products: BTreeMap<i64, Product>,
    codes: BTreeMap<String, PromoCode>,
    purchases: Vec<Purchase>,
    cursor: Option<String>,
    next_product_id: i64,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn create_user(&self, user_id: i64, address: &str) -> Result<User, AppError> {
        if user_id <= 0 {
            return Err(AppError::InvalidUserId(user_id));
        }
        let mut state = self.state.lock().await;
        if state.users.contains_key(&user_id) || state.users.values().any(|u| u.address == address)
        {
            return Err(AppError::DuplicateUser(user_id));
        }
        let user = User {
            user_id,
            address: address.to_string(),
            balance: Default::default(),
            created_at: Utc::now(),
        };
        state.users.insert(user_id, user.clone());
        Ok(user)
    }

    async fn get_or_create_user(
        &self,
        user_id: i64,
        address: &str,
    ) -> Result<(User, bool), AppError> {
        match self.create_user(user_id, address).await {
            Ok(user) => Ok((user, true)),
            Err(AppError::DuplicateUser(_)) => self
                .get_user(user_id)
                .await?
                .map(|user| (user, false))
                .ok_or_else(|| {
                    AppError::Database(format!("address {address} is issued to another user"))
                }),
            Err(e) => Err(e),
        }
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>, AppError> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn issued_addresses(&self) -> Result<HashMap<String, i64>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .map(|u| (u.address.clone(), u.user_id))
            .collect())
    }

    async fn get_deposit(&self, txid: &str, vout: i32) -> Result<Option<Deposit>, AppError> {
        let state = self.state.lock().await;
        Ok(state.deposits.get(&(txid.to_string(), vout)).cloned())
    }

    async fn observe_deposit(&self, deposit: &NewDeposit) -> Result<Option<Deposit>, AppError> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&deposit.user_id) {
            return Err(AppError::Database(format!(
                "deposit references unknown user {}",
                deposit.user_id
            )));
        }
        let key = (deposit.txid.clone(), deposit.vout);
        match state.deposits.get_mut(&key) {
            Some(existing) if existing.is_settled() => Ok(None),
            Some(existing) => {
                existing.confirmations = deposit.confirmations;
                Ok(Some(existing.clone()))
            }
            None => {
                let row = Deposit {
                    txid: deposit.txid.clone(),
                    vout: deposit.vout,
                    user_id: deposit.user_id,
                    address: deposit.address.clone(),
                    amount: deposit.amount,
                    confirmations: deposit.confirmations,
                    observed_at: Utc::now(),
                    settled_at: None,
                };
                state.deposits.insert(key, row.clone());
                Ok(Some(row))
            }
        }
    }

    async fn settle_deposit(
        &self,
        txid: &str,
        vout: i32,
        confirmations: i32,
    ) -> Result<Settlement, AppError> {
        let mut state = self.state.lock().await;
        let key = (txid.to_string(), vout);

        let (user_id, amount) = match state.deposits.get(&key) {
            None => {
                return Err(AppError::Database(format!(
                    "deposit {txid}:{vout} has not been recorded"
                )));
            }
            Some(d) if d.is_settled() => return Ok(Settlement::AlreadySettled),
            Some(d) => (d.user_id, d.amount),
        };

        let user = state
            .users
            .get_mut(&user_id)
            .ok_or(AppError::UnknownUser(user_id))?;
        user.balance += amount;
        let balance = user.balance;

        if let Some(d) = state.deposits.get_mut(&key) {
            d.settled_at = Some(Utc::now());
            d.confirmations = d.confirmations.max(confirmations);
        }

        Ok(Settlement::Credited {
            user_id,
            amount,
            balance,
        })
    }

    async fn pending_deposits(&self) -> Result<Vec<Deposit>, AppError> {
        let state = self.state.lock().await;
        let mut pending: Vec<Deposit> = state
            .deposits
            .values()
            .filter(|d| !d.is_settled())
            .cloned()
            .collect();
        pending.sort_by_key(|d| d.observed_at);
        Ok(pending)
    }

    async fn list_products(&self) -> Result<Vec<Product>, AppError> {
        let state = self.state.lock().await;
        let mut products: Vec<Product> = state.products.values().cloned().collect();
        products.sort_by(|a, b| a.category.cmp(&b.category).then(a.id.cmp(&b.id)));
        Ok(products)
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>, AppError> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn insert_product(&self, product: &NewProduct) -> Result<Product, AppError> {
        let mut state = self.state.lock().await;
        state.next_product_id += 1;
        let row = Product {
            id: state.next_product_id,
            category: product.category.clone(),
            name: product.name.clone(),
            price: product.price,
            description: product.description.clone(),
        };
        state.products.insert(row.id, row.clone());
        Ok(row)
    }

    async fn insert_promo_codes(&self, product_id: i64, codes: &[String]) -> Result<u64, AppError> {
        let mut state = self.state.lock().await;
        if !state.products.contains_key(&product_id) {
            return Err(AppError::UnknownProduct(product_id));
        }
        let mut added = 0;
        for code in codes {
            if state.codes.contains_key(code) {
                continue;
            }
            state.codes.insert(
                code.clone(),
                PromoCode {
                    code: code.clone(),
                    product_id,
                    used: false,
                },
            );
            added += 1;
        }
        Ok(added)
    }

    async fn unused_codes(&self, product_id: i64) -> Result<Vec<PromoCode>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .codes
            .values()
            .filter(|c| c.product_id == product_id && !c.used)
            .cloned()
            .collect())
    }

    async fn redeem(&self, user_id: i64, product: &Product) -> Result<Redeemed, AppError> {
        let mut state = self.state.lock().await;

        let balance = state
            .users
            .get(&user_id)
            .map(|u| u.balance)
            .ok_or(AppError::UnknownUser(user_id))?;

        let code = state
            .codes
            .values()
            .find(|c| c.product_id == product.id && !c.used)
            .map(|c| c.code.clone())
            .ok_or(AppError::OutOfStock(product.id))?;

        if balance < product.price {
            return Err(AppError::InsufficientBalance {
                balance,
                price: product.price,
            });
        }

        // Every check passed; apply all writes while still holding the lock.
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or(AppError::UnknownUser(user_id))?;
        user.balance -= product.price;
        let balance = user.balance;

        if let Some(c) = state.codes.get_mut(&code) {
            c.used = true;
        }

        let purchase = Purchase {
            id: state.purchases.len() as i64 + 1,
            user_id,
            product_id: product.id,
            code,
            price: product.price,
            purchased_at: Utc::now(),
        };
        state.purchases.push(purchase.clone());

        Ok(Redeemed { purchase, balance })
    }

    async fn purchases(&self, user_id: i64, limit: i64) -> Result<Vec<Purchase>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .purchases
            .iter()
            .rev()
            .filter(|p| p.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn scan_cursor(&self) -> Result<Option<String>, AppError> {
        Ok(self.state.lock().await.cursor.clone())
    }

    async fn set_scan_cursor(&self, cursor: &str) -> Result<(), AppError> {
        self.state.lock().await.cursor = Some(cursor.to_string());
        Ok(())
    }
}
