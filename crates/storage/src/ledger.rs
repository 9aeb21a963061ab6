use std::collections::HashMap;

use async_trait::async_trait;
use satshop_core::AppError;
use sqlx::PgPool;

use crate::models::*;
use crate::repos;

const CURSOR_KEY: &str = "last_block_hash";

/// Persistence interface for every ledger entity.
///
/// Operations touching more than one entity (`settle_deposit`, `redeem`) are
/// atomic: either all of their writes become visible or none do.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Register a user. Fails with `DuplicateUser` if the id already has an address.
    async fn create_user(&self, user_id: i64, address: &str) -> Result<User, AppError>;

    /// Return the existing user, or create it with `address`. The flag is `true` on creation.
    async fn get_or_create_user(&self, user_id: i64, address: &str)
    -> Result<(User, bool), AppError>;

    async fn get_user(&self, user_id: i64) -> Result<Option<User>, AppError>;

    /// Issued address → owning user id.
    async fn issued_addresses(&self) -> Result<HashMap<String, i64>, AppError>;

    async fn get_deposit(&self, txid: &str, vout: i32) -> Result<Option<Deposit>, AppError>;

    /// Record a sighting. Returns `None` if the deposit is already settled.
    async fn observe_deposit(&self, deposit: &NewDeposit) -> Result<Option<Deposit>, AppError>;

    /// Mark a recorded deposit settled and credit its owner, as one unit.
    /// Settling twice is a no-op that returns `Settlement::AlreadySettled`.
    async fn settle_deposit(
        &self,
        txid: &str,
        vout: i32,
        confirmations: i32,
    ) -> Result<Settlement, AppError>;

    async fn pending_deposits(&self) -> Result<Vec<Deposit>, AppError>;

    async fn list_products(&self) -> Result<Vec<Product>, AppError>;

    async fn get_product(&self, id: i64) -> Result<Option<Product>, AppError>;

    async fn insert_product(&self, product: &NewProduct) -> Result<Product, AppError>;

    /// Add codes to a product's stock; existing codes are skipped. Returns the number added.
    async fn insert_promo_codes(&self, product_id: i64, codes: &[String]) -> Result<u64, AppError>;

    async fn unused_codes(&self, product_id: i64) -> Result<Vec<PromoCode>, AppError>;

    /// Deduct the price, mark one unused code used and write the purchase, as one unit.
    ///
    /// `OutOfStock` takes precedence over `InsufficientBalance`.
    async fn redeem(&self, user_id: i64, product: &Product) -> Result<Redeemed, AppError>;

    async fn purchases(&self, user_id: i64, limit: i64) -> Result<Vec<Purchase>, AppError>;

    /// Observer cursor (last block hash handed out by the node).
    async fn scan_cursor(&self) -> Result<Option<String>, AppError>;

    async fn set_scan_cursor(&self, cursor: &str) -> Result<(), AppError>;
}

pub(crate) fn db_err(e: sqlx::Error) -> AppError {
    AppError::Database(e.to_string())
}

/// PostgreSQL-backed ledger.
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn create_user(&self, user_id: i64, address: &str) -> Result<User, AppError> {
        if user_id <= 0 {
            return Err(AppError::InvalidUserId(user_id));
        }
        repos::insert_user(&self.pool, user_id, address)
            .await
            .map_err(db_err)?
            .ok_or(AppError::DuplicateUser(user_id))
    }

    async fn get_or_create_user(
        &self,
        user_id: i64,
        address: &str,
    ) -> Result<(User, bool), AppError> {
        match self.create_user(user_id, address).await {
            Ok(user) => Ok((user, true)),
            Err(AppError::DuplicateUser(_)) => {
                let user = repos::get_user(&self.pool, user_id)
                    .await
                    .map_err(db_err)?
                    .ok_or_else(|| {
                        AppError::Database(format!("address {address} is issued to another user"))
                    })?;
                if user.address != address {
                    tracing::warn!(
                        user_id,
                        stored = %user.address,
                        derived = %address,
                        "Stored address differs from derivation; keeping stored address"
                    );
                }
                Ok((user, false))
            }
            Err(e) => Err(e),
        }
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>, AppError> {
        repos::get_user(&self.pool, user_id).await.map_err(db_err)
    }

    async fn issued_addresses(&self) -> Result<HashMap<String, i64>, AppError> {
        let rows = repos::get_issued_addresses(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().collect())
    }

    async fn get_deposit(&self, txid: &str, vout: i32) -> Result<Option<Deposit>, AppError> {
        repos::get_deposit(&self.pool, txid, vout)
            .await
            .map_err(db_err)
    }

    async fn observe_deposit(&self, deposit: &NewDeposit) -> Result<Option<Deposit>, AppError> {
        repos::upsert_deposit(&self.pool, deposit)
            .await
            .map_err(db_err)
    }

    async fn settle_deposit(
        &self,
        txid: &str,
        vout: i32,
        confirmations: i32,
    ) -> Result<Settlement, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let Some((user_id, amount)) =
            repos::mark_deposit_settled(&mut *tx, txid, vout, confirmations)
                .await
                .map_err(db_err)?
        else {
            tx.rollback().await.map_err(db_err)?;
            return match self.get_deposit(txid, vout).await? {
                Some(_) => Ok(Settlement::AlreadySettled),
                None => Err(AppError::Database(format!(
                    "deposit {txid}:{vout} has not been recorded"
                ))),
            };
        };

        let balance = repos::credit_balance(&mut *tx, user_id, amount)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        Ok(Settlement::Credited {
            user_id,
            amount,
            balance,
        })
    }

    async fn pending_deposits(&self) -> Result<Vec<Deposit>, AppError> {
        repos::get_pending_deposits(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn list_products(&self) -> Result<Vec<Product>, AppError> {
        repos::get_all_products(&self.pool).await.map_err(db_err)
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>, AppError> {
        repos::get_product(&self.pool, id).await.map_err(db_err)
    }

    async fn insert_product(&self, product: &NewProduct) -> Result<Product, AppError> {
        repos::insert_product(&self.pool, product)
            .await
            .map_err(db_err)
    }

    async fn insert_promo_codes(&self, product_id: i64, codes: &[String]) -> Result<u64, AppError> {
        if self.get_product(product_id).await?.is_none() {
            return Err(AppError::UnknownProduct(product_id));
        }
        repos::insert_promo_codes_batch(&self.pool, product_id, codes)
            .await
            .map_err(db_err)
    }

    async fn unused_codes(&self, product_id: i64) -> Result<Vec<PromoCode>, AppError> {
        repos::get_unused_codes(&self.pool, product_id)
            .await
            .map_err(db_err)
    }

    async fn redeem(&self, user_id: i64, product: &Product) -> Result<Redeemed, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Serialises redemptions of the same user until commit.
        let user = repos::lock_user(&mut *tx, user_id)
            .await
            .map_err(db_err)?
            .ok_or(AppError::UnknownUser(user_id))?;

        if !repos::has_unused_code(&mut *tx, product.id)
            .await
            .map_err(db_err)?
        {
            return Err(AppError::OutOfStock(product.id));
        }

        if user.balance < product.price {
            return Err(AppError::InsufficientBalance {
                balance: user.balance,
                price: product.price,
            });
        }

        let code = repos::claim_promo_code(&mut *tx, product.id)
            .await
            .map_err(db_err)?
            .ok_or(AppError::OutOfStock(product.id))?;

        let balance = repos::debit_balance(&mut *tx, user_id, product.price)
            .await
            .map_err(db_err)?
            .ok_or(AppError::InsufficientBalance {
                balance: user.balance,
                price: product.price,
            })?;

        let purchase = repos::insert_purchase(&mut *tx, user_id, product.id, &code, product.price)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        Ok(Redeemed { purchase, balance })
    }

    async fn purchases(&self, user_id: i64, limit: i64) -> Result<Vec<Purchase>, AppError> {
        repos::get_user_purchases(&self.pool, user_id, limit)
            .await
            .map_err(db_err)
    }

    async fn scan_cursor(&self) -> Result<Option<String>, AppError> {
        repos::get_observer_value(&self.pool, CURSOR_KEY)
            .await
            .map_err(db_err)
    }

    async fn set_scan_cursor(&self, cursor: &str) -> Result<(), AppError> {
        repos::set_observer_value(&self.pool, CURSOR_KEY, cursor)
            .await
            .map_err(db_err)
    }
}
