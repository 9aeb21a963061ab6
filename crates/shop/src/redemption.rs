use std::sync::Arc;

use rust_decimal::Decimal;
use satshop_core::AppError;
use satshop_storage::Ledger;
use satshop_storage::models::{Product, Purchase, Redeemed};

/// A successful exchange of balance for a promo code.
#[derive(Debug, Clone)]
pub struct Redemption {
    pub product: Product,
    pub purchase: Purchase,
    pub balance: Decimal,
}

impl Redemption {
    pub fn code(&self) -> &str {
        &self.purchase.code
    }
}

pub struct RedemptionEngine {
    ledger: Arc<dyn Ledger>,
}

impl RedemptionEngine {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Exchange `user_id`'s balance for one unused code of `product_id`.
    ///
    /// Deduction, code consumption and the purchase record commit together or
    /// not at all.
    pub async fn redeem(&self, user_id: i64, product_id: i64) -> Result<Redemption, AppError> {
        let product = self
            .ledger
            .get_product(product_id)
            .await?
            .ok_or(AppError::UnknownProduct(product_id))?;

        match self.ledger.redeem(user_id, &product).await {
            Ok(Redeemed { purchase, balance }) => {
                tracing::info!(
                    user_id,
                    product_id,
                    purchase_id = purchase.id,
                    price = %product.price,
                    balance = %balance,
                    "Redeemed promo code"
                );
                Ok(Redemption {
                    product,
                    purchase,
                    balance,
                })
            }
            Err(e) if e.is_domain() => {
                tracing::info!(user_id, product_id, reason = %e, "Redemption refused");
                Err(e)
            }
            Err(e) => {
                tracing::error!(user_id, product_id, error = %e, "Redemption failed");
                Err(e)
            }
        }
    }
}
