use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use satshop_core::AppError;
use satshop_storage::Ledger;
use satshop_storage::models::{NewProduct, Product};

const PRICE_SCALE: u32 = 8;

/// Product and promo code maintenance. Operator-only surfaces call into this.
pub struct Catalog {
    ledger: Arc<dyn Ledger>,
}

/// Product together with its remaining code count.
#[derive(Debug, Clone)]
pub struct StockLevel {
    pub product: Product,
    pub available: usize,
}

impl Catalog {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    pub async fn products(&self) -> Result<Vec<Product>, AppError> {
        self.ledger.list_products().await
    }

    pub async fn add_product(&self, product: NewProduct) -> Result<Product, AppError> {
        let product = NewProduct {
            category: product.category.trim().to_string(),
            name: product.name.trim().to_string(),
            price: product.price,
            description: product.description.trim().to_string(),
        };
        if product.name.is_empty() || product.category.is_empty() {
            return Err(AppError::InvalidInput(
                "Product name and category must not be empty.".into(),
            ));
        }
        check_price(product.price)?;

        let created = self.ledger.insert_product(&product).await?;
        tracing::info!(product_id = created.id, name = %created.name, price = %created.price, "Product added");
        Ok(created)
    }

    /// Add codes to a product. Blank and repeated codes are dropped.
    pub async fn add_codes<I, S>(&self, product_id: i64, codes: I) -> Result<u64, AppError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let codes: Vec<String> = codes
            .into_iter()
            .map(|c| c.as_ref().trim().to_string())
            .filter(|c| !c.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if codes.is_empty() {
            return Err(AppError::InvalidInput("No promo codes given.".into()));
        }

        let added = self.ledger.insert_promo_codes(product_id, &codes).await?;
        tracing::info!(product_id, offered = codes.len(), added, "Promo codes added");
        Ok(added)
    }

    pub async fn stock(&self, product_id: i64) -> Result<StockLevel, AppError> {
        let product = self
            .ledger
            .get_product(product_id)
            .await?
            .ok_or(AppError::UnknownProduct(product_id))?;
        let available = self.ledger.unused_codes(product_id).await?.len();
        Ok(StockLevel { product, available })
    }
}

/// Parse a user-typed BTC amount such as `0.0015`.
pub fn parse_price(raw: &str) -> Result<Decimal, AppError> {
    let price = Decimal::from_str(raw.trim().replace(',', ".").as_str())
        .map_err(|_| AppError::InvalidInput(format!("`{}` is not a valid price.", raw.trim())))?;
    check_price(price)?;
    Ok(price)
}

/// Prices are stored as `NUMERIC(20,8)`; anything finer would be rounded away.
fn check_price(price: Decimal) -> Result<(), AppError> {
    if price.is_sign_negative() {
        return Err(AppError::InvalidInput("Price must not be negative.".into()));
    }
    if price.normalize().scale() > PRICE_SCALE {
        return Err(AppError::InvalidInput(
            "Prices have at most 8 decimal places.".into(),
        ));
    }
    Ok(())
}
