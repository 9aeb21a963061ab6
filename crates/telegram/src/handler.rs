use std::collections::HashSet;
use std::fmt::Write as _;

use rust_decimal::Decimal;
use satshop_core::AppError;
use satshop_shop::{Catalog, RedemptionEngine, Registrar, ShopContext};

use crate::commands::{Command, HELP, OPERATOR_HELP};

const RECENT_PURCHASES: i64 = 10;

/// Turns chat commands into shop operations and renders the replies.
pub struct Handler {
    shop: ShopContext,
    registrar: Registrar,
    redemption: RedemptionEngine,
    catalog: Catalog,
    operators: HashSet<i64>,
}

impl Handler {
    pub fn new(shop: ShopContext, operators: &[i64]) -> Result<Self, AppError> {
        Ok(Self {
            registrar: shop.registrar()?,
            redemption: shop.redemption(),
            catalog: shop.catalog(),
            operators: operators.iter().copied().collect(),
            shop,
        })
    }

    /// Reply for a message from `user_id`, or `None` when it is not addressed to us.
    pub async fn handle(&self, user_id: i64, text: &str) -> Option<String> {
        let command = match Command::parse(text) {
            Ok(Some(command)) => command,
            Ok(None) => return None,
            Err(e) => return Some(e.user_message()),
        };

        if command.is_privileged() && !self.operators.contains(&user_id) {
            tracing::warn!(user_id, ?command, "Operator command from non-operator");
            return Some("This command is only available to operators.".into());
        }

        match self.execute(user_id, command).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                if !e.is_domain() {
                    tracing::error!(user_id, error = %e, "Command failed");
                }
                Some(e.user_message())
            }
        }
    }

    async fn execute(&self, user_id: i64, command: Command) -> Result<String, AppError> {
        match command {
            Command::Start => {
                let registration = self.registrar.register(user_id).await?;
                let greeting = if registration.created {
                    "Welcome!"
                } else {
                    "Welcome back!"
                };
                Ok(format!(
                    "{greeting} Send BTC to your personal deposit address:\n{}\n\n\
                     Deposits are credited after {} confirmations. /help lists all commands.",
                    registration.user.address,
                    self.shop.confirmations()
                ))
            }
            Command::Balance => {
                let user = self
                    .shop
                    .ledger()
                    .get_user(user_id)
                    .await?
                    .ok_or(AppError::UnknownUser(user_id))?;
                Ok(format!("Your balance: {} BTC", btc(user.balance)))
            }
            Command::Products => {
                let products = self.catalog.products().await?;
                if products.is_empty() {
                    return Ok("No products yet.".into());
                }
                let mut reply = String::from("Products:\n");
                for p in products {
                    let _ = write!(reply, "\n#{} [{}] {}: {} BTC", p.id, p.category, p.name, btc(p.price));
                    if !p.description.is_empty() {
                        let _ = write!(reply, "\n    {}", p.description);
                    }
                }
                reply.push_str("\n\nBuy with /redeem <id>.");
                Ok(reply)
            }
            Command::Redeem(product_id) => {
                let redemption = self.redemption.redeem(user_id, product_id).await?;
                Ok(format!(
                    "Your code for {}:\n{}\n\nRemaining balance: {} BTC",
                    redemption.product.name,
                    redemption.code(),
                    btc(redemption.balance)
                ))
            }
            Command::Purchases => {
                let purchases = self.shop.ledger().purchases(user_id, RECENT_PURCHASES).await?;
                if purchases.is_empty() {
                    return Ok("You have no purchases yet.".into());
                }
                let mut reply = String::from("Recent purchases:\n");
                for p in purchases {
                    let _ = write!(
                        reply,
                        "\n{} product #{}: {} ({} BTC)",
                        p.purchased_at.format("%Y-%m-%d %H:%M"),
                        p.product_id,
                        p.code,
                        btc(p.price)
                    );
                }
                Ok(reply)
            }
            Command::Help => {
                if self.operators.contains(&user_id) {
                    Ok(format!("{HELP}\n\nOperator:\n{OPERATOR_HELP}"))
                } else {
                    Ok(HELP.to_string())
                }
            }
            Command::AddProduct(product) => {
                let created = self.catalog.add_product(product).await?;
                Ok(format!(
                    "Added product #{}: {} at {} BTC",
                    created.id,
                    created.name,
                    btc(created.price)
                ))
            }
            Command::AddCodes { product_id, codes } => {
                let offered = codes.len();
                let added = self.catalog.add_codes(product_id, codes).await?;
                Ok(format!(
                    "Added {added} of {offered} codes to product #{product_id}."
                ))
            }
            Command::Stock(product_id) => {
                let stock = self.catalog.stock(product_id).await?;
                Ok(format!(
                    "#{} {}: {} codes left",
                    stock.product.id, stock.product.name, stock.available
                ))
            }
            Command::Unknown(name) => Ok(format!("Unknown command /{name}. Try /help.")),
        }
    }
}

/// BTC amount without trailing zeros.
pub(crate) fn btc(amount: Decimal) -> String {
    amount.normalize().to_string()
}
