use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use satshop_bitcoin::{AddressDeriver, PaymentBatch, PaymentSource, parse_network};
use satshop_core::{AddressKind, AppError};
use satshop_shop::ShopContext;
use satshop_storage::models::NewDeposit;
use satshop_storage::{Ledger, MemoryLedger};
use satshop_telegram::Handler;

const OPERATOR: i64 = 900;
const CUSTOMER: i64 = 5_000_000_001;

struct QuietNode;

#[async_trait]
impl PaymentSource for QuietNode {
    async fn payments_since(
        &self,
        _cursor: Option<&str>,
        _target_confirmations: u32,
    ) -> Result<PaymentBatch, AppError> {
        Ok(PaymentBatch::default())
    }

    async fn watch_address(&self, _address: &str, _label: &str, _since: i64) -> Result<(), AppError> {
        Ok(())
    }
}

fn setup() -> (Arc<MemoryLedger>, Handler) {
    let ledger = Arc::new(MemoryLedger::new());
    let deriver = AddressDeriver::new(
        "000102030405060708090a0b0c0d0e0f",
        parse_network("regtest").unwrap(),
        "m/84'/1'/0'",
        AddressKind::P2wpkh,
    )
    .unwrap();
    let shop = ShopContext::new(ledger.clone())
        .with_source(Arc::new(QuietNode))
        .with_deriver(Arc::new(deriver))
        .with_confirmations(3);
    let handler = Handler::new(shop, &[OPERATOR]).unwrap();
    (ledger, handler)
}

async fn reply(handler: &Handler, user_id: i64, text: &str) -> String {
    handler.handle(user_id, text).await.expect("no reply")
}

async fn credit(ledger: &MemoryLedger, user_id: i64, amount: Decimal) {
    let address = ledger.get_user(user_id).await.unwrap().unwrap().address;
    ledger
        .observe_deposit(&NewDeposit {
            txid: format!("tx-{user_id}"),
            vout: 0,
            user_id,
            address,
            amount,
            confirmations: 3,
        })
        .await
        .unwrap();
    ledger
        .settle_deposit(&format!("tx-{user_id}"), 0, 3)
        .await
        .unwrap();
}

#[tokio::test]
async fn start_shows_the_same_address_every_time() {
    let (ledger, handler) = setup();

    let first = reply(&handler, CUSTOMER, "/start").await;
    let second = reply(&handler, CUSTOMER, "/start").await;

    let address = ledger.get_user(CUSTOMER).await.unwrap().unwrap().address;
    assert!(first.starts_with("Welcome!"));
    assert!(first.contains(&address));
    assert!(first.contains("3 confirmations"));
    assert!(second.starts_with("Welcome back!"));
    assert!(second.contains(&address));
}

#[tokio::test]
async fn balance_requires_registration() {
    let (_, handler) = setup();
    let msg = reply(&handler, CUSTOMER, "/balance").await;
    assert!(msg.contains("/start"), "{msg}");

    reply(&handler, CUSTOMER, "/start").await;
    assert_eq!(reply(&handler, CUSTOMER, "/balance").await, "Your balance: 0 BTC");
}

#[tokio::test]
async fn full_purchase_flow() {
    let (ledger, handler) = setup();

    let added = reply(
        &handler,
        OPERATOR,
        "/addproduct games | Steam key | 0.001 | Any region",
    )
    .await;
    assert!(added.starts_with("Added product #1"), "{added}");
    assert_eq!(
        reply(&handler, OPERATOR, "/addcodes 1 KEY-A KEY-A KEY-B").await,
        "Added 2 of 3 codes to product #1."
    );
    assert_eq!(
        reply(&handler, OPERATOR, "/stock 1").await,
        "#1 Steam key: 2 codes left"
    );

    reply(&handler, CUSTOMER, "/start").await;
    credit(&ledger, CUSTOMER, Decimal::new(15, 4)).await;

    let listing = reply(&handler, CUSTOMER, "/products").await;
    assert!(listing.contains("#1 [games] Steam key: 0.001 BTC"), "{listing}");

    let bought = reply(&handler, CUSTOMER, "/redeem 1").await;
    assert!(bought.contains("KEY-A"), "{bought}");
    assert!(bought.contains("Remaining balance: 0.0005 BTC"), "{bought}");

    let refused = reply(&handler, CUSTOMER, "/redeem 1").await;
    assert!(refused.starts_with("Insufficient balance"), "{refused}");

    let history = reply(&handler, CUSTOMER, "/purchases").await;
    assert!(history.contains("KEY-A"));
}

#[tokio::test]
async fn operator_commands_are_gated() {
    let (ledger, handler) = setup();
    let msg = reply(&handler, CUSTOMER, "/addproduct x | y | 1").await;
    assert!(msg.contains("operators"));
    assert!(ledger.list_products().await.unwrap().is_empty());

    assert!(!reply(&handler, CUSTOMER, "/help").await.contains("/addproduct"));
    assert!(reply(&handler, OPERATOR, "/help").await.contains("/addproduct"));
}

#[tokio::test]
async fn bad_input_gets_usage_and_chatter_is_ignored() {
    let (_, handler) = setup();
    assert!(reply(&handler, CUSTOMER, "/redeem abc").await.starts_with("Usage:"));
    assert!(reply(&handler, CUSTOMER, "/nope").await.contains("/help"));
    assert!(handler.handle(CUSTOMER, "thanks!").await.is_none());
}

#[tokio::test]
async fn redeeming_an_unknown_product() {
    let (_, handler) = setup();
    reply(&handler, CUSTOMER, "/start").await;
    assert_eq!(
        reply(&handler, CUSTOMER, "/redeem 77").await,
        "Product 77 does not exist."
    );
}
