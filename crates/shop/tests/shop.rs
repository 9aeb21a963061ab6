mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{Harness, btc, fund, harness, stocked_product};
use satshop_core::AppError;
use satshop_storage::{Ledger, MemoryLedger};

#[tokio::test]
async fn registration_is_idempotent() {
    let h: Harness<MemoryLedger> = harness();
    let registrar = h.shop.registrar().unwrap();

    let first = registrar.register(42).await.unwrap();
    let second = registrar.register(42).await.unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.user.address, second.user.address);
    assert_eq!(first.user.address, common::deriver().derive(42).unwrap());
    assert_eq!(
        h.source.watched.lock().unwrap().get(&first.user.address),
        Some(&first.user.created_at.timestamp())
    );
}

#[tokio::test]
async fn registration_rejects_invalid_ids() {
    let h: Harness<MemoryLedger> = harness();
    let err = h.shop.registrar().unwrap().register(0).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidUserId(0)));
}

#[tokio::test]
async fn services_need_their_collaborators() {
    let shop = satshop_shop::ShopContext::new(Arc::new(MemoryLedger::new()));
    assert!(matches!(shop.registrar(), Err(AppError::Config(_))));
    assert!(matches!(shop.observer(), Err(AppError::Config(_))));
}

#[tokio::test]
async fn redemption_hands_out_a_code_and_debits_the_price() {
    let h: Harness<MemoryLedger> = harness();
    fund(h.ledger.as_ref(), 5, btc("0.01")).await;
    let product = stocked_product(h.ledger.as_ref(), btc("0.004"), &["CODE-1"]).await;

    let redemption = h.shop.redemption().redeem(5, product.id).await.unwrap();

    assert_eq!(redemption.code(), "CODE-1");
    assert_eq!(redemption.balance, btc("0.006"));
    assert_eq!(h.ledger.get_user(5).await.unwrap().unwrap().balance, btc("0.006"));
    assert!(h.ledger.unused_codes(product.id).await.unwrap().is_empty());
    assert_eq!(h.ledger.purchases(5, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn insufficient_balance_changes_nothing() {
    let h: Harness<MemoryLedger> = harness();
    fund(h.ledger.as_ref(), 5, btc("100")).await;
    let product = stocked_product(h.ledger.as_ref(), btc("150"), &["CODE-1"]).await;

    let err = h.shop.redemption().redeem(5, product.id).await.unwrap_err();

    assert!(matches!(
        err,
        AppError::InsufficientBalance { balance, price } if balance == btc("100") && price == btc("150")
    ));
    assert_eq!(h.ledger.get_user(5).await.unwrap().unwrap().balance, btc("100"));
    assert_eq!(h.ledger.unused_codes(product.id).await.unwrap().len(), 1);
    assert!(h.ledger.purchases(5, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_stock_is_reported_regardless_of_balance() {
    let h: Harness<MemoryLedger> = harness();
    fund(h.ledger.as_ref(), 5, btc("1000")).await;
    fund(h.ledger.as_ref(), 6, btc("0")).await;
    let product = stocked_product(h.ledger.as_ref(), btc("1"), &[]).await;

    for user_id in [5, 6] {
        let err = h.shop.redemption().redeem(user_id, product.id).await.unwrap_err();
        assert!(matches!(err, AppError::OutOfStock(_)), "{err}");
    }
    assert_eq!(h.ledger.get_user(5).await.unwrap().unwrap().balance, btc("1000"));
}

#[tokio::test]
async fn unknown_product_and_user_are_rejected() {
    let h: Harness<MemoryLedger> = harness();
    let err = h.shop.redemption().redeem(5, 99).await.unwrap_err();
    assert!(matches!(err, AppError::UnknownProduct(99)));

    let product = stocked_product(h.ledger.as_ref(), btc("1"), &["X"]).await;
    let err = h.shop.redemption().redeem(5, product.id).await.unwrap_err();
    assert!(matches!(err, AppError::UnknownUser(5)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redemptions_of_the_last_code() {
    let h: Harness<MemoryLedger> = harness();
    fund(h.ledger.as_ref(), 5, btc("10")).await;
    let product_id = stocked_product(h.ledger.as_ref(), btc("1"), &["LAST"]).await.id;
    let engine = Arc::new(h.shop.redemption());

    let (a, b) = tokio::join!(
        tokio::spawn({
            let engine = engine.clone();
            async move { engine.redeem(5, product_id).await }
        }),
        tokio::spawn({
            let engine = engine.clone();
            async move { engine.redeem(5, product_id).await }
        }),
    );
    let results = [a.unwrap(), b.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(r, Err(AppError::OutOfStock(_)))));
    assert_eq!(h.ledger.get_user(5).await.unwrap().unwrap().balance, btc("9"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn codes_are_never_shared_and_balances_stay_non_negative() {
    let h: Harness<MemoryLedger> = harness();
    let product_id = stocked_product(h.ledger.as_ref(), btc("1"), &["A", "B", "C", "D", "E"])
        .await
        .id;
    for user_id in 1..=4 {
        fund(h.ledger.as_ref(), user_id, btc("2.5")).await;
    }
    let engine = Arc::new(h.shop.redemption());

    let mut tasks = Vec::new();
    for user_id in 1..=4 {
        for _ in 0..3 {
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move {
                engine.redeem(user_id, product_id).await
            }));
        }
    }
    let mut codes = Vec::new();
    for task in tasks {
        if let Ok(r) = task.await.unwrap() {
            codes.push(r.purchase.code);
        }
    }

    let distinct: HashSet<&String> = codes.iter().collect();
    assert_eq!(distinct.len(), codes.len());
    assert_eq!(codes.len(), 5);
    for user_id in 1..=4 {
        let balance = h.ledger.get_user(user_id).await.unwrap().unwrap().balance;
        assert!(balance >= btc("0"), "user {user_id}: {balance}");
    }
}
