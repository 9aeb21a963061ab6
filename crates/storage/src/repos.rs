use rust_decimal::Decimal;
use sqlx::{Executor, PgPool, Postgres, QueryBuilder};

use crate::models::*;

// ─── User Queries ───────────────────────────────────────────────────────────

/// Insert a new user. Returns `None` if the id (or address) is already taken.
pub async fn insert_user<'e, E>(
    executor: E,
    user_id: i64,
    address: &str,
) -> Result<Option<User>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (user_id, address)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(address)
    .fetch_optional(executor)
    .await
}

/// Get a single user by id.
pub async fn get_user<'e, E>(executor: E, user_id: i64) -> Result<Option<User>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await
}

/// Get a user and hold its row lock until the surrounding transaction ends.
pub async fn lock_user<'e, E>(executor: E, user_id: i64) -> Result<Option<User>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(executor)
        .await
}

/// All issued deposit addresses with their owners.
pub async fn get_issued_addresses(pool: &PgPool) -> Result<Vec<(String, i64)>, sqlx::Error> {
    sqlx::query_as("SELECT address, user_id FROM users")
        .fetch_all(pool)
        .await
}

/// Add `amount` to a user's balance, returning the new balance.
pub async fn credit_balance<'e, E>(
    executor: E,
    user_id: i64,
    amount: Decimal,
) -> Result<Decimal, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: (Decimal,) = sqlx::query_as(
        "UPDATE users SET balance = balance + $2 WHERE user_id = $1 RETURNING balance",
    )
    .bind(user_id)
    .bind(amount)
    .fetch_one(executor)
    .await?;
    Ok(row.0)
}

/// Subtract `amount` only if the balance covers it. `None` means it did not.
pub async fn debit_balance<'e, E>(
    executor: E,
    user_id: i64,
    amount: Decimal,
) -> Result<Option<Decimal>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(Decimal,)> = sqlx::query_as(
        r#"
        UPDATE users SET balance = balance - $2
        WHERE user_id = $1 AND balance >= $2
        RETURNING balance
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(|r| r.0))
}

// ─── Deposit Queries ────────────────────────────────────────────────────────

pub async fn get_deposit<'e, E>(
    executor: E,
    txid: &str,
    vout: i32,
) -> Result<Option<Deposit>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, Deposit>("SELECT * FROM deposits WHERE txid = $1 AND vout = $2")
        .bind(txid)
        .bind(vout)
        .fetch_optional(executor)
        .await
}

/// Insert a first sighting or refresh the confirmation count of an unsettled deposit.
/// Returns `None` when the deposit is already settled (row left untouched).
pub async fn upsert_deposit<'e, E>(
    executor: E,
    deposit: &NewDeposit,
) -> Result<Option<Deposit>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, Deposit>(
        r#"
        INSERT INTO deposits (txid, vout, user_id, address, amount, confirmations)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (txid, vout) DO UPDATE
        SET confirmations = EXCLUDED.confirmations
        WHERE deposits.settled_at IS NULL
        RETURNING *
        "#,
    )
    .bind(&deposit.txid)
    .bind(deposit.vout)
    .bind(deposit.user_id)
    .bind(&deposit.address)
    .bind(deposit.amount)
    .bind(deposit.confirmations)
    .fetch_optional(executor)
    .await
}

/// Flip `settled_at` if still null. Returns `(user_id, amount)` only for the winning call.
pub async fn mark_deposit_settled<'e, E>(
    executor: E,
    txid: &str,
    vout: i32,
    confirmations: i32,
) -> Result<Option<(i64, Decimal)>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        UPDATE deposits
        SET settled_at = NOW(), confirmations = GREATEST(confirmations, $3)
        WHERE txid = $1 AND vout = $2 AND settled_at IS NULL
        RETURNING user_id, amount
        "#,
    )
    .bind(txid)
    .bind(vout)
    .bind(confirmations)
    .fetch_optional(executor)
    .await
}

/// Deposits seen on chain but not yet credited, oldest first.
pub async fn get_pending_deposits(pool: &PgPool) -> Result<Vec<Deposit>, sqlx::Error> {
    sqlx::query_as::<_, Deposit>(
        "SELECT * FROM deposits WHERE settled_at IS NULL ORDER BY observed_at",
    )
    .fetch_all(pool)
    .await
}

// ─── Product Queries ────────────────────────────────────────────────────────

pub async fn insert_product(pool: &PgPool, product: &NewProduct) -> Result<Product, sqlx::Error> {
    sqlx::query_as::<_, Product>(
        r#"
        INSERT INTO products (category, name, price, description)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(&product.category)
    .bind(&product.name)
    .bind(product.price)
    .bind(&product.description)
    .fetch_one(pool)
    .await
}

/// Get the whole catalog grouped by category.
pub async fn get_all_products(pool: &PgPool) -> Result<Vec<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY category, id")
        .fetch_all(pool)
        .await
}

pub async fn get_product(pool: &PgPool, id: i64) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

// ─── Promo Code Queries ─────────────────────────────────────────────────────

/// Insert a batch of codes using a single multi-value INSERT.
/// Skips codes that already exist; returns how many were added.
pub async fn insert_promo_codes_batch<'e, E>(
    executor: E,
    product_id: i64,
    codes: &[String],
) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    if codes.is_empty() {
        return Ok(0);
    }

    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO promocodes (code, product_id) ");
    qb.push_values(codes, |mut b, code| {
        b.push_bind(code).push_bind(product_id);
    });
    qb.push(" ON CONFLICT (code) DO NOTHING");

    let result = qb.build().execute(executor).await?;
    Ok(result.rows_affected())
}

pub async fn get_unused_codes(pool: &PgPool, product_id: i64) -> Result<Vec<PromoCode>, sqlx::Error> {
    sqlx::query_as::<_, PromoCode>(
        "SELECT * FROM promocodes WHERE product_id = $1 AND NOT used ORDER BY code",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await
}

pub async fn has_unused_code<'e, E>(executor: E, product_id: i64) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM promocodes WHERE product_id = $1 AND NOT used)",
    )
    .bind(product_id)
    .fetch_one(executor)
    .await?;
    Ok(row.0)
}

/// Mark the lowest unused code of a product as used and return it.
///
/// Rows locked by a concurrent claim are skipped, so two transactions never
/// receive the same code.
pub async fn claim_promo_code<'e, E>(
    executor: E,
    product_id: i64,
) -> Result<Option<String>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        UPDATE promocodes SET used = TRUE
        WHERE code = (
            SELECT code FROM promocodes
            WHERE product_id = $1 AND NOT used
            ORDER BY code
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        AND NOT used
        RETURNING code
        "#,
    )
    .bind(product_id)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(|r| r.0))
}

// ─── Purchase Queries ───────────────────────────────────────────────────────

pub async fn insert_purchase<'e, E>(
    executor: E,
    user_id: i64,
    product_id: i64,
    code: &str,
    price: Decimal,
) -> Result<Purchase, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, Purchase>(
        r#"
        INSERT INTO purchases (user_id, product_id, code, price)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .bind(code)
    .bind(price)
    .fetch_one(executor)
    .await
}

/// Most recent purchases of a user.
pub async fn get_user_purchases(
    pool: &PgPool,
    user_id: i64,
    limit: i64,
) -> Result<Vec<Purchase>, sqlx::Error> {
    sqlx::query_as::<_, Purchase>(
        "SELECT * FROM purchases WHERE user_id = $1 ORDER BY purchased_at DESC, id DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

// ─── Observer State ─────────────────────────────────────────────────────────

pub async fn get_observer_value(pool: &PgPool, key: &str) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM observer_state WHERE key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.0))
}

pub async fn set_observer_value<'e, E>(executor: E, key: &str, value: &str) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO observer_state (key, value) VALUES ($1, $2)
        ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(executor)
    .await?;
    Ok(())
}
