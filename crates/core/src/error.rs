use rust_decimal::Decimal;
use thiserror::Error;

/// Shared error type used across all satshop crates.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid wallet seed: {0}")]
    InvalidSeed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("User {0} is already registered")]
    DuplicateUser(i64),

    #[error("User {0} is not registered")]
    UnknownUser(i64),

    #[error("Invalid user id {0}")]
    InvalidUserId(i64),

    #[error("Product {0} does not exist")]
    UnknownProduct(i64),

    #[error("Insufficient balance: have {balance}, need {price}")]
    InsufficientBalance { balance: Decimal, price: Decimal },

    #[error("Product {0} is out of stock")]
    OutOfStock(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Other(#[from] eyre::Error),
}

impl AppError {
    /// Failures that go away by themselves; callers retry on the next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    /// Business-rule rejections that are shown to the user as-is.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Self::DuplicateUser(_)
                | Self::UnknownUser(_)
                | Self::InvalidUserId(_)
                | Self::UnknownProduct(_)
                | Self::InsufficientBalance { .. }
                | Self::OutOfStock(_)
                | Self::InvalidInput(_)
        )
    }

    /// Text suitable for an end user. Infrastructure details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::DuplicateUser(_) => "You are already registered.".into(),
            Self::UnknownUser(_) => "You are not registered yet, send /start first.".into(),
            Self::InvalidUserId(_) => "This account cannot be registered.".into(),
            Self::UnknownProduct(id) => format!("Product {id} does not exist."),
            Self::InsufficientBalance { balance, price } => format!(
                "Insufficient balance: the product costs {price} BTC, your balance is {balance} BTC."
            ),
            Self::OutOfStock(_) => "Sorry, this product is out of stock.".into(),
            Self::InvalidInput(reason) => reason.clone(),
            Self::Network(_) | Self::Timeout(_) | Self::Database(_) => {
                "Temporary failure, please try again in a minute.".into()
            }
            _ => "Something went wrong, please try again later.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(AppError::Timeout(30).is_transient());
        assert!(AppError::Network("refused".into()).is_transient());
        assert!(!AppError::Database("deadlock".into()).is_transient());
        assert!(AppError::OutOfStock(3).is_domain());
        assert!(!AppError::Rpc("-18".into()).is_domain());
    }

    #[test]
    fn storage_details_are_not_leaked() {
        let msg = AppError::Database("relation \"users\" does not exist".into()).user_message();
        assert!(!msg.contains("relation"));
    }

    #[test]
    fn insufficient_balance_mentions_both_amounts() {
        let err = AppError::InsufficientBalance {
            balance: Decimal::from(100),
            price: Decimal::from(150),
        };
        let msg = err.user_message();
        assert!(msg.contains("150"));
        assert!(msg.contains("100"));
    }
}
