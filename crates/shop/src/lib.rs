//! Storefront services: deposit address registration, chain observation and
//! crediting, promo code redemption and catalog maintenance.

pub mod catalog;
pub mod context;
pub mod notify;
pub mod observer;
pub mod redemption;
pub mod registration;

pub use catalog::{Catalog, StockLevel, parse_price};
pub use context::ShopContext;
pub use notify::{CreditNotice, LogNotifier, Notifier};
pub use observer::{ChainObserver, PollReport};
pub use redemption::{Redemption, RedemptionEngine};
pub use registration::{Registrar, Registration};
