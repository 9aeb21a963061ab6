use std::sync::Arc;
use std::time::Duration;

use satshop_bitcoin::{AddressDeriver, PaymentSource};
use satshop_core::{AppError, Settings};
use satshop_storage::Ledger;

use crate::catalog::Catalog;
use crate::notify::{LogNotifier, Notifier};
use crate::observer::ChainObserver;
use crate::redemption::RedemptionEngine;
use crate::registration::Registrar;

/// Collaborators shared by the shop services, built once by a binary's `main`.
///
/// Only the ledger is mandatory; services that need a missing collaborator
/// fail with `AppError::Config` when requested.
#[derive(Clone)]
pub struct ShopContext {
    ledger: Arc<dyn Ledger>,
    source: Option<Arc<dyn PaymentSource>>,
    deriver: Option<Arc<AddressDeriver>>,
    notifier: Arc<dyn Notifier>,
    confirmations: u32,
    poll_interval: Duration,
}

impl ShopContext {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self {
            ledger,
            source: None,
            deriver: None,
            notifier: Arc::new(LogNotifier),
            confirmations: 2,
            poll_interval: Duration::from_secs(30),
        }
    }

    /// Take the settlement threshold and poll interval from `settings`.
    pub fn configured(mut self, settings: &Settings) -> Self {
        self.confirmations = settings.confirmations;
        self.poll_interval = settings.poll_interval();
        self
    }

    pub fn with_source(mut self, source: Arc<dyn PaymentSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_deriver(mut self, deriver: Arc<AddressDeriver>) -> Self {
        self.deriver = Some(deriver);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_confirmations(mut self, confirmations: u32) -> Self {
        self.confirmations = confirmations;
        self
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn confirmations(&self) -> u32 {
        self.confirmations
    }

    pub fn registrar(&self) -> Result<Registrar, AppError> {
        Ok(Registrar::new(
            self.ledger.clone(),
            self.require_source()?,
            self.deriver
                .clone()
                .ok_or_else(|| AppError::Config("address deriver is not configured".into()))?,
        ))
    }

    pub fn observer(&self) -> Result<ChainObserver, AppError> {
        Ok(ChainObserver::new(
            self.ledger.clone(),
            self.require_source()?,
            self.notifier.clone(),
            self.confirmations,
            self.poll_interval,
        ))
    }

    pub fn redemption(&self) -> RedemptionEngine {
        RedemptionEngine::new(self.ledger.clone())
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(self.ledger.clone())
    }

    fn require_source(&self) -> Result<Arc<dyn PaymentSource>, AppError> {
        self.source
            .clone()
            .ok_or_else(|| AppError::Config("payment node is not configured".into()))
    }
}
