//! Chain observer: reconciles wallet payments with the ledger.
//!
//! Each cycle:
//! 1. Load the scan cursor and the issued addresses
//! 2. Register any newly issued addresses with the node, rescanning from
//!    each user's registration time
//! 3. Ask the node for receives since the cursor; record or refresh each one
//!    paid to an issued address
//! 4. Settle (mark + credit, atomically) those that reached the threshold
//! 5. Advance the cursor only if every item went through and every issued
//!    address is watched
//!
//! A failing item is logged and retried next cycle without blocking the others.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use satshop_bitcoin::{PaymentSource, ReceivedPayment};
use satshop_core::{AppError, Backoff, with_timeout};
use satshop_storage::Ledger;
use satshop_storage::models::{NewDeposit, Settlement};
use tokio::sync::{Mutex, watch};

use crate::notify::{CreditNotice, Notifier};
use crate::registration::watch_label;

/// Upper bound on one credit notification.
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Counters for one poll cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollReport {
    /// Payments the node reported.
    pub seen: usize,
    /// Payments to addresses this shop never issued.
    pub ignored: usize,
    /// Recorded but still below the threshold.
    pub pending: usize,
    pub credited: usize,
    /// Already settled in an earlier cycle.
    pub skipped: usize,
    pub failed: usize,
    /// Issued addresses the node could not be told about yet.
    pub unwatched: usize,
    pub cursor_advanced: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct WatchOutcome {
    added: usize,
    failed: usize,
}

enum ItemOutcome {
    Pending,
    Credited(CreditNotice),
    AlreadySettled,
}

pub struct ChainObserver {
    ledger: Arc<dyn Ledger>,
    source: Arc<dyn PaymentSource>,
    notifier: Arc<dyn Notifier>,
    threshold: u32,
    interval: Duration,
    watched: Mutex<HashSet<String>>,
}

impl ChainObserver {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        source: Arc<dyn PaymentSource>,
        notifier: Arc<dyn Notifier>,
        threshold: u32,
        interval: Duration,
    ) -> Self {
        Self {
            ledger,
            source,
            notifier,
            threshold,
            interval,
            watched: Mutex::new(HashSet::new()),
        }
    }

    /// Run cycles until `shutdown` flips to `true` (or its sender is dropped).
    ///
    /// The signal is only checked between cycles, so a cycle in progress always
    /// finishes its ledger writes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = Backoff::default();

        tracing::info!(
            threshold = self.threshold,
            interval_secs = self.interval.as_secs(),
            "Chain observer started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.poll_once().await {
                Ok(report) => {
                    backoff.reset();
                    if report.seen > 0 {
                        tracing::info!(
                            seen = report.seen,
                            credited = report.credited,
                            pending = report.pending,
                            failed = report.failed,
                            "Poll cycle complete"
                        );
                    }
                    self.interval
                }
                Err(e) if e.is_transient() => {
                    let delay = backoff.next_delay();
                    tracing::warn!(error = %e, retry_in_secs = delay.as_secs(), "Node unavailable");
                    delay
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::error!(error = %e, retry_in_secs = delay.as_secs(), "Poll cycle failed");
                    delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Chain observer stopped");
    }

    /// Run a single reconciliation cycle.
    pub async fn poll_once(&self) -> Result<PollReport, AppError> {
        let cursor = self.ledger.scan_cursor().await?;
        let owners = self.ledger.issued_addresses().await?;
        let watch = self.watch_new_addresses(&owners).await;

        let batch = self
            .source
            .payments_since(cursor.as_deref(), self.threshold)
            .await?;

        let mut report = PollReport {
            seen: batch.payments.len(),
            unwatched: watch.failed,
            ..PollReport::default()
        };

        for payment in &batch.payments {
            let Some(&user_id) = owners.get(&payment.address) else {
                report.ignored += 1;
                continue;
            };

            match self.process(payment, user_id).await {
                Ok(ItemOutcome::Pending) => report.pending += 1,
                Ok(ItemOutcome::AlreadySettled) => report.skipped += 1,
                Ok(ItemOutcome::Credited(notice)) => {
                    report.credited += 1;
                    tracing::info!(
                        user_id,
                        txid = %notice.txid,
                        amount = %notice.amount,
                        balance = %notice.balance,
                        "Deposit settled"
                    );
                    if let Err(e) =
                        with_timeout(NOTIFY_TIMEOUT, self.notifier.deposit_credited(&notice)).await
                    {
                        tracing::warn!(user_id, error = %e, "Credit notification failed");
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        txid = %payment.txid,
                        vout = payment.vout,
                        user_id,
                        error = %e,
                        "Deposit processing failed, will retry next cycle"
                    );
                }
            }
        }

        let unchanged = cursor.as_deref() == Some(batch.next_cursor.as_str());
        if report.unwatched > 0 {
            tracing::warn!(
                unwatched = report.unwatched,
                "Holding scan cursor until every issued address is watched"
            );
        } else if report.failed == 0 && !batch.next_cursor.is_empty() && !unchanged {
            self.ledger.set_scan_cursor(&batch.next_cursor).await?;
            report.cursor_advanced = true;
        }

        Ok(report)
    }

    /// Register every issued address with the node. Returns how many succeeded.
    pub async fn sync_watch_list(&self) -> Result<usize, AppError> {
        let owners = self.ledger.issued_addresses().await?;
        self.watched.lock().await.clear();
        let outcome = self.watch_new_addresses(&owners).await;
        if outcome.failed > 0 {
            tracing::warn!(failed = outcome.failed, "Some issued addresses are not watched yet");
        }
        Ok(outcome.added)
    }

    async fn watch_new_addresses(&self, owners: &HashMap<String, i64>) -> WatchOutcome {
        let missing: Vec<(String, i64)> = {
            let watched = self.watched.lock().await;
            owners
                .iter()
                .filter(|(address, _)| !watched.contains(*address))
                .map(|(address, user_id)| (address.clone(), *user_id))
                .collect()
        };

        let mut outcome = WatchOutcome::default();
        for (address, user_id) in missing {
            match self.watch(&address, user_id).await {
                Ok(()) => {
                    self.watched.lock().await.insert(address);
                    outcome.added += 1;
                }
                Err(e) => {
                    outcome.failed += 1;
                    tracing::warn!(user_id, %address, error = %e, "Could not watch address");
                }
            }
        }
        outcome
    }

    async fn watch(&self, address: &str, user_id: i64) -> Result<(), AppError> {
        let user = self
            .ledger
            .get_user(user_id)
            .await?
            .ok_or(AppError::UnknownUser(user_id))?;
        self.source
            .watch_address(address, &watch_label(user_id), user.created_at.timestamp())
            .await
    }

    async fn process(
        &self,
        payment: &ReceivedPayment,
        user_id: i64,
    ) -> Result<ItemOutcome, AppError> {
        let confirmations = i32::try_from(payment.confirmations).unwrap_or(i32::MAX);

        let recorded = self
            .ledger
            .observe_deposit(&NewDeposit {
                txid: payment.txid.clone(),
                vout: payment.vout,
                user_id,
                address: payment.address.clone(),
                amount: payment.amount,
                confirmations,
            })
            .await?;

        let Some(deposit) = recorded else {
            return Ok(ItemOutcome::AlreadySettled);
        };

        if payment.confirmations < self.threshold {
            tracing::debug!(
                txid = %deposit.txid,
                confirmations = payment.confirmations,
                threshold = self.threshold,
                "Deposit below threshold"
            );
            return Ok(ItemOutcome::Pending);
        }

        match self
            .ledger
            .settle_deposit(&deposit.txid, deposit.vout, confirmations)
            .await?
        {
            Settlement::Credited {
                user_id,
                amount,
                balance,
            } => Ok(ItemOutcome::Credited(CreditNotice {
                user_id,
                txid: deposit.txid,
                amount,
                balance,
            })),
            Settlement::AlreadySettled => Ok(ItemOutcome::AlreadySettled),
        }
    }
}
