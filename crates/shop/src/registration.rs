use std::sync::Arc;

use satshop_bitcoin::{AddressDeriver, PaymentSource};
use satshop_core::AppError;
use satshop_storage::Ledger;
use satshop_storage::models::User;

/// Wallet label attached to a user's watch-only address.
pub fn watch_label(user_id: i64) -> String {
    format!("satshop:{user_id}")
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub user: User,
    /// `false` when the user already existed.
    pub created: bool,
}

/// Gives each chat user their deposit address.
pub struct Registrar {
    ledger: Arc<dyn Ledger>,
    source: Arc<dyn PaymentSource>,
    deriver: Arc<AddressDeriver>,
}

impl Registrar {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        source: Arc<dyn PaymentSource>,
        deriver: Arc<AddressDeriver>,
    ) -> Self {
        Self {
            ledger,
            source,
            deriver,
        }
    }

    /// Get-or-create: registering an existing user returns their stored address.
    pub async fn register(&self, user_id: i64) -> Result<Registration, AppError> {
        if let Some(user) = self.ledger.get_user(user_id).await? {
            return Ok(Registration {
                user,
                created: false,
            });
        }

        let address = self.deriver.derive(user_id)?;
        let (user, created) = self.ledger.get_or_create_user(user_id, &address).await?;

        if created {
            tracing::info!(user_id, address = %user.address, "Registered user");
            // Best effort: the observer registers any address missed here on its next cycle.
            if let Err(e) = self
                .source
                .watch_address(&user.address, &watch_label(user_id), user.created_at.timestamp())
                .await
            {
                tracing::warn!(user_id, error = %e, "Could not watch new address yet");
            }
        }

        Ok(Registration { user, created })
    }
}
