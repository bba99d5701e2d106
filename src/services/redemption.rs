//! Redeem-then-credit as a two-step saga.
//!
//! | step            | forward                         | compensation |
//! |-----------------|---------------------------------|--------------|
//! | `MarkRedeemed`  | conditional update on the row   | `unredeem`   |
//! | `CreditWallet`  | wallet credit, bounded timeout  | none         |
//!
//! The code is marked first so two concurrent requests can never both reach the
//! wallet. When the credit fails the mark is rolled back. When the rollback fails too,
//! the code stays spent without any credit behind it; that outcome is returned as
//! [`SagaOutcome::CompensationFailed`] and logged on the `brew::anomaly` target for
//! manual reconciliation.

use crate::models::promo_code::RedeemedPromoCode;
use crate::services::promo_store::{PromoCodeStore, PromoError, PromoResult};
use crate::services::wallet::{CreditRequest, WalletCredit, WalletError};
use crate::utils::code_gen::normalize_code;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaStep {
    MarkRedeemed,
    CreditWallet,
}

#[derive(Debug)]
pub enum SagaOutcome {
    /// Both steps went through.
    Completed(RedeemedPromoCode),
    /// The conditional update matched nothing: unknown code or somebody else won.
    NotAcquired,
    /// The credit failed and the code was handed back.
    Compensated { cause: WalletError },
    /// The credit failed and handing the code back failed as well.
    CompensationFailed {
        cause: WalletError,
        compensation_error: PromoError,
    },
}

pub struct RedemptionSaga<'a> {
    store: &'a PromoCodeStore,
    wallet: &'a dyn WalletCredit,
    credit_timeout: Duration,
}

impl<'a> RedemptionSaga<'a> {
    pub fn new(
        store: &'a PromoCodeStore,
        wallet: &'a dyn WalletCredit,
        credit_timeout: Duration,
    ) -> Self {
        Self {
            store,
            wallet,
            credit_timeout,
        }
    }

    /// Storage errors in the forward `MarkRedeemed` step are returned as `Err`,
    /// nothing has changed at that point.
    pub async fn run(&self, code: &str, client_id: i64) -> PromoResult<SagaOutcome> {
        let canonical = normalize_code(code);
        tracing::debug!(code = %canonical, client_id, step = ?SagaStep::MarkRedeemed, "saga step");
        let Some(redeemed) = self.store.redeem(&canonical, client_id).await? else {
            return Ok(SagaOutcome::NotAcquired);
        };

        tracing::debug!(code = %canonical, client_id, step = ?SagaStep::CreditWallet, "saga step");
        let req = CreditRequest::for_promo_code(&canonical, client_id, redeemed.amount);
        let cause = match self.credit(&req).await {
            Ok(()) => return Ok(SagaOutcome::Completed(redeemed)),
            Err(e) => e,
        };

        tracing::warn!(
            code = %canonical,
            client_id,
            amount = redeemed.amount,
            "Wallet credit failed ({cause}), rolling back redemption"
        );
        match self.store.unredeem(&canonical).await {
            Ok(()) => Ok(SagaOutcome::Compensated { cause }),
            Err(compensation_error) => {
                tracing::error!(
                    target: "brew::anomaly",
                    code = %canonical,
                    client_id,
                    amount = redeemed.amount,
                    credit_error = %cause,
                    compensation_error = %compensation_error,
                    "Promo code is marked redeemed but no wallet credit was applied, manual reconciliation required"
                );
                Ok(SagaOutcome::CompensationFailed {
                    cause,
                    compensation_error,
                })
            }
        }
    }

    async fn credit(&self, req: &CreditRequest) -> Result<(), WalletError> {
        tokio::time::timeout(self.credit_timeout, self.wallet.credit(req))
            .await
            .map_err(|_| WalletError::Timeout)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::states::db::test_support::temp_db;
    use crate::services::states::db::{BrewDatabaseExecutor, DataBaseError, DataBaseState};
    use crate::services::wallet::WalletResult;
    use crate::services::wallet::test_support::StubWallet;
    use async_trait::async_trait;

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn completes_and_credits_once() {
        let (_dir, db) = temp_db().await;
        let store = PromoCodeStore::new(db, 5);
        let wallet = StubWallet::default();
        let created = store.create(40_000, 1).await.unwrap();

        let saga = RedemptionSaga::new(&store, &wallet, TIMEOUT);
        let outcome = saga.run(&created.code, 9).await.unwrap();
        assert!(matches!(outcome, SagaOutcome::Completed(ref r) if r.amount == 40_000));
        let second = saga.run(&created.code, 10).await.unwrap();
        assert!(matches!(second, SagaOutcome::NotAcquired));

        let credited = wallet.credited();
        assert_eq!(credited.len(), 1);
        assert_eq!(credited[0].client_id, 9);
        assert_eq!(credited[0].amount, 40_000);
    }

    #[tokio::test]
    async fn failed_credit_is_compensated() {
        let (_dir, db) = temp_db().await;
        let store = PromoCodeStore::new(db, 5);
        let wallet = StubWallet::failing();
        let created = store.create(40_000, 1).await.unwrap();

        let saga = RedemptionSaga::new(&store, &wallet, TIMEOUT);
        let outcome = saga.run(&created.code, 9).await.unwrap();
        assert!(matches!(outcome, SagaOutcome::Compensated { .. }));
        let stored = store.get(&created.code).await.unwrap().unwrap();
        assert!(!stored.is_redeemed());
        assert_eq!(stored.redeemed_at, None);

        wallet.set_failing(false);
        let retry = saga.run(&created.code, 9).await.unwrap();
        assert!(matches!(retry, SagaOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn hanging_credit_times_out_and_compensates() {
        let (_dir, db) = temp_db().await;
        let store = PromoCodeStore::new(db, 5);
        let wallet = StubWallet::hanging(Duration::from_secs(3600));
        let created = store.create(40_000, 1).await.unwrap();

        let saga = RedemptionSaga::new(&store, &wallet, Duration::from_millis(100));
        let outcome = saga.run(&created.code, 9).await.unwrap();
        assert!(matches!(
            outcome,
            SagaOutcome::Compensated {
                cause: WalletError::Timeout
            }
        ));
        assert!(!store.get(&created.code).await.unwrap().unwrap().is_redeemed());
    }

    /// Deletes the row behind the saga's back, so the rollback has nothing to update.
    struct VanishingRowWallet {
        db: DataBaseState,
    }

    #[async_trait]
    impl WalletCredit for VanishingRowWallet {
        async fn credit(&self, req: &CreditRequest) -> WalletResult<()> {
            let code = req
                .idempotency_key
                .trim_start_matches("promo-code:")
                .split(':')
                .next()
                .unwrap()
                .to_owned();
            self.db
                .single(async |mut exec: BrewDatabaseExecutor<'_>| {
                    exec.promo_code().delete_promo_code(&code).await
                })
                .await
                .unwrap();
            Err(WalletError::Rejected {
                status: reqwest::StatusCode::BAD_GATEWAY,
            })
        }
    }

    #[tokio::test]
    async fn failed_compensation_is_reported() {
        let (_dir, db) = temp_db().await;
        let store = PromoCodeStore::new(db.clone(), 5);
        let wallet = VanishingRowWallet { db };
        let created = store.create(40_000, 1).await.unwrap();

        let saga = RedemptionSaga::new(&store, &wallet, TIMEOUT);
        let outcome = saga.run(&created.code, 9).await.unwrap();
        assert!(matches!(
            outcome,
            SagaOutcome::CompensationFailed {
                cause: WalletError::Rejected { .. },
                compensation_error: PromoError::DataBase(DataBaseError::NoAffectedRows),
            }
        ));
    }
}
