use crate::models::client::AuthedClient;
use crate::models::promo_code::{PromoCodeListItem, amount_in_range};
use crate::services::events::{Notification, TrackEvent};
use crate::services::identity::IdentityError;
use crate::services::promo_store::{CreatedPromoCode, PromoCodeStore, PromoError};
use crate::services::redemption::{RedemptionSaga, SagaOutcome};
use crate::services::states::BrewState;
use crate::services::states::db::{PageQueryBinder, PageQueryResult};
use crate::utils::code_gen::{format_code, is_well_formed, normalize_code};
use brew_macros::BrewBusinessError;
use std::sync::Arc;

#[derive(Debug, thiserror::Error, BrewBusinessError)]
pub enum PromoServiceError {
    #[error("Client {0} is not allowed to manage promo codes")]
    #[code(30101)]
    NotTeamMember(i64),
    #[error("Amount {0} is outside the allowed range")]
    #[code(30102)]
    InvalidAmount(i64),
    #[error("Malformed promo code")]
    #[code(30103)]
    InvalidCode,
    #[error("Promo code not found")]
    #[code(30104)]
    NotFound,
    #[error("Promo code already redeemed")]
    #[code(30105)]
    AlreadyRedeemed,
    #[error("Wallet credit failed, redemption rolled back")]
    #[code(30106)]
    CreditFailed,
    #[error("Wallet credit failed and the redemption could not be rolled back")]
    #[code(30107)]
    CreditFailedUncompensated,
    #[error("Redemption task aborted: {0}")]
    #[code(30108)]
    SagaAborted(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Store(#[from] PromoError),
}

pub type PromoServiceResult<T> = Result<T, PromoServiceError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoPreview {
    pub code: String,
    pub amount: i64,
    pub is_redeemed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemedPromo {
    pub code: String,
    pub amount: i64,
}

/// Proof that the caller passed the team group check. Only [`PromoService::authorize_team`]
/// hands these out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamMember(AuthedClient);

impl TeamMember {
    pub fn client_id(&self) -> i64 {
        self.0.client_id
    }
}

/// Request-level orchestration. Holds no promo code state between calls.
pub struct PromoService {
    state: Arc<BrewState>,
    store: PromoCodeStore,
}

impl PromoService {
    pub fn new(state: Arc<BrewState>) -> Self {
        let store = PromoCodeStore::new(state.db.clone(), state.config.promo.create_retry_limit);
        Self { state, store }
    }

    pub async fn authorize_team(&self, caller: AuthedClient) -> PromoServiceResult<TeamMember> {
        let profile = match self.state.identity.get_client_by_id(caller.client_id).await {
            Ok(p) => p,
            Err(IdentityError::ClientNotFound(id)) => {
                return Err(PromoServiceError::NotTeamMember(id));
            }
            Err(e) => return Err(e.into()),
        };
        if !profile.in_groups(&self.state.config.promo.team_group_ids) {
            return Err(PromoServiceError::NotTeamMember(caller.client_id));
        }
        Ok(TeamMember(caller))
    }

    pub async fn create(
        &self,
        member: TeamMember,
        amount: i64,
    ) -> PromoServiceResult<CreatedPromoCode> {
        if !amount_in_range(amount) {
            return Err(PromoServiceError::InvalidAmount(amount));
        }
        self.store.ensure_schema().await?;
        let created = self.store.create(amount, member.client_id()).await?;
        tracing::info!(code = %created.code, amount, created_by = member.client_id(), "Promo code created");
        self.state.events.track(TrackEvent::PromoCodeCreated {
            code: created.code.clone(),
            amount,
            created_by: member.client_id(),
        });
        Ok(created)
    }

    /// Open to any authenticated client. Never exposes who created or redeemed the code.
    pub async fn preview(&self, code: &str) -> PromoServiceResult<PromoPreview> {
        self.store.ensure_schema().await?;
        let promo = self
            .store
            .get(code)
            .await?
            .ok_or(PromoServiceError::NotFound)?;
        Ok(PromoPreview {
            code: promo.display_code(),
            amount: promo.amount,
            is_redeemed: promo.is_redeemed(),
        })
    }

    pub async fn redeem(&self, caller: AuthedClient, code: &str) -> PromoServiceResult<RedeemedPromo> {
        let canonical = normalize_code(code);
        if !is_well_formed(&canonical) {
            return Err(PromoServiceError::InvalidCode);
        }
        self.store.ensure_schema().await?;
        // precise error messages only, the conditional update below decides who wins
        let promo = self
            .store
            .get(&canonical)
            .await?
            .ok_or(PromoServiceError::NotFound)?;
        if promo.is_redeemed() {
            return Err(PromoServiceError::AlreadyRedeemed);
        }

        // detached from the request future: a client hanging up mid-credit must not
        // leave the code marked without either a credit or a rollback
        let saga_task = {
            let store = self.store.clone();
            let wallet = self.state.wallet.clone();
            let credit_timeout = self.state.config.wallet.credit_timeout();
            let code = canonical.clone();
            tokio::spawn(async move {
                RedemptionSaga::new(&store, wallet.as_ref(), credit_timeout)
                    .run(&code, caller.client_id)
                    .await
            })
        };
        let redeemed = match saga_task.await?? {
            SagaOutcome::Completed(r) => r,
            SagaOutcome::NotAcquired => {
                tracing::info!(code = %canonical, client_id = caller.client_id, "Lost redemption race");
                return Err(PromoServiceError::AlreadyRedeemed);
            }
            SagaOutcome::Compensated { .. } => return Err(PromoServiceError::CreditFailed),
            SagaOutcome::CompensationFailed { .. } => {
                return Err(PromoServiceError::CreditFailedUncompensated);
            }
        };

        let display_code = format_code(&redeemed.code);
        tracing::info!(code = %display_code, amount = redeemed.amount, client_id = caller.client_id, "Promo code redeemed");
        self.state.events.notify(Notification::WalletPassUpdate {
            client_id: caller.client_id,
        });
        self.state.events.track(TrackEvent::PromoCodeRedeemed {
            code: display_code.clone(),
            amount: redeemed.amount,
            redeemed_by: caller.client_id,
        });
        Ok(RedeemedPromo {
            code: display_code,
            amount: redeemed.amount,
        })
    }

    pub async fn list(
        &self,
        _: TeamMember,
        page: PageQueryBinder,
    ) -> PromoServiceResult<PageQueryResult<PromoCodeListItem>> {
        self.store.ensure_schema().await?;
        let mut page = self.store.list(page).await?;
        let items = std::mem::take(&mut page.items)
            .into_iter()
            .map(PromoCodeListItem::from)
            .collect::<Vec<_>>();
        Ok(page.swap_items(items))
    }
}
