use crate::models::promo_code::{PromoCode, PromoCodeRow, RedeemedPromoCode};
use crate::services::states::db::{
    BrewDatabaseExecutor, DataBaseError, DataBaseResult, DataBaseState, PageQueryBinder,
    PageQueryResult,
};
use crate::utils::code_gen::{format_code, generate_code, normalize_code};
use brew_macros::BrewBusinessError;
use time::OffsetDateTime;

#[derive(Debug, thiserror::Error, BrewBusinessError)]
pub enum PromoError {
    #[error("Promo code amount is out of range")]
    #[code(30001)]
    AmountOutOfRange,
    #[error("Could not allocate a unique promo code after {attempts} attempts")]
    #[code(30002)]
    CodeSpaceExhausted { attempts: u32 },
    #[error("Stored timestamp is out of range: {0}")]
    #[code(30003)]
    Timestamp(#[from] time::error::ComponentRange),
    #[error(transparent)]
    DataBase(#[from] DataBaseError),
}

pub type PromoResult<T> = Result<T, PromoError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPromoCode {
    /// Display form, `ABC-123`.
    pub code: String,
    pub amount: i64,
    pub created_at: OffsetDateTime,
}

/// Draws candidates from `generate` and hands them to `insert` until one is not taken.
///
/// Only a unique violation triggers another attempt, every other storage error is
/// returned as is.
pub async fn allocate_with_retry<G, F, Fut, T>(
    attempts: u32,
    mut generate: G,
    mut insert: F,
) -> PromoResult<T>
where
    G: FnMut() -> String,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = DataBaseResult<T>>,
{
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match insert(generate()).await {
            Ok(v) => return Ok(v),
            Err(DataBaseError::UniqueViolation { .. }) => {
                tracing::warn!(attempt, attempts, "Promo code collision, drawing a new one");
            }
            Err(DataBaseError::CheckViolation { .. }) => return Err(PromoError::AmountOutOfRange),
            Err(e) => return Err(e.into()),
        }
    }
    Err(PromoError::CodeSpaceExhausted { attempts })
}

/// The four state transitions of a promo code. Every call is one statement on the row store.
#[derive(Clone)]
pub struct PromoCodeStore {
    db: DataBaseState,
    create_attempts: u32,
}

impl PromoCodeStore {
    pub fn new(db: DataBaseState, create_attempts: u32) -> Self {
        Self {
            db,
            create_attempts,
        }
    }

    pub async fn ensure_schema(&self) -> PromoResult<()> {
        Ok(self.db.ensure_schema().await?)
    }

    pub async fn create(&self, amount: i64, created_by: i64) -> PromoResult<CreatedPromoCode> {
        let db = &self.db;
        let inserted = allocate_with_retry(self.create_attempts, generate_code, |code| async move {
            db.single(async |mut exec: BrewDatabaseExecutor<'_>| {
                exec.promo_code()
                    .insert_promo_code(&code, amount, created_by)
                    .await
            })
            .await
        })
        .await?;
        Ok(CreatedPromoCode {
            code: format_code(&inserted.code),
            amount: inserted.amount,
            created_at: OffsetDateTime::from_unix_timestamp(inserted.created_at)?,
        })
    }

    /// Accepts any typed form of the code. Unknown codes are `Ok(None)`.
    pub async fn get(&self, code: &str) -> PromoResult<Option<PromoCode>> {
        let canonical = normalize_code(code);
        let row = self
            .db
            .single(async |mut exec: BrewDatabaseExecutor<'_>| {
                exec.promo_code().get_promo_code(&canonical).await
            })
            .await?;
        Ok(row.map(PromoCode::try_from).transpose()?)
    }

    /// `None` when the code is unknown or already redeemed. Exactly one concurrent caller
    /// gets `Some` for a given code.
    pub async fn redeem(
        &self,
        code: &str,
        redeemed_by: i64,
    ) -> PromoResult<Option<RedeemedPromoCode>> {
        let canonical = normalize_code(code);
        let redeemed = self
            .db
            .single(async |mut exec: BrewDatabaseExecutor<'_>| {
                exec.promo_code()
                    .redeem_promo_code(&canonical, redeemed_by)
                    .await
            })
            .await?;
        Ok(redeemed)
    }

    /// Compensation for a redemption whose wallet credit failed.
    pub async fn unredeem(&self, code: &str) -> PromoResult<()> {
        let canonical = normalize_code(code);
        self.db
            .single(async |mut exec: BrewDatabaseExecutor<'_>| {
                exec.promo_code().unredeem_promo_code(&canonical).await
            })
            .await?;
        Ok(())
    }

    pub async fn list(&self, page: PageQueryBinder) -> PromoResult<PageQueryResult<PromoCodeRow>> {
        let page = self
            .db
            .single(async |mut exec: BrewDatabaseExecutor<'_>| {
                exec.promo_code().list_promo_codes_page(page).await
            })
            .await?;
        Ok(page)
    }
}
