use crate::services::states::db::PageQueryCursor;
use crate::utils::code_gen::format_code;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

pub const PROMO_CODE_LEN: usize = 6;
/// Minor currency units, inclusive on both ends.
pub const MIN_AMOUNT: i64 = 10_000;
pub const MAX_AMOUNT: i64 = 200_000;

pub fn amount_in_range(amount: i64) -> bool {
    (MIN_AMOUNT..=MAX_AMOUNT).contains(&amount)
}

/// Row as stored. `code` is canonical (no dash), timestamps are unix seconds, `id` is the rowid.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PromoCodeRow {
    pub id: i64,
    pub code: String,
    pub amount: i64,
    pub created_by: i64,
    pub redeemed_by: Option<i64>,
    pub redeemed_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoCode {
    pub code: String,
    pub amount: i64,
    pub created_by: i64,
    pub redeemed_by: Option<i64>,
    pub redeemed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl PromoCode {
    pub fn is_redeemed(&self) -> bool {
        self.redeemed_by.is_some()
    }

    pub fn display_code(&self) -> String {
        format_code(&self.code)
    }
}

impl TryFrom<PromoCodeRow> for PromoCode {
    type Error = time::error::ComponentRange;

    fn try_from(row: PromoCodeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            created_at: OffsetDateTime::from_unix_timestamp(row.created_at)?,
            redeemed_at: row
                .redeemed_at
                .map(OffsetDateTime::from_unix_timestamp)
                .transpose()?,
            code: row.code,
            amount: row.amount,
            created_by: row.created_by,
            redeemed_by: row.redeemed_by,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct InsertedPromoCode {
    pub code: String,
    pub amount: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RedeemedPromoCode {
    pub code: String,
    pub amount: i64,
}

/// Team-facing listing entry.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoCodeListItem {
    #[serde(skip)]
    pub id: i64,
    pub code: String,
    pub amount: i64,
    pub created_by: i64,
    pub redeemed_by: Option<i64>,
    pub redeemed_at: Option<i64>,
    pub created_at: i64,
}

impl From<PromoCodeRow> for PromoCodeListItem {
    fn from(row: PromoCodeRow) -> Self {
        Self {
            id: row.id,
            code: format_code(&row.code),
            amount: row.amount,
            created_by: row.created_by,
            redeemed_by: row.redeemed_by,
            redeemed_at: row.redeemed_at,
            created_at: row.created_at,
        }
    }
}

impl PageQueryCursor for PromoCodeRow {
    fn cursor_field(&self) -> i64 {
        self.id
    }
}

