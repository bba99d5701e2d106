//! Idempotent DDL for the promo code table.
//!
//! There is no migration history here: `bootstrap` is a single `CREATE TABLE IF NOT EXISTS`
//! and can be swapped for `sqlx::migrate!` once the schema starts evolving.

use crate::models::promo_code::{MAX_AMOUNT, MIN_AMOUNT, PROMO_CODE_LEN};
use crate::services::states::db::{DataBaseResult, SqliteBaseResultExt};
use sqlx::{Executor, Sqlite, query};

pub fn promo_codes_ddl() -> String {
    format!(
        r#"
            CREATE TABLE IF NOT EXISTS promo_codes (
                code        TEXT    PRIMARY KEY NOT NULL CHECK (length(code) = {PROMO_CODE_LEN}),
                amount      INTEGER NOT NULL CHECK (amount BETWEEN {MIN_AMOUNT} AND {MAX_AMOUNT}),
                created_by  INTEGER NOT NULL,
                redeemed_by INTEGER,
                redeemed_at INTEGER,
                created_at  INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER)),
                CHECK ((redeemed_by IS NULL) = (redeemed_at IS NULL))
            )
        "#
    )
}

pub async fn bootstrap<E>(exec: &mut E) -> DataBaseResult<()>
where
    for<'c> &'c mut E: Executor<'c, Database = Sqlite>,
{
    let ddl = promo_codes_ddl();
    query(&ddl).execute(&mut *exec).await.resolve()?;
    tracing::debug!("promo_codes table is ready");
    Ok(())
}
