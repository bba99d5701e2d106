use crate::models::promo_code::{InsertedPromoCode, PromoCodeRow, RedeemedPromoCode};
use crate::services::states::db::{
    DataBaseResult, PageQueryBinder, PageQueryResult, SqliteBaseResultExt, SqliteQueryResultExt,
};
use sqlx::{Executor, Sqlite, query, query_as};

pub struct PromoCodeRepo<'a, E>
where
    for<'c> &'c mut E: Executor<'c, Database = Sqlite>,
{
    pub inner: &'a mut E,
}

impl<'a, E> PromoCodeRepo<'a, E>
where
    for<'c> &'c mut E: Executor<'c, Database = Sqlite>,
{
    /// Plain insert. A taken code surfaces as [`DataBaseError::UniqueViolation`],
    /// an out-of-range amount as [`DataBaseError::CheckViolation`].
    ///
    /// [`DataBaseError::UniqueViolation`]: crate::services::states::db::DataBaseError::UniqueViolation
    /// [`DataBaseError::CheckViolation`]: crate::services::states::db::DataBaseError::CheckViolation
    pub async fn insert_promo_code(
        &mut self,
        code: &str,
        amount: i64,
        created_by: i64,
    ) -> DataBaseResult<InsertedPromoCode> {
        query_as::<_, InsertedPromoCode>(
            r#"
                INSERT INTO promo_codes (code, amount, created_by)
                VALUES (?, ?, ?)
                RETURNING code, amount, created_at
            "#,
        )
        .bind(code)
        .bind(amount)
        .bind(created_by)
        .fetch_one(&mut *self.inner)
        .await
        .resolve()
    }

    pub async fn get_promo_code(&mut self, code: &str) -> DataBaseResult<Option<PromoCodeRow>> {
        query_as::<_, PromoCodeRow>(
            r#"
                SELECT rowid AS id, code, amount, created_by, redeemed_by, redeemed_at, created_at
                FROM promo_codes
                WHERE code = ?
            "#,
        )
        .bind(code)
        .fetch_optional(&mut *self.inner)
        .await
        .resolve()
    }

    /// Compare-and-swap on `redeemed_by IS NULL` in one statement. `None` means
    /// the code is unknown or somebody else already holds it.
    pub async fn redeem_promo_code(
        &mut self,
        code: &str,
        redeemed_by: i64,
    ) -> DataBaseResult<Option<RedeemedPromoCode>> {
        query_as::<_, RedeemedPromoCode>(
            r#"
                UPDATE promo_codes
                SET redeemed_by = ?, redeemed_at = CAST(strftime('%s', 'now') AS INTEGER)
                WHERE code = ? AND redeemed_by IS NULL
                RETURNING code, amount
            "#,
        )
        .bind(redeemed_by)
        .bind(code)
        .fetch_optional(&mut *self.inner)
        .await
        .resolve()
    }

    /// Clears the redemption unconditionally. Fails with `NoAffectedRows` if the row is gone.
    pub async fn unredeem_promo_code(&mut self, code: &str) -> DataBaseResult<()> {
        query(
            r#"
                UPDATE promo_codes
                SET redeemed_by = NULL, redeemed_at = NULL
                WHERE code = ?
            "#,
        )
        .bind(code)
        .execute(&mut *self.inner)
        .await
        .resolve_affected()?;
        Ok(())
    }

    #[cfg(test)]
    pub async fn delete_promo_code(&mut self, code: &str) -> DataBaseResult<()> {
        query("DELETE FROM promo_codes WHERE code = ?")
            .bind(code)
            .execute(&mut *self.inner)
            .await
            .resolve_affected()?;
        Ok(())
    }

    pub async fn list_promo_codes_page(
        &mut self,
        page: PageQueryBinder,
    ) -> DataBaseResult<PageQueryResult<PromoCodeRow>> {
        page.query_page_ctx(|pq| async move {
            query_as::<_, PromoCodeRow>(
                r#"
                    SELECT rowid AS id, code, amount, created_by, redeemed_by, redeemed_at, created_at
                    FROM promo_codes
                    WHERE rowid > ?
                    ORDER BY rowid
                    LIMIT ?
                "#,
            )
            .bind(pq.start_after)
            .bind(pq.limit)
            .fetch_all(&mut *self.inner)
            .await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::models::promo_code::{MAX_AMOUNT, MIN_AMOUNT};
    use crate::services::states::db::test_support::temp_db;
    use crate::services::states::db::{BrewDatabaseExecutor, DataBaseError, PageQueryBinder};

    #[tokio::test]
    async fn insert_then_get() {
        let (_dir, db) = temp_db().await;
        let inserted = db
            .single(async |mut exec: BrewDatabaseExecutor<'_>| {
                exec.promo_code().insert_promo_code("ABC234", 50_000, 7).await
            })
            .await
            .unwrap();
        assert_eq!(inserted.code, "ABC234");
        assert_eq!(inserted.amount, 50_000);
        assert!(inserted.created_at > 0);

        let row = db
            .single(async |mut exec: BrewDatabaseExecutor<'_>| {
                exec.promo_code().get_promo_code("ABC234").await
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.created_by, 7);
        assert_eq!(row.redeemed_by, None);
        assert_eq!(row.redeemed_at, None);
    }

    #[tokio::test]
    async fn duplicate_code_is_a_unique_violation() {
        let (_dir, db) = temp_db().await;
        let res = db
            .single(async |mut exec: BrewDatabaseExecutor<'_>| {
                exec.promo_code().insert_promo_code("DUPDUP", 20_000, 1).await?;
                exec.promo_code().insert_promo_code("DUPDUP", 30_000, 1).await
            })
            .await;
        assert!(matches!(res, Err(DataBaseError::UniqueViolation { .. })), "{res:?}");
    }

    #[tokio::test]
    async fn amount_bounds_are_enforced_by_storage() {
        let (_dir, db) = temp_db().await;
        for (code, amount, ok) in [
            ("AAAAA1", MIN_AMOUNT - 1, false),
            ("AAAAA2", MIN_AMOUNT, true),
            ("AAAAA3", MAX_AMOUNT, true),
            ("AAAAA4", MAX_AMOUNT + 1, false),
        ] {
            let res = db
                .single(async |mut exec: BrewDatabaseExecutor<'_>| {
                    exec.promo_code().insert_promo_code(code, amount, 1).await
                })
                .await;
            match ok {
                true => assert!(res.is_ok(), "{amount}: {res:?}"),
                false => assert!(
                    matches!(res, Err(DataBaseError::CheckViolation { .. })),
                    "{amount}: {res:?}"
                ),
            }
        }
    }

    #[tokio::test]
    async fn redeem_is_single_shot_and_unredeem_reopens() {
        let (_dir, db) = temp_db().await;
        db.single(async |mut exec: BrewDatabaseExecutor<'_>| {
            exec.promo_code().insert_promo_code("RDM234", 10_000, 1).await
        })
        .await
        .unwrap();

        let redeem = async |client: i64| {
            db.single(async |mut exec: BrewDatabaseExecutor<'_>| {
                exec.promo_code().redeem_promo_code("RDM234", client).await
            })
            .await
            .unwrap()
        };
        let first = redeem(11).await.unwrap();
        assert_eq!(first.amount, 10_000);
        assert!(redeem(12).await.is_none());

        let row = db
            .single(async |mut exec: BrewDatabaseExecutor<'_>| {
                exec.promo_code().get_promo_code("RDM234").await
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.redeemed_by, Some(11));
        assert!(row.redeemed_at.is_some());

        db.single(async |mut exec: BrewDatabaseExecutor<'_>| {
            exec.promo_code().unredeem_promo_code("RDM234").await
        })
        .await
        .unwrap();
        assert!(redeem(12).await.is_some());
    }

    #[tokio::test]
    async fn redeem_unknown_code_is_none_and_unredeem_unknown_fails() {
        let (_dir, db) = temp_db().await;
        let res = db
            .single(async |mut exec: BrewDatabaseExecutor<'_>| {
                exec.promo_code().redeem_promo_code("NOPE22", 1).await
            })
            .await
            .unwrap();
        assert!(res.is_none());
        let res = db
            .single(async |mut exec: BrewDatabaseExecutor<'_>| {
                exec.promo_code().unredeem_promo_code("NOPE22").await
            })
            .await;
        assert!(matches!(res, Err(DataBaseError::NoAffectedRows)));
    }

    #[tokio::test]
    async fn list_pages_in_insertion_order() {
        let (_dir, db) = temp_db().await;
        db.single(async |mut exec: BrewDatabaseExecutor<'_>| {
            for code in ["PAGE21", "PAGE22", "PAGE23"] {
                exec.promo_code().insert_promo_code(code, 10_000, 1).await?;
            }
            Ok::<_, DataBaseError>(())
        })
        .await
        .unwrap();

        let first = db
            .single(async |mut exec: BrewDatabaseExecutor<'_>| {
                exec.promo_code()
                    .list_promo_codes_page(PageQueryBinder {
                        start_after: 0,
                        page_size: 2,
                    })
                    .await
            })
            .await
            .unwrap();
        assert_eq!(
            first.items.iter().map(|r| r.code.as_str()).collect::<Vec<_>>(),
            ["PAGE21", "PAGE22"]
        );
        assert!(first.has_more);

        let cursor = first.next_cursor.unwrap();
        let second = db
            .single(async |mut exec: BrewDatabaseExecutor<'_>| {
                exec.promo_code()
                    .list_promo_codes_page(PageQueryBinder {
                        start_after: cursor,
                        page_size: 2,
                    })
                    .await
            })
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].code, "PAGE23");
        assert!(!second.has_more);
        assert_eq!(second.next_cursor, None);
    }
}
