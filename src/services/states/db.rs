mod promo_code;
pub mod schema;

use crate::services::states::db::promo_code::PromoCodeRepo;
use brew_macros::BrewBusinessError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_inline_default::serde_inline_default;
use sqlx::sqlite::SqliteQueryResult;
use sqlx::{Executor, Pool, Sqlite, SqliteConnection, SqlitePool};
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::OnceCell;

#[derive(Debug, thiserror::Error, BrewBusinessError)]
pub enum DataBaseError {
    #[error("Row not found!")]
    RowNotFound,
    #[error("No affected rows!")]
    #[code(20001)]
    NoAffectedRows,
    #[error("Unique violation error! code: {code:?}, msg: {msg}")]
    #[code(20002)]
    UniqueViolation { code: Option<String>, msg: String },
    #[error("Check violation error! code: {code:?}, msg: {msg}")]
    #[code(20003)]
    CheckViolation { code: Option<String>, msg: String },
    #[error("sqlx error: {0}")]
    SqlxOther(#[from] sqlx::Error),
}

pub trait PageQueryCursor: Debug + Serialize + DeserializeOwned {
    fn cursor_field(&self) -> i64;
}

#[serde_inline_default]
#[derive(Debug, Serialize, Deserialize)]
pub struct PageQueryBinder {
    #[serde_inline_default(0)]
    pub start_after: i64,
    #[serde_inline_default(20)]
    pub page_size: u32,
}

pub struct PageQueryInner {
    pub start_after: i64,
    pub limit: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub struct PageQueryResult<T>
where
    T: Debug + Serialize + DeserializeOwned,
{
    pub items: Vec<T>,
    pub has_more: bool,
    pub next_cursor: Option<i64>,
}

impl<T> PageQueryResult<T>
where
    T: Debug + Serialize + DeserializeOwned,
{
    pub fn swap_items<S>(self, items: Vec<S>) -> PageQueryResult<S>
    where
        S: Debug + Serialize + DeserializeOwned,
    {
        PageQueryResult {
            items,
            has_more: self.has_more,
            next_cursor: self.next_cursor,
        }
    }
}

impl PageQueryBinder {
    pub const MAX_PAGE_SIZE: u32 = 100;

    pub async fn query_page_ctx<T, F, Fut>(self, query_fn: F) -> DataBaseResult<PageQueryResult<T>>
    where
        T: PageQueryCursor,
        F: FnOnce(PageQueryInner) -> Fut,
        Fut: Future<Output = Result<Vec<T>, sqlx::Error>>,
    {
        let page_size = self.page_size.clamp(1, Self::MAX_PAGE_SIZE);
        let inner = PageQueryInner {
            start_after: self.start_after,
            limit: page_size + 1,
        };
        let mut res = query_fn(inner).await.resolve()?;
        if res.len() > page_size as usize {
            res.truncate(page_size as usize);
            let next_cursor = res.last().map(PageQueryCursor::cursor_field);
            return Ok(PageQueryResult {
                items: res,
                has_more: true,
                next_cursor,
            });
        }
        Ok(PageQueryResult {
            items: res,
            has_more: false,
            next_cursor: None,
        })
    }
}

pub trait SqliteBaseResultExt<T> {
    fn resolve(self) -> DataBaseResult<T>;
}

impl<T> SqliteBaseResultExt<T> for Result<T, sqlx::Error> {
    fn resolve(self) -> DataBaseResult<T> {
        match self {
            Ok(result) => Ok(result),
            Err(sqlx::Error::RowNotFound) => Err(DataBaseError::RowNotFound),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(DataBaseError::UniqueViolation {
                    code: e.code().map(|c| c.to_string()),
                    msg: e.message().to_string(),
                })
            }
            Err(sqlx::Error::Database(e)) if e.is_check_violation() => {
                Err(DataBaseError::CheckViolation {
                    code: e.code().map(|c| c.to_string()),
                    msg: e.message().to_string(),
                })
            }
            Err(e) => Err(DataBaseError::SqlxOther(e)),
        }
    }
}

pub trait SqliteQueryResultExt {
    fn resolve_affected(self) -> DataBaseResult<SqliteQueryResult>;
}

impl SqliteQueryResultExt for Result<SqliteQueryResult, sqlx::Error> {
    fn resolve_affected(self) -> DataBaseResult<SqliteQueryResult> {
        match self {
            Ok(res) if res.rows_affected() == 0 => Err(DataBaseError::NoAffectedRows),
            other => other.resolve(),
        }
    }
}

pub type DataBaseResult<T> = Result<T, DataBaseError>;

pub struct DataBaseExecutor<'a, E>
where
    for<'c> &'c mut E: Executor<'c, Database = Sqlite>,
{
    inner: &'a mut E,
}

impl<'a, E> DataBaseExecutor<'a, E>
where
    for<'c> &'c mut E: Executor<'c, Database = Sqlite>,
{
    #[inline]
    pub fn promo_code(&mut self) -> PromoCodeRepo<'_, E> {
        PromoCodeRepo {
            inner: &mut *self.inner,
        }
    }
}

pub type BrewDatabaseExecutor<'a> = DataBaseExecutor<'a, SqliteConnection>;

#[derive(Clone)]
pub struct DataBaseState {
    pool: Arc<Pool<Sqlite>>,
    schema_ready: Arc<OnceCell<()>>,
}

impl DataBaseState {
    pub async fn single<F, R, E>(&self, f: F) -> Result<R, E>
    where
        for<'q> F: AsyncFnOnce(BrewDatabaseExecutor<'q>) -> Result<R, E> + Send,
        R: Send,
        E: Send + From<DataBaseError>,
    {
        let mut conn = self.pool.acquire().await.resolve()?;
        let exec = DataBaseExecutor { inner: &mut *conn };
        f(exec).await
    }

    /// Runs the schema bootstrap at most once per process. Safe to call on every request.
    pub async fn ensure_schema(&self) -> DataBaseResult<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                let mut conn = self.pool.acquire().await.resolve()?;
                schema::bootstrap(&mut *conn).await
            })
            .await
            .copied()
    }
}

impl DataBaseState {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    pub async fn close_conn(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::DataBaseState;
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
    use std::time::Duration;
    use tempfile::TempDir;

    /// File-backed database so concurrent connections share the same rows.
    pub async fn temp_db() -> (TempDir, DataBaseState) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let opt = SqliteConnectOptions::new()
            .filename(dir.path().join("brew-test.db"))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(opt)
            .await
            .expect("open sqlite pool");
        let db = DataBaseState::new(pool);
        db.ensure_schema().await.expect("bootstrap schema");
        (dir, db)
    }
}
