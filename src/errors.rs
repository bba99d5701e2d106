/// Stable numeric code attached to an error when it reaches the API boundary.
pub trait BrewBusinessErrCode {
    fn code(&self) -> Option<u32> {
        None
    }
}

impl BrewBusinessErrCode for std::convert::Infallible {}

/// Startup failures. Request-time errors never end up here.
#[derive(Debug, thiserror::Error)]
pub enum BrewError {
    #[error("{source}")]
    DataBase {
        #[from]
        source: crate::services::states::db::DataBaseError,
    },
    #[error("{source}")]
    IOError {
        #[from]
        source: std::io::Error,
    },
    #[error("{source}")]
    ConfigError {
        #[from]
        source: Box<figment::Error>,
    },
    #[error("Failed to init identity client: {0}")]
    Identity(#[from] crate::services::identity::IdentityError),
    #[error("Failed to init wallet client: {0}")]
    Wallet(#[from] crate::services::wallet::WalletError),
    #[error("Failed to init event sink: {0}")]
    Events(#[from] crate::services::events::EventSinkError),
    #[error("Sqlx error: {0}")]
    SqlxError(#[from] sqlx::Error),
}
