pub mod config;
pub mod db;

use crate::services::events::EventDispatcher;
use crate::services::identity::IdentityProvider;
use crate::services::wallet::WalletCredit;
use config::AppConfig;
use db::DataBaseState;
use std::sync::Arc;

pub struct BrewState {
    pub db: DataBaseState,
    pub identity: Arc<dyn IdentityProvider>,
    pub wallet: Arc<dyn WalletCredit>,
    pub events: EventDispatcher,
    pub config: Arc<AppConfig>,
}
