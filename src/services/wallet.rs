use crate::services::states::config::WalletConfig;
use async_trait::async_trait;
use brew_macros::BrewBusinessError;
use reqwest::StatusCode;
use serde::Serialize;
use std::borrow::Cow;
use url::Url;

#[derive(Debug, thiserror::Error, BrewBusinessError)]
pub enum WalletError {
    #[error("Wallet credit timed out")]
    #[code(40001)]
    Timeout,
    #[error("Wallet credit rejected with {status}")]
    #[code(40002)]
    Rejected { status: StatusCode },
    #[error("Wallet request failed: {0}")]
    #[code(40003)]
    Transport(#[from] reqwest::Error),
    #[error("Invalid wallet url: {0}")]
    Url(#[from] url::ParseError),
}

pub type WalletResult<T> = Result<T, WalletError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditRequest {
    pub client_id: i64,
    pub amount: i64,
    /// `promo-code:{CODE}:{client_id}`. A replay of the same redemption is dropped by the
    /// provider, while a different client redeeming the code after a rolled-back attempt
    /// gets a fresh key and is not rejected as a body mismatch. The price is that a credit
    /// which timed out here but landed at the provider is not deduplicated against a later
    /// redeemer; that case shows up in the provider's ledger under the first key.
    pub idempotency_key: String,
}

impl CreditRequest {
    pub fn for_promo_code(canonical_code: &str, client_id: i64, amount: i64) -> Self {
        Self {
            client_id,
            amount,
            idempotency_key: format!("promo-code:{canonical_code}:{client_id}"),
        }
    }
}

#[async_trait]
pub trait WalletCredit: Send + Sync {
    async fn credit(&self, req: &CreditRequest) -> WalletResult<()>;
}

pub struct HttpWalletClient {
    client: reqwest::Client,
    credits_url: Url,
    api_key: Option<Cow<'static, str>>,
}

impl HttpWalletClient {
    pub fn new(config: &WalletConfig) -> WalletResult<Self> {
        // the orchestrator enforces the deadline, this one only guards against a stuck socket
        let client = reqwest::Client::builder()
            .timeout(config.credit_timeout() * 2)
            .build()?;
        Ok(Self {
            client,
            credits_url: config.base_url.join("credits")?,
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl WalletCredit for HttpWalletClient {
    async fn credit(&self, req: &CreditRequest) -> WalletResult<()> {
        let mut builder = self
            .client
            .post(self.credits_url.clone())
            .header("Idempotency-Key", &req.idempotency_key)
            .json(req);
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key.as_ref());
        }
        let res = builder.send().await?;
        match res.status() {
            s if s.is_success() => Ok(()),
            status => Err(WalletError::Rejected { status }),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_is_stable_per_code_and_redeemer() {
        let a = CreditRequest::for_promo_code("ABC234", 1, 10_000);
        let replay = CreditRequest::for_promo_code("ABC234", 1, 10_000);
        let other_client = CreditRequest::for_promo_code("ABC234", 2, 10_000);
        assert_eq!(a.idempotency_key, "promo-code:ABC234:1");
        assert_eq!(a.idempotency_key, replay.idempotency_key);
        assert_ne!(a.idempotency_key, other_client.idempotency_key);
    }

    #[test]
    fn credits_url_is_joined_onto_base() {
        let cfg = WalletConfig {
            base_url: Url::parse("https://wallet.internal/v2/").unwrap(),
            ..Default::default()
        };
        let client = HttpWalletClient::new(&cfg).unwrap();
        assert_eq!(client.credits_url.as_str(), "https://wallet.internal/v2/credits");
    }
}
