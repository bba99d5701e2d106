//! Best-effort analytics and wallet-pass notifications.
//!
//! Everything sent through [`EventDispatcher`] runs on a detached task. The request that
//! produced the event never waits for it and never sees its outcome; failures end up in
//! the log and nowhere else.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum EventSinkError {
    #[error("Event delivery failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Event collector answered with {0}")]
    Status(reqwest::StatusCode),
}

pub type EventSinkResult<T> = Result<T, EventSinkError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackEvent {
    #[serde(rename_all = "camelCase")]
    PromoCodeCreated {
        code: String,
        amount: i64,
        created_by: i64,
    },
    #[serde(rename_all = "camelCase")]
    PromoCodeRedeemed {
        code: String,
        amount: i64,
        redeemed_by: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// The client's wallet pass shows the balance and must be refreshed.
    #[serde(rename_all = "camelCase")]
    WalletPassUpdate { client_id: i64 },
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn track(&self, event: &TrackEvent) -> EventSinkResult<()>;

    async fn notify(&self, notification: &Notification) -> EventSinkResult<()>;
}

/// Used when no collector is configured.
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn track(&self, event: &TrackEvent) -> EventSinkResult<()> {
        tracing::info!(?event, "track");
        Ok(())
    }

    async fn notify(&self, notification: &Notification) -> EventSinkResult<()> {
        tracing::info!(?notification, "notify");
        Ok(())
    }
}

pub struct HttpEventSink {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpEventSink {
    pub fn new(endpoint: Url) -> EventSinkResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()?;
        Ok(Self { client, endpoint })
    }

    async fn post<T: Serialize + Sync>(&self, body: &T) -> EventSinkResult<()> {
        let res = self
            .client
            .post(self.endpoint.clone())
            .json(body)
            .send()
            .await?;
        match res.status() {
            s if s.is_success() => Ok(()),
            s => Err(EventSinkError::Status(s)),
        }
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn track(&self, event: &TrackEvent) -> EventSinkResult<()> {
        self.post(event).await
    }

    async fn notify(&self, notification: &Notification) -> EventSinkResult<()> {
        self.post(notification).await
    }
}

#[derive(Clone)]
pub struct EventDispatcher {
    sink: Arc<dyn EventSink>,
}

impl EventDispatcher {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    pub fn track(&self, event: TrackEvent) -> JoinHandle<()> {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            match sink.track(&event).await {
                Ok(()) => tracing::debug!(?event, "event tracked"),
                Err(e) => tracing::warn!(?event, "failed to track event: {e}"),
            }
        })
    }

    pub fn notify(&self, notification: Notification) -> JoinHandle<()> {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            match sink.notify(&notification).await {
                Ok(()) => tracing::debug!(?notification, "notification sent"),
                Err(e) => tracing::warn!(?notification, "failed to send notification: {e}"),
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    pub struct RecordingSink {
        pub fail: AtomicBool,
        /// Records, then never answers.
        pub stall: AtomicBool,
        pub tracked: Mutex<Vec<TrackEvent>>,
        pub notified: Mutex<Vec<Notification>>,
    }

    impl RecordingSink {
        pub fn failing() -> Self {
            Self {
                fail: AtomicBool::new(true),
                ..Default::default()
            }
        }

        pub fn stalling() -> Self {
            Self {
                stall: AtomicBool::new(true),
                ..Default::default()
            }
        }

        pub fn tracked(&self) -> Vec<TrackEvent> {
            self.tracked.lock().unwrap().clone()
        }

        pub fn notified(&self) -> Vec<Notification> {
            self.notified.lock().unwrap().clone()
        }

        async fn outcome(&self) -> EventSinkResult<()> {
            if self.stall.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            match self.fail.load(Ordering::SeqCst) {
                true => Err(EventSinkError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE)),
                false => Ok(()),
            }
        }
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn track(&self, event: &TrackEvent) -> EventSinkResult<()> {
            self.tracked.lock().unwrap().push(event.clone());
            self.outcome().await
        }

        async fn notify(&self, notification: &Notification) -> EventSinkResult<()> {
            self.notified.lock().unwrap().push(notification.clone());
            self.outcome().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingSink;
    use super::*;

    #[tokio::test]
    async fn failing_sink_does_not_panic_the_task() {
        let sink = Arc::new(RecordingSink::failing());
        let dispatcher = EventDispatcher::new(sink.clone());
        dispatcher
            .track(TrackEvent::PromoCodeCreated {
                code: "ABC-234".into(),
                amount: 10_000,
                created_by: 1,
            })
            .await
            .unwrap();
        dispatcher
            .notify(Notification::WalletPassUpdate { client_id: 1 })
            .await
            .unwrap();
        assert_eq!(sink.tracked().len(), 1);
        assert_eq!(sink.notified().len(), 1);
    }

    #[test]
    fn events_serialize_with_tag() {
        let v = serde_json::to_value(TrackEvent::PromoCodeRedeemed {
            code: "ABC-234".into(),
            amount: 20_000,
            redeemed_by: 9,
        })
        .unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "event": "promo_code_redeemed",
                "code": "ABC-234",
                "amount": 20_000,
                "redeemedBy": 9,
            })
        );
    }
}
