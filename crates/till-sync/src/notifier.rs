//! # Voucher Redemption Notifier
//!
//! The single outbound call the till makes to the loyalty cloud:
//!
//! ```text
//! POST {endpoint}/members/vouchers/send?id={voucher_id}
//! Content-Type: application/json
//! ```
//!
//! The response body is ignored; only the status matters.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

/// Receives one call per voucher consumed by a committed sale.
#[async_trait]
pub trait VoucherRedemptionNotifier: Send + Sync {
    async fn voucher_redeemed(&self, voucher_id: &str) -> SyncResult<()>;
}

// =============================================================================
// HTTP Notifier
// =============================================================================

/// Notifier backed by the loyalty cloud's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpLoyaltyCloudNotifier {
    client: Client,
    endpoint: Url,
}

impl HttpLoyaltyCloudNotifier {
    /// # Errors
    ///
    /// `InvalidUrl` for a non-http(s) endpoint, `Http` when the client
    /// cannot be built.
    pub fn new(endpoint: &str, timeout: Duration) -> SyncResult<Self> {
        let endpoint = Url::parse(endpoint.trim())?;
        if endpoint.cannot_be_a_base() || !matches!(endpoint.scheme(), "http" | "https") {
            return Err(SyncError::InvalidUrl(endpoint.to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpLoyaltyCloudNotifier { client, endpoint })
    }

    /// URL for one voucher, keeping any path prefix on the endpoint.
    pub fn send_url(&self, voucher_id: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["members", "vouchers", "send"]);
        }
        url.query_pairs_mut().clear().append_pair("id", voucher_id);
        url
    }
}

#[async_trait]
impl VoucherRedemptionNotifier for HttpLoyaltyCloudNotifier {
    async fn voucher_redeemed(&self, voucher_id: &str) -> SyncResult<()> {
        let url = self.send_url(voucher_id);

        let response = self
            .client
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::ExternalSyncFailure {
                voucher_id: voucher_id.to_string(),
                status: status.as_u16(),
            });
        }

        debug!(%url, voucher_id, "Voucher redemption delivered");
        Ok(())
    }
}

// =============================================================================
// No-op Notifier
// =============================================================================

/// Used when no endpoint is configured or sync is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl VoucherRedemptionNotifier for NoopNotifier {
    async fn voucher_redeemed(&self, voucher_id: &str) -> SyncResult<()> {
        debug!(voucher_id, "Loyalty sync inactive; redemption not sent");
        Ok(())
    }
}

/// Picks the notifier for `config`: HTTP when active, otherwise no-op.
pub fn notifier_from_config(config: &SyncConfig) -> SyncResult<Arc<dyn VoucherRedemptionNotifier>> {
    match config.endpoint() {
        Some(endpoint) if config.loyalty_cloud.enabled => Ok(Arc::new(
            HttpLoyaltyCloudNotifier::new(endpoint, config.request_timeout())?,
        )),
        _ => Ok(Arc::new(NoopNotifier)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    type Received = Arc<Mutex<Vec<String>>>;

    /// Local stand-in for the loyalty cloud; answers with `status`.
    async fn spawn_cloud(status: StatusCode) -> (String, Received) {
        let received: Received = Arc::default();

        let app = Router::new()
            .route(
                "/api/members/vouchers/send",
                post(
                    move |State(received): State<Received>,
                          Query(params): Query<HashMap<String, String>>| async move {
                        if let Some(id) = params.get("id") {
                            received.lock().await.push(id.clone());
                        }
                        status
                    },
                ),
            )
            .with_state(received.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}/api"), received)
    }

    #[test]
    fn test_send_url_keeps_prefix() {
        let notifier =
            HttpLoyaltyCloudNotifier::new("https://cloud.example.com/loyalty/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            notifier.send_url("v-1").as_str(),
            "https://cloud.example.com/loyalty/members/vouchers/send?id=v-1"
        );

        assert!(HttpLoyaltyCloudNotifier::new("mailto:a@b.c", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_posts_voucher_id() {
        let (endpoint, received) = spawn_cloud(StatusCode::OK).await;
        let notifier = HttpLoyaltyCloudNotifier::new(&endpoint, Duration::from_secs(5)).unwrap();

        notifier.voucher_redeemed("v-42").await.unwrap();

        assert_eq!(*received.lock().await, vec!["v-42".to_string()]);
    }

    #[tokio::test]
    async fn test_non_success_is_external_sync_failure() {
        let (endpoint, _) = spawn_cloud(StatusCode::SERVICE_UNAVAILABLE).await;
        let notifier = HttpLoyaltyCloudNotifier::new(&endpoint, Duration::from_secs(5)).unwrap();

        let err = notifier.voucher_redeemed("v-9").await.unwrap_err();
        assert!(matches!(err, SyncError::ExternalSyncFailure { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_inactive_config_gets_noop() {
        let mut config = SyncConfig::default();
        assert!(notifier_from_config(&config).is_ok());

        config.loyalty_cloud.endpoint = Some("http://localhost:1".to_string());
        config.loyalty_cloud.enabled = false;
        assert!(notifier_from_config(&config).is_ok());
    }
}
