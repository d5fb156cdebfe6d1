//! RapidDeals carrier API client.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use freightdesk_core::config::CarrierConfig;
use freightdesk_core::domain::order::OrderStatus;
use freightdesk_core::gateway::{
    CarrierCancelResponse, CarrierGateway, CarrierOrderStatus, GatewayError,
};

use crate::retry::{with_retries, RetryPolicy};

pub struct RapidDealsClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
    policy: RetryPolicy,
}

#[derive(Serialize)]
struct CancelRequestWire<'a> {
    reason: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelResponseWire {
    ok: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    audit_remark: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderStatusWire {
    order_number: String,
    status: String,
}

impl RapidDealsClient {
    pub fn new(config: &CarrierConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| GatewayError::Connection(error.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            policy: RetryPolicy::new(config.max_retries),
        })
    }

    fn map_transport(error: reqwest::Error) -> GatewayError {
        if error.is_timeout() || error.is_connect() || error.is_request() {
            GatewayError::Connection(error.to_string())
        } else {
            GatewayError::InvalidResponse(error.to_string())
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(GatewayError::Connection(format!("carrier returned {status}: {body}")))
        } else {
            Err(GatewayError::Rejected(format!("carrier returned {status}: {body}")))
        }
    }
}

#[async_trait::async_trait]
impl CarrierGateway for RapidDealsClient {
    async fn cancel_order(
        &self,
        order_number: &str,
        reason: &str,
    ) -> Result<CarrierCancelResponse, GatewayError> {
        let url = format!("{}/api/v1/orders/{order_number}/cancel", self.base_url);
        let wire = with_retries("carrier.cancel_order", self.policy, || {
            let request = self
                .client
                .post(&url)
                .bearer_auth(self.api_key.expose_secret())
                .json(&CancelRequestWire { reason });
            async move {
                let response = request.send().await.map_err(Self::map_transport)?;
                Self::check_status(response)
                    .await?
                    .json::<CancelResponseWire>()
                    .await
                    .map_err(|error| GatewayError::InvalidResponse(error.to_string()))
            }
        })
        .await?;

        debug!(
            event_name = "carrier.cancel_order",
            order_number,
            ok = wire.ok,
            "carrier cancellation response received"
        );
        Ok(CarrierCancelResponse {
            ok: wire.ok,
            message: wire.message,
            audit_remark: wire.audit_remark,
        })
    }

    async fn order_status(&self, order_number: &str) -> Result<CarrierOrderStatus, GatewayError> {
        let url = format!("{}/api/v1/orders/{order_number}/status", self.base_url);
        let wire = with_retries("carrier.order_status", self.policy, || {
            let request = self.client.get(&url).bearer_auth(self.api_key.expose_secret());
            async move {
                let response = request.send().await.map_err(Self::map_transport)?;
                Self::check_status(response)
                    .await?
                    .json::<OrderStatusWire>()
                    .await
                    .map_err(|error| GatewayError::InvalidResponse(error.to_string()))
            }
        })
        .await?;

        let status = OrderStatus::parse(&wire.status).ok_or_else(|| {
            GatewayError::InvalidResponse(format!("unknown carrier status `{}`", wire.status))
        })?;
        Ok(CarrierOrderStatus { order_number: wire.order_number, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> CarrierConfig {
        CarrierConfig {
            base_url: base_url.to_string(),
            api_key: "rd-test".to_string().into(),
            timeout_secs: 5,
            max_retries: 1,
        }
    }

    #[test]
    fn base_url_is_normalised() {
        let client = RapidDealsClient::new(&config("https://rapid.example.com/")).expect("client");
        assert_eq!(client.base_url, "https://rapid.example.com");
    }

    #[test]
    fn unknown_status_payload_is_an_invalid_response() {
        let wire = OrderStatusWire { order_number: "FD-1".to_string(), status: "teleported".to_string() };
        assert!(OrderStatus::parse(&wire.status).is_none());
    }
}
