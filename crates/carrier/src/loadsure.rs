//! Loadsure cargo-insurance API client.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use freightdesk_core::config::InsuranceConfig;
use freightdesk_core::domain::insurance::CancellationReasonCode;
use freightdesk_core::gateway::{
    GatewayError, InsuranceCancelResponse, InsuranceGateway, InsuranceIssueResponse,
};

use crate::retry::{with_retries, RetryPolicy};

pub struct LoadsureClient {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    policy: RetryPolicy,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IssueRequestWire<'a> {
    order_number: &'a str,
    declared_value: Decimal,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueResponseWire {
    certificate_number: String,
    premium: Decimal,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelRequestWire<'a> {
    reason_code: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelResponseWire {
    ok: bool,
    #[serde(default)]
    message: Option<String>,
}

impl LoadsureClient {
    pub fn new(config: &InsuranceConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| GatewayError::Connection(error.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            policy: RetryPolicy::default(),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose_secret()),
            None => request,
        }
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
            Err(GatewayError::Connection(format!("insurer returned {status}: {body}")))
        } else {
            Err(GatewayError::Rejected(format!("insurer returned {status}: {body}")))
        }
    }
}

#[async_trait::async_trait]
impl InsuranceGateway for LoadsureClient {
    async fn issue_certificate(
        &self,
        order_number: &str,
        declared_value: Decimal,
    ) -> Result<InsuranceIssueResponse, GatewayError> {
        let url = format!("{}/api/v1/certificates", self.base_url);
        let wire = with_retries("insurance.issue_certificate", self.policy, || {
            let request = self
                .authorize(self.client.post(&url))
                .json(&IssueRequestWire { order_number, declared_value });
            async move {
                let response = request.send().await.map_err(Self::map_transport)?;
                Self::check_status(response)
                    .await?
                    .json::<IssueResponseWire>()
                    .await
                    .map_err(|error| GatewayError::InvalidResponse(error.to_string()))
            }
        })
        .await?;

        if wire.premium <= Decimal::ZERO {
            return Err(GatewayError::InvalidResponse(format!(
                "insurer quoted a non-positive premium: {}",
                wire.premium
            )));
        }
        debug!(
            event_name = "insurance.certificate_issued",
            order_number,
            certificate_number = %wire.certificate_number,
            premium = %wire.premium,
            "insurance certificate issued"
        );
        Ok(InsuranceIssueResponse {
            certificate_number: wire.certificate_number,
            premium: wire.premium,
        })
    }

    async fn cancel_certificate(
        &self,
        certificate_number: &str,
        reason: CancellationReasonCode,
    ) -> Result<InsuranceCancelResponse, GatewayError> {
        let url = format!("{}/api/v1/certificates/{certificate_number}/cancel", self.base_url);
        let wire = with_retries("insurance.cancel_certificate", self.policy, || {
            let request = self
                .authorize(self.client.post(&url))
                .json(&CancelRequestWire { reason_code: reason.wire_code() });
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

        Ok(InsuranceCancelResponse { ok: wire.ok, message: wire.message })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use freightdesk_core::config::InsuranceConfig;

    use super::LoadsureClient;

    #[test]
    fn base_url_is_normalised_and_key_is_optional() {
        let client = LoadsureClient::new(&InsuranceConfig {
            enabled: true,
            base_url: "https://loadsure.example.com/".to_string(),
            api_key: None,
            timeout_secs: 5,
        })
        .expect("client");
        assert_eq!(client.base_url, "https://loadsure.example.com");
        assert!(client.api_key.is_none());
    }

    #[test]
    fn premium_wire_values_parse_as_decimals() {
        let raw = r#"{"certificateNumber":"LS-1","premium":30.5}"#;
        let wire: super::IssueResponseWire = serde_json::from_str(raw).expect("parse");
        assert_eq!(wire.premium, Decimal::new(305, 1));
    }
}
