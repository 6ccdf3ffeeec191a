//! License gate
//!
//! Entry to the planner requires a purchased license key. Verification is a
//! single form POST to the seller's license API; access is granted only when
//! the API reports success and the purchase has not been refunded.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::LicensingConfig;
use crate::generation::truncate_body;
use crate::types::{LicenseError, RuntimeError};

/// Form field the product identifier is sent under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductField {
    #[default]
    ProductId,
    ProductPermalink,
}

impl ProductField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductField::ProductId => "product_id",
            ProductField::ProductPermalink => "product_permalink",
        }
    }
}

/// Body returned by the verification endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerificationResponse {
    #[serde(default)]
    pub success: bool,
    pub message: Option<String>,
    pub purchase: Option<Purchase>,
}

/// Purchase details attached to a verification
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Purchase {
    pub refunded: Option<bool>,
    pub product_name: Option<String>,
}

impl VerificationResponse {
    /// Access is granted iff `success` and the purchase is not refunded
    pub fn verdict(&self) -> Result<(), LicenseError> {
        if !self.success {
            return Err(LicenseError::Invalid);
        }
        let refunded = self
            .purchase
            .as_ref()
            .and_then(|p| p.refunded)
            .unwrap_or(false);
        if refunded {
            return Err(LicenseError::Refunded);
        }
        Ok(())
    }
}

/// Proof that a license key passed the gate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LicenseGrant {
    /// Masked key, safe to log and display
    pub key_hint: String,
    pub product_name: Option<String>,
    pub verified_at: DateTime<Utc>,
}

/// Checks license keys against a licensing authority
#[async_trait]
pub trait LicenseVerifier: Send + Sync {
    async fn verify(&self, license_key: &str) -> Result<LicenseGrant, LicenseError>;
}

/// Gumroad license API client
pub struct GumroadVerifier {
    client: reqwest::Client,
    endpoint: String,
    product_id: String,
    product_field: ProductField,
}

impl GumroadVerifier {
    pub fn new(config: &LicensingConfig) -> Result<Self, RuntimeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RuntimeError::Internal(format!("HTTP client init: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            product_id: config.product_id.clone(),
            product_field: config.product_field,
        })
    }
}

#[async_trait]
impl LicenseVerifier for GumroadVerifier {
    async fn verify(&self, license_key: &str) -> Result<LicenseGrant, LicenseError> {
        let license_key = license_key.trim();
        if license_key.is_empty() {
            return Err(LicenseError::EmptyKey);
        }
        let key_hint = mask_key(license_key);

        let form = [
            (self.product_field.as_str(), self.product_id.as_str()),
            ("license_key", license_key),
        ];

        let response = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("License verification request failed: {}", e);
                LicenseError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LicenseError::Unavailable(e.to_string()))?;

        // Unknown keys come back as 404 with a JSON body, so the body is
        // parsed regardless of status.
        let parsed: VerificationResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(LicenseError::Unavailable(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    truncate_body(&body)
                )));
            }
            Err(e) => return Err(LicenseError::Malformed(e.to_string())),
        };

        match parsed.verdict() {
            Ok(()) => {
                tracing::info!("License {} verified", key_hint);
                Ok(LicenseGrant {
                    key_hint,
                    product_name: parsed.purchase.and_then(|p| p.product_name),
                    verified_at: Utc::now(),
                })
            }
            Err(e) => {
                tracing::warn!(
                    "License {} denied: {} ({})",
                    key_hint,
                    e,
                    parsed.message.as_deref().unwrap_or("no message")
                );
                Err(e)
            }
        }
    }
}

/// Keep only the last four characters of a key
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let visible = chars.len().min(4);
    let tail: String = chars[chars.len() - visible..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - visible), tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> LicensingConfig {
        LicensingConfig {
            endpoint: format!("{}/v2/licenses/verify", server.uri()),
            product_id: "prod-1".to_string(),
            ..LicensingConfig::default()
        }
    }

    #[test]
    fn verdict_requires_success_and_no_refund() {
        let ok = VerificationResponse {
            success: true,
            ..Default::default()
        };
        assert!(ok.verdict().is_ok());

        let refunded = VerificationResponse {
            success: true,
            purchase: Some(Purchase {
                refunded: Some(true),
                product_name: None,
            }),
            ..Default::default()
        };
        assert_eq!(refunded.verdict(), Err(LicenseError::Refunded));

        let not_refunded = VerificationResponse {
            success: true,
            purchase: Some(Purchase {
                refunded: Some(false),
                product_name: None,
            }),
            ..Default::default()
        };
        assert!(not_refunded.verdict().is_ok());

        let failed = VerificationResponse::default();
        assert_eq!(failed.verdict(), Err(LicenseError::Invalid));
    }

    #[test]
    fn masks_all_but_last_four() {
        assert_eq!(mask_key("ABCD-1234-EFGH"), "**********EFGH");
        assert_eq!(mask_key("abc"), "abc");
    }

    #[tokio::test]
    async fn valid_key_is_granted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/licenses/verify"))
            .and(body_string_contains("product_id=prod-1"))
            .and(body_string_contains("license_key=KEY-0001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "purchase": {"refunded": false, "product_name": "VIP Travel Agent"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let verifier = GumroadVerifier::new(&config(&server)).unwrap();
        let grant = verifier.verify("  KEY-0001 ").await.unwrap();
        assert_eq!(grant.key_hint, "****0001");
        assert_eq!(grant.product_name.as_deref(), Some("VIP Travel Agent"));
    }

    #[tokio::test]
    async fn unknown_key_404_is_a_denial() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/licenses/verify"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "success": false,
                "message": "That license does not exist for the provided product."
            })))
            .mount(&server)
            .await;

        let verifier = GumroadVerifier::new(&config(&server)).unwrap();
        assert_eq!(verifier.verify("nope").await, Err(LicenseError::Invalid));
    }

    #[tokio::test]
    async fn refunded_purchase_is_denied() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "purchase": {"refunded": true}
            })))
            .mount(&server)
            .await;

        let verifier = GumroadVerifier::new(&config(&server)).unwrap();
        assert_eq!(verifier.verify("KEY").await, Err(LicenseError::Refunded));
    }

    #[tokio::test]
    async fn permalink_field_is_honoured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("product_permalink=prod-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let mut cfg = config(&server);
        cfg.product_field = ProductField::ProductPermalink;
        let verifier = GumroadVerifier::new(&cfg).unwrap();
        assert!(verifier.verify("KEY").await.is_ok());
    }

    #[tokio::test]
    async fn outage_and_garbage_are_not_denials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("license_key=down"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("license_key=garbage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let verifier = GumroadVerifier::new(&config(&server)).unwrap();

        let err = verifier.verify("down").await.unwrap_err();
        assert!(matches!(err, LicenseError::Unavailable(ref m) if m.starts_with("HTTP 502")));
        assert!(!err.is_denial());

        let err = verifier.verify("garbage").await.unwrap_err();
        assert!(matches!(err, LicenseError::Malformed(_)));
    }

    #[tokio::test]
    async fn blank_key_is_rejected_without_a_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(0)
            .mount(&server)
            .await;

        let verifier = GumroadVerifier::new(&config(&server)).unwrap();
        assert_eq!(verifier.verify("   ").await, Err(LicenseError::EmptyKey));
    }
}
