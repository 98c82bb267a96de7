//! Signed delivery of OCR results to the job's webhook.
//!
//! The body is the compact JSON of [`OcrResult`] and the `X-Hub-Signature`
//! header carries the lowercase hex HMAC-SHA256 of exactly those bytes,
//! keyed with the job's `webhook_secret`. Receivers recompute it over the
//! raw body and reject mismatches with a 4xx.
//!
//! A 4xx answer is final: it is logged and the attempt counts as delivered.
//! Transport errors and 5xx answers are delivery errors.

use hmac::{Hmac, Mac};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use sha2::Sha256;
use tracing::{debug, warn};

use fintrack_core::defaults::SIGNATURE_HEADER;
use fintrack_core::{Error, OcrResult, Result};

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `body` under `secret`. An empty secret is a valid key.
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Internal(format!("Invalid HMAC key: {}", e)))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Posts signed results to webhook URLs.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
}

impl WebhookNotifier {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// POST `result` to `url`.
    pub async fn deliver(&self, url: &str, secret: &str, result: &OcrResult) -> Result<()> {
        let body = serde_json::to_vec(result)?;
        let signature = sign_payload(secret, &body)?;

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Delivery(format!("Webhook POST to {} failed: {}", url, e)))?;

        let status = response.status();
        if status.is_client_error() {
            warn!(
                job_id = %result.id,
                url,
                status = status.as_u16(),
                "Webhook rejected the result, not retrying"
            );
            return Ok(());
        }
        if !status.is_success() {
            return Err(Error::Delivery(format!(
                "Webhook {} answered {}",
                url, status
            )));
        }

        debug!(job_id = %result.id, url, status = status.as_u16(), "Webhook delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_signature_format() {
        let sig = sign_payload("my-secret", br#"{"id":"1","text":"hi"}"#).unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_signature_deterministic() {
        let body = br#"{"id":"1","text":"receipt"}"#;
        let sig1 = sign_payload("s", body).unwrap();
        let sig2 = sign_payload("s", body).unwrap();
        assert_eq!(sig1, sig2);

        assert_ne!(sig1, sign_payload("s", br#"{"id":"2","text":"receipt"}"#).unwrap());
        assert_ne!(sig1, sign_payload("other", body).unwrap());
    }

    #[test]
    fn test_signature_matches_reference_vector() {
        // RFC 4231 test case 2
        let sig = sign_payload("Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_empty_secret_is_accepted() {
        let sig = sign_payload("", b"{}").unwrap();
        assert_eq!(sig.len(), 64);

        let mut verifier = HmacSha256::new_from_slice(b"").unwrap();
        verifier.update(b"{}");
        verifier
            .verify_slice(&hex::decode(&sig).unwrap())
            .expect("receiver should accept the signature");
    }

    #[tokio::test]
    async fn test_deliver_sends_signed_body() {
        let server = MockServer::start().await;
        let result = OcrResult {
            id: "7".to_string(),
            text: "TOTAL 12.50".to_string(),
        };
        let body = serde_json::to_vec(&result).unwrap();
        let expected = sign_payload("topsecret", &body).unwrap();

        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("X-Hub-Signature", expected.as_str()))
            .and(header("Content-Type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(Client::new());
        notifier
            .deliver(&format!("{}/hook", server.uri()), "topsecret", &result)
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        assert_eq!(received[0].body, body);
    }

    #[tokio::test]
    async fn test_deliver_client_rejection_is_final() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad signature"))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(Client::new());
        notifier
            .deliver(
                &server.uri(),
                "bad",
                &OcrResult {
                    id: "1".to_string(),
                    text: String::new(),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_deliver_server_error_is_delivery_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(Client::new());
        let err = notifier
            .deliver(
                &server.uri(),
                "k",
                &OcrResult {
                    id: "1".to_string(),
                    text: String::new(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Delivery(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_deliver_unreachable_is_delivery_error() {
        let notifier = WebhookNotifier::new(Client::new());
        let err = notifier
            .deliver(
                "http://127.0.0.1:1/hook",
                "k",
                &OcrResult {
                    id: "1".to_string(),
                    text: String::new(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Delivery(_)));
    }
}
