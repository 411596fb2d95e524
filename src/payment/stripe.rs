//! Blocking Stripe REST client.

use std::time::Duration;

use backon::{BlockingRetryable, ExponentialBuilder};
use reqwest::Method;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::config::StripeConfig;
use crate::error::{HealthError, Result};
use crate::model::{Customer, PaymentSource};
use crate::payment::{ApiError, ApiResult, PaymentApi};

pub struct StripeClient {
    http: Client,
    api_base: String,
    secret_key: String,
    backoff: ExponentialBuilder,
}

#[derive(Debug, Deserialize)]
struct SourceList {
    #[serde(default)]
    data: Vec<SourceObject>,
}

#[derive(Debug, Deserialize)]
struct SourceObject {
    id: String,
    #[serde(default)]
    fingerprint: Option<String>,
    #[serde(default)]
    card: Option<CardDetails>,
}

#[derive(Debug, Deserialize)]
struct CardDetails {
    #[serde(default)]
    fingerprint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CustomerObject {
    id: String,
    #[serde(default)]
    default_source: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl SourceObject {
    fn into_source(self) -> PaymentSource {
        let fingerprint = self
            .fingerprint
            .or_else(|| self.card.and_then(|c| c.fingerprint))
            .unwrap_or_default();
        PaymentSource {
            id: self.id,
            fingerprint,
            is_default: false,
        }
    }
}

impl CustomerObject {
    fn into_customer(self) -> Customer {
        // `default_source` is an id, or the source object when expanded.
        let default_source_id = match self.default_source {
            Some(Value::String(id)) => Some(id),
            Some(Value::Object(obj)) => obj.get("id").and_then(Value::as_str).map(str::to_string),
            _ => None,
        };
        Customer {
            id: self.id,
            default_source_id,
        }
    }
}

impl StripeClient {
    /// Build a client from config. A missing secret key is a configuration error.
    pub fn new(config: &StripeConfig) -> Result<Self> {
        let secret_key = config
            .secret_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                HealthError::Configuration("no Stripe secret key configured".into())
            })?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HealthError::Configuration(format!("http client: {e}")))?;

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(10))
            .with_max_times(config.max_retries);

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key,
            backoff,
        })
    }

    fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        form: &[(&str, &str)],
    ) -> ApiResult<Value> {
        let attempt = || self.send_once(method.clone(), path, query, form);
        attempt
            .retry(&self.backoff)
            .when(ApiError::is_retryable)
            .call()
    }

    fn send_once(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        form: &[(&str, &str)],
    ) -> ApiResult<Value> {
        let url = format!("{}{}", self.api_base, path);
        let mut request = self
            .http
            .request(method.clone(), url.as_str())
            .bearer_auth(&self.secret_key);
        if !query.is_empty() {
            request = request.query(query);
        }
        if !form.is_empty() {
            request = request.form(form);
        }

        let response = request.send().map_err(|e| {
            tracing::debug!(%method, path, error = %e, "stripe request failed");
            ApiError::Transport(e.to_string())
        })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !(200..300).contains(&status) {
            let err = classify_failure(status, &body);
            tracing::debug!(%method, path, status, error = %err, "stripe returned an error");
            return Err(err);
        }
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

fn customer_path(customer_id: &str) -> ApiResult<String> {
    Ok(format!("/v1/customers/{}", check_id(customer_id)?))
}

fn source_path(customer_id: &str, source_id: &str) -> ApiResult<String> {
    Ok(format!(
        "{}/sources/{}",
        customer_path(customer_id)?,
        check_id(source_id)?
    ))
}

/// Processor ids are ASCII word characters; anything else would alter the URL.
fn check_id(id: &str) -> ApiResult<&str> {
    if !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        Ok(id)
    } else {
        Err(ApiError::InvalidRequest(format!("malformed id '{id}'")))
    }
}

/// Map a non-2xx response onto the error taxonomy.
fn classify_failure(status: u16, body: &str) -> ApiError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let code = parsed.as_ref().and_then(|e| e.error.code.clone());
    let message = parsed
        .and_then(|e| e.error.message)
        .unwrap_or_else(|| format!("HTTP {status}"));

    if code.as_deref() == Some("resource_missing") {
        return ApiError::NotFound(message);
    }
    match status {
        401 | 403 => ApiError::Auth(message),
        404 => ApiError::NotFound(message),
        429 => ApiError::RateLimited(message),
        400..=499 => ApiError::InvalidRequest(message),
        _ => ApiError::Server { status, message },
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> ApiResult<T> {
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

impl PaymentApi for StripeClient {
    fn list_sources(
        &self,
        customer_id: &str,
        limit: u32,
        source_type: &str,
    ) -> ApiResult<Vec<PaymentSource>> {
        let path = format!("{}/sources", customer_path(customer_id)?);
        let query = [
            ("object", source_type.to_string()),
            ("limit", limit.to_string()),
        ];
        let list: SourceList = decode(self.call(Method::GET, &path, &query, &[])?)?;
        Ok(list.data.into_iter().map(SourceObject::into_source).collect())
    }

    fn retrieve_source(&self, customer_id: &str, source_id: &str) -> ApiResult<PaymentSource> {
        let path = source_path(customer_id, source_id)?;
        let source: SourceObject = decode(self.call(Method::GET, &path, &[], &[])?)?;
        Ok(source.into_source())
    }

    fn detach_source(&self, customer_id: &str, source_id: &str) -> ApiResult<()> {
        let path = source_path(customer_id, source_id)?;
        self.call(Method::DELETE, &path, &[], &[])?;
        Ok(())
    }

    fn set_default_source(&self, customer_id: &str, source_id: &str) -> ApiResult<()> {
        let path = customer_path(customer_id)?;
        self.call(
            Method::POST,
            &path,
            &[],
            &[("default_source", check_id(source_id)?)],
        )?;
        Ok(())
    }

    fn get_customer(&self, customer_id: &str) -> ApiResult<Customer> {
        let path = customer_path(customer_id)?;
        let customer: CustomerObject = decode(self.call(Method::GET, &path, &[], &[])?)?;
        Ok(customer.into_customer())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn source_fingerprint_comes_from_card_details() {
        let obj: SourceObject = serde_json::from_value(json!({
            "id": "src_1",
            "object": "source",
            "card": { "fingerprint": "fp_abc", "brand": "Visa" }
        }))
        .unwrap();
        assert_eq!(obj.into_source(), PaymentSource::new("src_1", "fp_abc"));
    }

    #[test]
    fn top_level_fingerprint_wins() {
        let obj: SourceObject = serde_json::from_value(json!({
            "id": "card_1",
            "fingerprint": "fp_top",
            "card": { "fingerprint": "fp_nested" }
        }))
        .unwrap();
        assert_eq!(obj.into_source().fingerprint, "fp_top");
    }

    #[test]
    fn source_without_fingerprint_is_empty() {
        let obj: SourceObject =
            serde_json::from_value(json!({ "id": "src_2", "type": "ach_debit" })).unwrap();
        assert_eq!(obj.into_source().fingerprint, "");
    }

    #[test]
    fn customer_default_source_as_id_or_object() {
        let plain: CustomerObject =
            serde_json::from_value(json!({ "id": "cus_1", "default_source": "src_9" })).unwrap();
        assert_eq!(plain.into_customer().default_source_id.as_deref(), Some("src_9"));

        let expanded: CustomerObject = serde_json::from_value(
            json!({ "id": "cus_1", "default_source": { "id": "src_8", "object": "source" } }),
        )
        .unwrap();
        assert_eq!(
            expanded.into_customer().default_source_id.as_deref(),
            Some("src_8")
        );

        let none: CustomerObject =
            serde_json::from_value(json!({ "id": "cus_1", "default_source": null })).unwrap();
        assert_eq!(none.into_customer().default_source_id, None);
    }

    #[test]
    fn classify_maps_statuses() {
        let missing = r#"{"error":{"type":"invalid_request_error","code":"resource_missing","message":"No such source: 'src_1'"}}"#;
        assert_eq!(
            classify_failure(400, missing),
            ApiError::NotFound("No such source: 'src_1'".into())
        );
        assert!(matches!(classify_failure(401, ""), ApiError::Auth(_)));
        assert!(matches!(classify_failure(404, ""), ApiError::NotFound(_)));
        assert!(matches!(classify_failure(429, ""), ApiError::RateLimited(_)));
        assert!(matches!(classify_failure(402, "{}"), ApiError::InvalidRequest(_)));
        assert!(matches!(
            classify_failure(503, "oops"),
            ApiError::Server { status: 503, .. }
        ));
    }

    #[test]
    fn ids_are_checked_before_building_paths() {
        assert_eq!(
            source_path("cus_1", "src_2").unwrap(),
            "/v1/customers/cus_1/sources/src_2"
        );
        assert!(customer_path("cus_1/../x").is_err());
        assert!(check_id("").is_err());
    }

    #[test]
    fn client_requires_secret_key() {
        let err = StripeClient::new(&StripeConfig::default()).err().unwrap();
        assert!(matches!(err, HealthError::Configuration(_)));

        let config = StripeConfig {
            secret_key: Some("sk_test_123".into()),
            ..StripeConfig::default()
        };
        assert!(StripeClient::new(&config).is_ok());
    }
}
