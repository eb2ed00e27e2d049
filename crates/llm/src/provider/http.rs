//! Request execution and upstream error decoding shared by the adapters.

use std::time::Duration;

use config::ProviderKind;
use reqwest::{
    Client, RequestBuilder, Response, StatusCode,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{ErrorKind, LlmError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Vendor error decoded from a failed response body.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct VendorError {
    pub kind: ErrorKind,
    pub code: Option<String>,
    pub message: Option<String>,
}

impl VendorError {
    /// The baseline mapping of the status, without any body information.
    pub fn from_status(status: StatusCode) -> Self {
        Self {
            kind: ErrorKind::from_status(status.as_u16()),
            code: None,
            message: None,
        }
    }
}

/// Turns a failed status and its body into a vendor error.
pub(crate) type ErrorClassifier = fn(StatusCode, &str) -> VendorError;

/// Build the HTTP client of one adapter. Calls are bounded per request, never per client,
/// so that streams are limited by the caller only.
pub(crate) fn client(provider: ProviderKind, headers: HeaderMap) -> crate::Result<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .default_headers(headers)
        .build()
        .map_err(|e| {
            log::error!("Failed to create HTTP client for {provider} provider: {e}");
            LlmError::new(ErrorKind::InvalidConfig, format!("failed to create HTTP client: {e}"))
                .with_provider(provider)
                .with_source(e)
        })
}

/// Send a request and map transport failures and error statuses to [`LlmError`].
pub(crate) async fn send(
    request: RequestBuilder,
    provider: ProviderKind,
    model: &str,
    classify: ErrorClassifier,
) -> crate::Result<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(e, provider, model))?;

    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    log::error!("{provider} API error ({status}): {body}");

    let vendor = classify(status, &body);

    let message = vendor
        .message
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("upstream returned {status}"));

    let mut error = LlmError::new(vendor.kind, message)
        .with_provider(provider)
        .with_model(model)
        .with_detail("status", status.as_u16());

    if let Some(code) = vendor.code {
        error = error.with_detail("code", code);
    }

    Err(error)
}

/// Read the whole body and decode it as JSON.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: Response,
    provider: ProviderKind,
    model: &str,
) -> crate::Result<T> {
    let text = response
        .text()
        .await
        .map_err(|e| transport_error(e, provider, model))?;

    sonic_rs::from_str(&text).map_err(|e| {
        log::error!("Failed to parse {provider} response: {e}");
        log::error!("Raw response that failed to parse: {text}");

        LlmError::new(ErrorKind::InvalidResponse, format!("failed to decode the {provider} response: {e}"))
            .with_provider(provider)
            .with_model(model)
    })
}

pub(crate) fn transport_error(error: reqwest::Error, provider: ProviderKind, model: &str) -> LlmError {
    let kind = if error.is_timeout() {
        ErrorKind::Timeout
    } else {
        ErrorKind::ApiCallFailed
    };

    LlmError::new(kind, format!("request to {provider} failed: {error}"))
        .with_provider(provider)
        .with_model(model)
        .with_source(error)
}

/// A header value holding a credential. Marked sensitive so it never shows in debug output.
pub(crate) fn secret_header(value: &str, provider: ProviderKind) -> crate::Result<HeaderValue> {
    let mut value = HeaderValue::from_str(value).map_err(|_| {
        LlmError::new(ErrorKind::InvalidConfig, "the API key contains characters not allowed in a header")
            .with_provider(provider)
    })?;

    value.set_sensitive(true);

    Ok(value)
}

/// A plain header value taken from configuration.
pub(crate) fn header_value(value: &str, provider: ProviderKind) -> crate::Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| {
        LlmError::new(ErrorKind::InvalidConfig, format!("'{value}' is not a valid header value")).with_provider(provider)
    })
}

/// Default headers authenticating with `Authorization: Bearer <key>`.
pub(crate) fn bearer_headers(api_key: &SecretString, provider: ProviderKind) -> crate::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let value = secret_header(&format!("Bearer {}", api_key.expose_secret()), provider)?;
    headers.insert(AUTHORIZATION, value);

    Ok(headers)
}

/// The configured base URL without a trailing slash, or the vendor default.
pub(crate) fn base_url(configured: Option<&Url>, default: &str) -> String {
    configured
        .map(Url::as_str)
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}
