//! Single-attempt transport: encodes a [`RequestDescriptor`], enforces the timeout and
//! classifies every failure into an [`ApiError`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{parse_retry_after, ApiError, ApiErrorKind};
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::response::{Params, RequestDescriptor, WirePayload, WireResponse};

#[derive(Serialize)]
struct WireRequest<'a> {
    api_name: &'a str,
    token: &'a str,
    params: &'a Params,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<String>,
}

#[derive(Deserialize)]
struct WireEnvelope {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<WirePayload>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Performs one HTTP exchange per [`send`](Transport::send); retries live elsewhere.
#[derive(Clone)]
pub struct Transport {
    http_client: Arc<dyn HttpClient>,
    endpoint: String,
    timeout: Duration,
}

impl Transport {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn send(&self, descriptor: &RequestDescriptor) -> Result<WireResponse, ApiError> {
        let body = encode_request(descriptor)?;
        let request = HttpRequest::post(&self.endpoint)
            .with_json_body(body)
            .with_timeout(self.timeout);

        let started = Instant::now();
        let response = match tokio::time::timeout(self.timeout, self.http_client.execute(request))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(ApiError::timeout(format!(
                    "request for '{}' exceeded {} ms",
                    descriptor.endpoint,
                    self.timeout.as_millis()
                )));
            }
        };

        tracing::debug!(
            api_name = %descriptor.endpoint,
            status = response.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "transport exchange completed"
        );

        decode_response(response, OffsetDateTime::now_utc())
    }
}

/// Serializes the descriptor into `{ api_name, token, params, fields }`.
pub fn encode_request(descriptor: &RequestDescriptor) -> Result<String, ApiError> {
    let wire = WireRequest {
        api_name: &descriptor.endpoint,
        token: &descriptor.token,
        params: &descriptor.params,
        fields: descriptor.fields.as_ref().map(|fields| fields.join(",")),
    };

    serde_json::to_string(&wire).map_err(|e| {
        ApiError::unknown(format!("failed to encode request body: {e}")).with_cause(e)
    })
}

/// Maps a raw HTTP response to a decoded envelope or a classified error.
pub(crate) fn decode_response(
    response: HttpResponse,
    now: OffsetDateTime,
) -> Result<WireResponse, ApiError> {
    if !response.is_success() {
        let mut error = ApiError::from_status(response.status, error_message(&response));
        if error.kind() == ApiErrorKind::RateLimit {
            if let Some(delay) = response
                .header("retry-after")
                .and_then(|value| parse_retry_after(value, now))
            {
                error = error.with_retry_after(delay);
            }
        }
        return Err(error);
    }

    let envelope: WireEnvelope = serde_json::from_str(&response.body).map_err(|e| {
        ApiError::unknown(format!("malformed response envelope: {e}")).with_cause(e)
    })?;

    if envelope.code != 0 {
        return Err(ApiError::business(
            response.status,
            envelope.code,
            envelope.msg,
        ));
    }

    Ok(WireResponse {
        status: response.status,
        code: envelope.code,
        message: envelope.msg.unwrap_or_default(),
        payload: envelope.data,
    })
}

fn error_message(response: &HttpResponse) -> String {
    serde_json::from_str::<ErrorBody>(&response.body)
        .ok()
        .and_then(|body| body.msg.or(body.message))
        .filter(|msg| !msg.trim().is_empty())
        .unwrap_or_else(|| {
            reqwest::StatusCode::from_u16(response.status)
                .ok()
                .and_then(|status| status.canonical_reason())
                .map(String::from)
                .unwrap_or_else(|| format!("HTTP {}", response.status))
        })
}
