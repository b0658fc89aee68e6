use std::env;
use std::time::{Duration, Instant};

use futures::Stream;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::sse::process_sse;
use crate::types::{ApiErrorResponse, GenerateContentRequest, GenerateContentResponse, Model};

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the Gemini generative-language API.
///
/// Only the streaming `streamGenerateContent` call is exposed. The client has no
/// overall request timeout because a streamed reply may legitimately take
/// minutes; only connection setup is bounded.
#[derive(Debug, Clone)]
pub struct Gemini {
    api_key: String,
    client: ReqwestClient,
    base_url: Url,
    connect_timeout: Duration,
}

impl Gemini {
    /// Create a new Gemini client.
    ///
    /// The API key can be provided directly or read from the GEMINI_API_KEY
    /// environment variable.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        connect_timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => env::var(API_KEY_ENV).map_err(|_| {
                Error::authentication(format!(
                    "API key not found. Please set the {API_KEY_ENV} environment variable."
                ))
            })?,
        };
        if api_key.trim().is_empty() {
            return Err(Error::authentication(format!("{API_KEY_ENV} is empty")));
        }

        let base_url = parse_base_url(base_url.as_deref().unwrap_or(DEFAULT_API_URL))?;
        let connect_timeout = connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            api_key,
            client,
            base_url,
            connect_timeout,
        })
    }

    /// The base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| Error::authentication("API key contains invalid header characters"))?;
        headers.insert("x-goog-api-key", key);
        Ok(headers)
    }

    /// The endpoint for streaming generation with `model`.
    pub fn stream_url(&self, model: &Model) -> Result<Url> {
        let mut url = self
            .base_url
            .join(&format!("models/{model}:streamGenerateContent"))?;
        url.set_query(Some("alt=sse"));
        Ok(url)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        // Gemini wraps errors as {"error": {...}}, sometimes inside a one-element array.
        let parsed = serde_json::from_str::<ApiErrorResponse>(&error_body)
            .ok()
            .or_else(|| {
                serde_json::from_str::<Vec<ApiErrorResponse>>(&error_body)
                    .ok()
                    .and_then(|mut errors| errors.pop())
            });
        let (status, message) = match parsed {
            Some(body) => (
                body.error.status,
                body.error.message.unwrap_or_else(|| error_body.clone()),
            ),
            None => (None, error_body),
        };

        classify_api_error(status_code, status, message, retry_after)
    }

    /// Send a generation request and get a stream of response chunks.
    ///
    /// The returned stream ends when the server closes the response. Dropping
    /// it aborts the underlying HTTP request.
    pub async fn stream_generate_content(
        &self,
        model: &Model,
        request: &GenerateContentRequest,
    ) -> Result<impl Stream<Item = Result<GenerateContentResponse>> + Send + Unpin + 'static> {
        let url = self.stream_url(model)?;
        let headers = self.default_headers()?;

        CLIENT_REQUESTS.click();
        let start = Instant::now();
        tracing::debug!(%model, contents = request.contents.len(), "streamGenerateContent");
        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                CLIENT_REQUEST_ERRORS.click();
                if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {e}"),
                        Some(self.connect_timeout.as_secs_f64()),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
                }
            })?;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            let err = Self::process_error_response(response).await;
            tracing::debug!(error = %err, "streamGenerateContent rejected");
            return Err(err);
        }

        Ok(Box::pin(process_sse(response.bytes_stream())))
    }
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    // A base without a trailing slash would make `join` replace its last segment.
    let normalized = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{base_url}/")
    };
    let url = Url::parse(&normalized)?;
    if url.cannot_be_a_base() {
        return Err(Error::url(format!("{base_url} cannot be a base URL"), None));
    }
    Ok(url)
}

/// Map an HTTP status code and API error payload to an [`Error`].
pub(crate) fn classify_api_error(
    status_code: u16,
    status: Option<String>,
    message: String,
    retry_after: Option<u64>,
) -> Error {
    match status_code {
        400 => match status.as_deref() {
            Some("FAILED_PRECONDITION") | Some("INVALID_ARGUMENT")
                if message.contains("API key") =>
            {
                Error::authentication(message)
            }
            _ => Error::bad_request(message),
        },
        401 => Error::authentication(message),
        403 => Error::permission(message),
        404 => Error::not_found(message),
        408 | 504 => Error::timeout(message, None),
        429 => Error::rate_limit(message, retry_after),
        500 => Error::internal_server(message),
        502 | 503 => Error::service_unavailable(message, retry_after),
        _ => Error::api(status_code, status, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KnownModel;

    #[test]
    fn client_creation() {
        let client = Gemini::new(Some("test-key".to_string())).unwrap();
        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.base_url.as_str(), DEFAULT_API_URL);
        assert_eq!(client.connect_timeout, DEFAULT_CONNECT_TIMEOUT);

        let client = Gemini::with_options(
            Some("test-key".to_string()),
            Some("http://localhost:8080/v1beta".to_string()),
            Some(Duration::from_secs(5)),
        )
        .unwrap();
        assert_eq!(client.base_url.as_str(), "http://localhost:8080/v1beta/");
        assert_eq!(client.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn blank_key_rejected() {
        let err = Gemini::new(Some("  ".to_string())).unwrap_err();
        assert!(err.is_authentication());
    }

    #[test]
    fn invalid_base_url_rejected() {
        let err = Gemini::with_options(Some("k".to_string()), Some("not a url".to_string()), None)
            .unwrap_err();
        assert!(matches!(err, Error::Url { .. }));
    }

    #[test]
    fn stream_url_for_model() {
        let client = Gemini::new(Some("k".to_string())).unwrap();
        let url = client
            .stream_url(&Model::Known(KnownModel::Gemini25Flash))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn headers_carry_key() {
        let client = Gemini::new(Some("secret".to_string())).unwrap();
        let headers = client.default_headers().unwrap();
        assert_eq!(headers.get("x-goog-api-key").unwrap(), "secret");
        assert_eq!(headers.get(header::ACCEPT).unwrap(), "text/event-stream");
    }

    #[test]
    fn classify_statuses() {
        let err = classify_api_error(
            400,
            Some("INVALID_ARGUMENT".to_string()),
            "API key not valid. Please pass a valid API key.".to_string(),
            None,
        );
        assert!(err.is_authentication());

        let err = classify_api_error(400, None, "bad field".to_string(), None);
        assert!(matches!(err, Error::BadRequest { .. }));

        let err = classify_api_error(429, None, "slow down".to_string(), Some(7));
        assert!(err.is_rate_limit());

        let err = classify_api_error(503, None, "overloaded".to_string(), None);
        assert!(err.is_server_error());

        let err = classify_api_error(418, Some("TEAPOT".to_string()), "short".to_string(), None);
        assert_eq!(err.status_code(), Some(418));
    }
}
