use crate::models::response::HttpResponse;
use crate::services::context::Context;
use crate::services::transport::TransportError;
use bytes::Bytes;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid request url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported url scheme {0:?}, expected http or https")]
    UnsupportedScheme(String),
    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),
    #[error("invalid value for header {0:?}")]
    InvalidHeaderValue(String),
    #[error("request already executed")]
    AlreadyExecuted,
}

/// Why a request has no usable response.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Request Timeout")]
    Timeout,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("no response available")]
    NoResponse,
    #[error("request already executed")]
    AlreadyExecuted,
}

/// One outbound call and, once executed, its outcome.
///
/// A request is executed at most once, by the batch it was added to.
/// Outcome fields are only meaningful after the batch's `execute` returned.
#[derive(Debug)]
pub struct HttpRequest {
    id: Uuid,
    method: Method,
    url: Url,
    context: Context,
    pending: Option<reqwest::Request>,
    response: Option<HttpResponse>,
    error: Option<RequestError>,
    timed_out: bool,
    elapsed_ms: u64,
}

impl HttpRequest {
    /// GET when `body` is `None`, POST carrying `body` otherwise.
    pub fn new(ctx: &Context, url: &str, body: Option<Bytes>) -> Result<Self, BuildError> {
        let parsed = Url::parse(url).map_err(|source| BuildError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BuildError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        let method = if body.is_some() {
            Method::POST
        } else {
            Method::GET
        };
        let mut request = reqwest::Request::new(method.clone(), parsed.clone());
        if let Some(body) = body {
            *request.body_mut() = Some(body.into());
        }

        Ok(Self {
            id: Uuid::new_v4(),
            method,
            url: parsed,
            context: ctx.clone(),
            pending: Some(request),
            response: None,
            error: None,
            timed_out: false,
            elapsed_ms: 0,
        })
    }

    pub fn get(ctx: &Context, url: &str) -> Result<Self, BuildError> {
        Self::new(ctx, url, None)
    }

    pub fn post(ctx: &Context, url: &str, body: impl Into<Bytes>) -> Result<Self, BuildError> {
        Self::new(ctx, url, Some(body.into()))
    }

    /// Appends a header value; earlier values for the same name are kept.
    pub fn add_header(&mut self, key: &str, value: &str) -> Result<(), BuildError> {
        let request = self.pending.as_mut().ok_or(BuildError::AlreadyExecuted)?;
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| BuildError::InvalidHeaderName(key.to_string()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| BuildError::InvalidHeaderValue(key.to_string()))?;
        request.headers_mut().append(name, value);
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn response(&self) -> Option<&HttpResponse> {
        self.response.as_ref()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.response.as_ref().map(HttpResponse::status)
    }

    pub fn response_body(&self) -> Result<&Bytes, RequestError> {
        self.response
            .as_ref()
            .map(HttpResponse::body)
            .ok_or(RequestError::NoResponse)
    }

    /// Hands the response out, leaving none behind.
    pub fn take_response(&mut self) -> Option<HttpResponse> {
        self.response.take()
    }

    pub fn error(&self) -> Option<&RequestError> {
        self.error.as_ref()
    }

    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    /// Milliseconds from the start of the batch until this request resolved.
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// True once the request was dispatched and its outcome recorded.
    pub fn is_resolved(&self) -> bool {
        self.pending.is_none() && (self.response.is_some() || self.error.is_some())
    }

    pub(crate) fn dispatch(&mut self) -> Option<reqwest::Request> {
        self.pending.take()
    }

    pub(crate) fn complete(&mut self, outcome: Result<HttpResponse, RequestError>, elapsed_ms: u64) {
        match outcome {
            Ok(response) => self.response = Some(response),
            Err(error) => self.error = Some(error),
        }
        self.elapsed_ms = elapsed_ms;
    }

    pub(crate) fn time_out(&mut self, elapsed_ms: u64) {
        self.timed_out = true;
        self.error = Some(RequestError::Timeout);
        self.elapsed_ms = elapsed_ms;
    }

    pub(crate) fn reject(&mut self, error: RequestError) {
        self.error = Some(error);
    }
}
