//! Response serialization.
//!
//! # Responsibilities
//! - Serialize raw payloads and JSON values into a `ResponseEnvelope`
//! - Negotiate gzip for JSON bodies
//! - Compute status, Content-Type, Content-Length and Content-Encoding up front
//! - Stream the body in chunks, stopping when the request is cancelled
//!
//! # Design Decisions
//! - Headers are final before the first body byte; HEAD gets identical headers, no body
//! - Absent payloads map to 404 with no body, never an error
//! - JSON is camelCase (via serde attributes) with null members removed
//! - Pretty JSON only in development mode
//! - Verbs other than GET/HEAD get the envelope status and type but no body

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, Method, Response, StatusCode};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::routing::matcher::{is_get, is_head};

/// Content type of JSON responses, compressed or not.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Default body-copy chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Errors raised while building a response body.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("json serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("gzip compression failed: {0}")]
    Compress(#[from] std::io::Error),
}

/// Body encoding selected for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
}

impl ContentEncoding {
    /// Pick gzip when allowed and the client's Accept-Encoding accepts it.
    pub fn negotiate(headers: &HeaderMap, allow_gzip: bool) -> Self {
        if !allow_gzip {
            return ContentEncoding::Identity;
        }
        let accepts_gzip = headers
            .get_all(header::ACCEPT_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(accepts_coding_gzip);

        if accepts_gzip {
            ContentEncoding::Gzip
        } else {
            ContentEncoding::Identity
        }
    }

    pub fn header_value(&self) -> Option<&'static str> {
        match self {
            ContentEncoding::Identity => None,
            ContentEncoding::Gzip => Some("gzip"),
        }
    }
}

/// `gzip`, `gzip;q=0.5` and `*` accept gzip; `gzip;q=0` does not.
fn accepts_coding_gzip(token: &str) -> bool {
    let mut parts = token.split(';').map(str::trim);
    let coding = parts.next().unwrap_or_default();
    if !(coding.eq_ignore_ascii_case("gzip") || coding == "*") {
        return false;
    }
    for param in parts {
        if let Some(q) = param.strip_prefix("q=").or_else(|| param.strip_prefix("Q=")) {
            return q.trim().parse::<f32>().map(|q| q > 0.0).unwrap_or(false);
        }
    }
    true
}

/// Compress `bytes` with gzip at the default level.
pub fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2 + 16), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// Canonical JSON formatting.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat {
    pretty: bool,
}

impl JsonFormat {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Serialize `value`, dropping null object members.
    pub fn to_vec<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, serde_json::Error> {
        let mut tree = serde_json::to_value(value)?;
        strip_nulls(&mut tree);
        if self.pretty {
            serde_json::to_vec_pretty(&tree)
        } else {
            serde_json::to_vec(&tree)
        }
    }
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// Status, headers and payload of one response, computed before any write.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub content_length: u64,
    pub content_encoding: Option<&'static str>,
    pub payload: Bytes,
}

impl ResponseEnvelope {
    /// Bodyless envelope with the given status.
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            content_type: None,
            content_length: 0,
            content_encoding: None,
            payload: Bytes::new(),
        }
    }

    pub fn not_found() -> Self {
        Self::status(StatusCode::NOT_FOUND)
    }

    /// 200 OK carrying `payload` as `content_type`.
    pub fn ok(content_type: &str, payload: Bytes, content_encoding: Option<&'static str>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: Some(content_type.to_string()),
            content_length: payload.len() as u64,
            content_encoding,
            payload,
        }
    }

    /// Render for `method`: GET streams the payload, HEAD and other verbs send headers only.
    pub fn into_response(self, method: &Method, chunk_size: usize, cancel: CancellationToken) -> Response<Body> {
        let sends_body = is_get(method);
        let keeps_length = sends_body || is_head(method);

        let body = if sends_body && !self.payload.is_empty() {
            chunked_body(self.payload, chunk_size, cancel)
        } else {
            Body::empty()
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        let headers = response.headers_mut();

        if let Some(content_type) = self.content_type.as_deref().and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(header::CONTENT_TYPE, content_type);
        }
        if let Some(encoding) = self.content_encoding {
            headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static(encoding));
        }
        let length = if keeps_length { self.content_length } else { 0 };
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

        response
    }
}

/// Stream `payload` in `chunk_size` pieces until done or `cancel` fires.
fn chunked_body(payload: Bytes, chunk_size: usize, cancel: CancellationToken) -> Body {
    let chunk_size = chunk_size.max(1);
    let stream = futures_util::stream::unfold((payload, cancel), move |(mut remaining, cancel)| async move {
        if remaining.is_empty() {
            return None;
        }
        if cancel.is_cancelled() {
            tracing::debug!(remaining = remaining.len(), "Request cancelled, abandoning body write");
            let aborted = std::io::Error::new(std::io::ErrorKind::ConnectionAborted, "request cancelled");
            return Some((Err(aborted), (Bytes::new(), cancel)));
        }
        let chunk = remaining.split_to(chunk_size.min(remaining.len()));
        Some((Ok(chunk), (remaining, cancel)))
    });
    Body::from_stream(stream)
}

/// Writes raw and JSON responses.
#[derive(Debug, Clone)]
pub struct ResponseWriter {
    json: JsonFormat,
    chunk_size: usize,
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new(false, DEFAULT_CHUNK_SIZE)
    }
}

impl ResponseWriter {
    pub fn new(development_mode: bool, chunk_size: usize) -> Self {
        Self {
            json: JsonFormat::new(development_mode),
            chunk_size,
        }
    }

    pub fn json_format(&self) -> JsonFormat {
        self.json
    }

    /// Envelope for a raw payload; `None` is 404.
    pub fn raw_envelope(&self, content_type: &str, payload: Option<Bytes>) -> ResponseEnvelope {
        match payload {
            Some(payload) => ResponseEnvelope::ok(content_type, payload, None),
            None => ResponseEnvelope::not_found(),
        }
    }

    /// Envelope for a JSON value; `None` is 404.
    pub fn json_envelope<T: Serialize + ?Sized>(
        &self,
        value: Option<&T>,
        encoding: ContentEncoding,
    ) -> Result<ResponseEnvelope, WriteError> {
        let Some(value) = value else {
            return Ok(ResponseEnvelope::not_found());
        };

        let text = self.json.to_vec(value)?;
        let payload = match encoding {
            ContentEncoding::Identity => text,
            ContentEncoding::Gzip => gzip(&text)?,
        };
        Ok(ResponseEnvelope::ok(
            JSON_CONTENT_TYPE,
            Bytes::from(payload),
            encoding.header_value(),
        ))
    }

    pub fn raw(
        &self,
        method: &Method,
        content_type: &str,
        payload: Option<Bytes>,
        cancel: CancellationToken,
    ) -> Response<Body> {
        self.raw_envelope(content_type, payload)
            .into_response(method, self.chunk_size, cancel)
    }

    pub fn json<T: Serialize + ?Sized>(
        &self,
        method: &Method,
        value: Option<&T>,
        encoding: ContentEncoding,
        cancel: CancellationToken,
    ) -> Result<Response<Body>, WriteError> {
        Ok(self
            .json_envelope(value, encoding)?
            .into_response(method, self.chunk_size, cancel))
    }

    /// Bodyless response with `status`.
    pub fn status(&self, status: StatusCode) -> Response<Body> {
        ResponseEnvelope::status(status).into_response(&Method::HEAD, self.chunk_size, CancellationToken::new())
    }

    pub fn not_found(&self) -> Response<Body> {
        self.status(StatusCode::NOT_FOUND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use serde::Deserialize;
    use std::io::Read;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Sample {
        package_id: String,
        total_downloads: u64,
        #[serde(default)]
        icon_url: Option<String>,
    }

    fn sample() -> Sample {
        Sample {
            package_id: "Foo".into(),
            total_downloads: 7,
            icon_url: None,
        }
    }

    async fn body_bytes(response: Response<Body>) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
    }

    #[tokio::test]
    async fn test_raw_get_streams_payload() {
        let writer = ResponseWriter::new(false, 2);
        let response = writer.raw(
            &Method::GET,
            "application/octet-stream",
            Some(Bytes::from_static(&[1, 2, 3])),
            CancellationToken::new(),
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "3");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/octet-stream");
        assert_eq!(&body_bytes(response).await[..], &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_raw_absent_payload_is_not_found() {
        let writer = ResponseWriter::default();
        for method in [Method::GET, Method::HEAD] {
            let response = writer.raw(&method, "text/xml", None, CancellationToken::new());
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert!(response.headers().get(header::CONTENT_TYPE).is_none());
            assert!(body_bytes(response).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_head_matches_get_headers() {
        let writer = ResponseWriter::default();
        let value = sample();
        for encoding in [ContentEncoding::Identity, ContentEncoding::Gzip] {
            let get = writer
                .json(&Method::GET, Some(&value), encoding, CancellationToken::new())
                .unwrap();
            let head = writer
                .json(&Method::HEAD, Some(&value), encoding, CancellationToken::new())
                .unwrap();
            assert_eq!(get.status(), head.status());
            assert_eq!(get.headers(), head.headers());
            assert!(!body_bytes(get).await.is_empty());
            assert!(body_bytes(head).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_json_is_camel_case_without_nulls() {
        let writer = ResponseWriter::default();
        let response = writer
            .json(&Method::GET, Some(&sample()), ContentEncoding::Identity, CancellationToken::new())
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], JSON_CONTENT_TYPE);
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());

        let body = body_bytes(response).await;
        assert_eq!(&body[..], br#"{"packageId":"Foo","totalDownloads":7}"#);
        let back: Sample = serde_json::from_slice(&body).unwrap();
        assert_eq!(back, sample());
    }

    #[tokio::test]
    async fn test_gzip_body_decompresses_to_plain_body() {
        let writer = ResponseWriter::default();
        let value = sample();
        let plain = writer.json_envelope(Some(&value), ContentEncoding::Identity).unwrap();
        let gz = writer.json_envelope(Some(&value), ContentEncoding::Gzip).unwrap();

        assert_eq!(gz.content_encoding, Some("gzip"));
        assert_eq!(gz.content_length, gz.payload.len() as u64);

        let mut decoded = Vec::new();
        GzDecoder::new(&gz.payload[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, plain.payload.to_vec());
    }

    #[test]
    fn test_null_value_is_not_found() {
        let writer = ResponseWriter::default();
        let envelope = writer
            .json_envelope::<Sample>(None, ContentEncoding::Gzip)
            .unwrap();
        assert_eq!(envelope, ResponseEnvelope::not_found());
    }

    #[test]
    fn test_development_mode_pretty_prints() {
        let pretty = JsonFormat::new(true).to_vec(&sample()).unwrap();
        let compact = JsonFormat::new(false).to_vec(&sample()).unwrap();
        assert!(pretty.contains(&b'\n'));
        assert!(!compact.contains(&b'\n'));
    }

    #[test]
    fn test_strip_nulls_recurses() {
        let value = serde_json::json!({"a": null, "b": [{"c": null, "d": 1}, null]});
        let bytes = JsonFormat::default().to_vec(&value).unwrap();
        assert_eq!(&bytes[..], br#"{"b":[{"d":1},null]}"#);
    }

    #[tokio::test]
    async fn test_other_verbs_get_no_body() {
        let writer = ResponseWriter::default();
        let response = writer.raw(
            &Method::POST,
            "application/octet-stream",
            Some(Bytes::from_static(b"abc")),
            CancellationToken::new(),
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "0");
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_body_stops() {
        let writer = ResponseWriter::new(false, 1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let response = writer.raw(
            &Method::GET,
            "application/octet-stream",
            Some(Bytes::from_static(b"abcdef")),
            cancel,
        );
        assert!(axum::body::to_bytes(response.into_body(), usize::MAX).await.is_err());
    }

    #[test]
    fn test_negotiate_gzip() {
        let mut headers = HeaderMap::new();
        assert_eq!(ContentEncoding::negotiate(&headers, true), ContentEncoding::Identity);

        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("deflate, gzip;q=0.8"));
        assert_eq!(ContentEncoding::negotiate(&headers, true), ContentEncoding::Gzip);
        assert_eq!(ContentEncoding::negotiate(&headers, false), ContentEncoding::Identity);

        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip;q=0"));
        assert_eq!(ContentEncoding::negotiate(&headers, true), ContentEncoding::Identity);
    }
}
