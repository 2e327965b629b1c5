//! The request registry.
//!
//! Holds metadata for every routed HTTP request between HTTP_START and the
//! moment its response ends or the client goes away. Metadata is copied out
//! of the hyper request when the request arrives, so accessors never touch
//! engine-owned buffers.

use std::borrow::Cow;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use http::{HeaderValue, StatusCode};
use indexmap::IndexMap;
use pylon_core::buffer::{copy_nul_terminated, BufferCopy};
use pylon_core::{RequestId, RequestStatus, ResponseStatus};
use tracing::{debug, warn};

use crate::response::ResponseHandle;

/// Metadata of one in-flight request.
#[derive(Debug)]
pub struct RequestRecord {
    id: RequestId,
    method: String,
    url: String,
    query: String,
    route: String,
    headers: IndexMap<String, HeaderValue>,
    response: ResponseHandle,
}

impl RequestRecord {
    /// Copies metadata out of request parts.
    ///
    /// Header names are lower-cased; repeated headers keep the last value.
    /// Values are kept byte for byte.
    pub fn from_parts(
        id: RequestId,
        parts: &http::request::Parts,
        route: impl Into<String>,
        response: ResponseHandle,
    ) -> Self {
        let mut headers = IndexMap::with_capacity(parts.headers.len());
        for (name, value) in &parts.headers {
            headers.insert(name.as_str().to_ascii_lowercase(), value.clone());
        }
        Self {
            id,
            method: parts.method.as_str().to_string(),
            url: parts.uri.path().to_string(),
            query: parts.uri.query().unwrap_or_default().to_string(),
            route: route.into(),
            headers,
            response,
        }
    }

    /// The request id.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// The method as received.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request path.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The query string without the leading `?`.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// The route pattern that matched.
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Looks up the raw value of a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(HeaderValue::as_bytes)
    }

    /// All headers in arrival order.
    pub fn headers(&self) -> &IndexMap<String, HeaderValue> {
        &self.headers
    }

    /// All headers as a JSON object.
    ///
    /// JSON strings are UTF-8, so obs-text bytes in values come out as
    /// U+FFFD here. [`header`](Self::header) keeps them.
    pub fn headers_json(&self) -> String {
        let headers: IndexMap<&str, Cow<'_, str>> = self
            .headers
            .iter()
            .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value.as_bytes())))
            .collect();
        serde_json::to_string(&headers).unwrap_or_else(|_| "{}".to_string())
    }

    /// The response handle.
    pub fn response(&self) -> &ResponseHandle {
        &self.response
    }
}

/// A request field readable through [`RequestRegistry::copy_field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestField<'a> {
    /// The HTTP method.
    Method,
    /// The request path.
    Url,
    /// The query string.
    Query,
    /// The matched route pattern.
    Endpoint,
    /// One header by name.
    Header(&'a str),
    /// Every header as a JSON object.
    AllHeaders,
}

/// Map from request id to in-flight request.
#[derive(Debug)]
pub struct RequestRegistry {
    requests: DashMap<RequestId, RequestRecord>,
    max_backpressure: usize,
}

impl RequestRegistry {
    /// Creates an empty registry.
    ///
    /// `max_backpressure` bounds buffered response bytes for
    /// [`try_end`](Self::try_end).
    pub fn new(max_backpressure: usize) -> Self {
        Self {
            requests: DashMap::new(),
            max_backpressure,
        }
    }

    /// Inserts a new request.
    ///
    /// Returns `false`, leaving the registry unchanged, if the id is taken.
    pub fn begin(&self, record: RequestRecord) -> bool {
        match self.requests.entry(record.id) {
            Entry::Occupied(_) => {
                warn!(request_id = %record.id, "Request id collision, request rejected");
                false
            }
            Entry::Vacant(slot) => {
                debug!(request_id = %record.id, method = %record.method, url = %record.url, "Request started");
                slot.insert(record);
                true
            }
        }
    }

    /// Returns `true` if the request is still in flight.
    pub fn has(&self, id: &RequestId) -> bool {
        self.requests.contains_key(id)
    }

    /// Number of in-flight requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Returns `true` if no request is in flight.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Runs `f` against a record if it exists.
    pub fn with_record<R>(&self, id: &RequestId, f: impl FnOnce(&RequestRecord) -> R) -> Option<R> {
        self.requests.get(id).map(|record| f(&record))
    }

    /// Copies one field into a caller buffer with a trailing NUL.
    ///
    /// Returns `None` if the request or header does not exist.
    pub fn copy_field(
        &self,
        id: &RequestId,
        field: RequestField<'_>,
        dest: &mut [u8],
    ) -> Option<BufferCopy> {
        let record = self.requests.get(id)?;
        let copy = match field {
            RequestField::Method => copy_nul_terminated(record.method.as_bytes(), dest),
            RequestField::Url => copy_nul_terminated(record.url.as_bytes(), dest),
            RequestField::Query => copy_nul_terminated(record.query.as_bytes(), dest),
            RequestField::Endpoint => copy_nul_terminated(record.route.as_bytes(), dest),
            RequestField::Header(name) => copy_nul_terminated(record.header(name)?, dest),
            RequestField::AllHeaders => copy_nul_terminated(record.headers_json().as_bytes(), dest),
        };
        Some(copy)
    }

    /// Queues a body chunk.
    pub fn write(&self, id: &RequestId, data: Bytes) -> ResponseStatus {
        let Some(record) = self.requests.get(id) else {
            return ResponseStatus::NoSuchRequest;
        };
        if record.response.write(data) {
            ResponseStatus::SentNotEnded
        } else {
            ResponseStatus::NoSuchRequest
        }
    }

    /// Queues a final chunk, ends the response and removes the request.
    pub fn end(&self, id: &RequestId, data: Bytes) -> ResponseStatus {
        let Some((_, record)) = self.requests.remove(id) else {
            return ResponseStatus::NoSuchRequest;
        };
        record.response.end(data);
        debug!(request_id = %id, written = record.response.queued(), "Response ended");
        ResponseStatus::SentAndEnded
    }

    /// Sends a chunk unless it would overflow the backpressure limit, and ends
    /// the response once `total_size` bytes have been accepted.
    ///
    /// On [`ResponseStatus::NotSent`] nothing was accepted and an
    /// HTTP_WRITABLE event follows once the buffered bytes drain.
    pub fn try_end(&self, id: &RequestId, data: Bytes, total_size: usize) -> ResponseStatus {
        let reached_total = {
            let Some(record) = self.requests.get(id) else {
                return ResponseStatus::NoSuchRequest;
            };
            let response = &record.response;
            let buffered = response.buffered();
            if buffered > 0 && buffered + data.len() > self.max_backpressure {
                if response.want_writable() {
                    debug!(request_id = %id, buffered, "Response backpressured");
                    return ResponseStatus::NotSent;
                }
                debug!(request_id = %id, "Response drained while backpressured, sending");
            }
            response.queued() + data.len() >= total_size
        };

        if reached_total {
            self.end(id, data)
        } else {
            self.write(id, data)
        }
    }

    /// Sets the status line of a response whose head is still pending.
    pub fn status(&self, id: &RequestId, line: &str) -> RequestStatus {
        self.requests
            .get(id)
            .map_or(RequestStatus::NoSuchRequest, |record| {
                record.response.set_status(line)
            })
    }

    /// Appends a header to a response whose head is still pending.
    pub fn header(&self, id: &RequestId, name: &str, value: &str) -> RequestStatus {
        self.requests
            .get(id)
            .map_or(RequestStatus::NoSuchRequest, |record| {
                record.response.set_header(name, value)
            })
    }

    /// Removes a request without attempting a response.
    ///
    /// Returns `true` if the request was still in flight.
    pub fn abort(&self, id: &RequestId) -> bool {
        self.requests.remove(id).is_some()
    }

    /// Answers every in-flight request with `status` (or closes its body if
    /// the head already went out) and empties the registry.
    pub fn abort_all(&self, status: StatusCode) -> usize {
        let ids: Vec<RequestId> = self.requests.iter().map(|entry| *entry.key()).collect();
        let mut aborted = 0;
        for id in ids {
            if let Some((_, record)) = self.requests.remove(&id) {
                record.response.abort_with(status);
                aborted += 1;
            }
        }
        if aborted > 0 {
            debug!(count = aborted, status = status.as_u16(), "Aborted pending requests");
        }
        aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ResponseChannels;

    fn record(method: &str, uri: &str) -> (RequestRecord, ResponseChannels) {
        let request = http::Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "text/plain")
            .header("X-Tag", "one")
            .header("x-tag", "two")
            .body(())
            .unwrap();
        let (parts, ()) = request.into_parts();
        let (response, channels) = ResponseHandle::channel();
        (
            RequestRecord::from_parts(RequestId::new(), &parts, "/items/:id", response),
            channels,
        )
    }

    #[test]
    fn test_record_from_parts() {
        let (record, _channels) = record("POST", "/items/7?sort=asc&page=2");
        assert_eq!(record.method(), "POST");
        assert_eq!(record.url(), "/items/7");
        assert_eq!(record.query(), "sort=asc&page=2");
        assert_eq!(record.route(), "/items/:id");
        assert_eq!(record.header("CONTENT-TYPE"), Some(&b"text/plain"[..]));
        assert_eq!(record.header("x-tag"), Some(&b"two"[..]));
        assert_eq!(record.headers().len(), 2);
    }

    #[test]
    fn test_headers_json() {
        let (record, _channels) = record("GET", "/");
        let parsed: serde_json::Value = serde_json::from_str(&record.headers_json()).unwrap();
        assert_eq!(parsed["content-type"], "text/plain");
        assert_eq!(parsed["x-tag"], "two");
    }

    #[test]
    fn test_header_keeps_obs_text_bytes() {
        let request = http::Request::builder()
            .uri("/")
            .header("x-name", HeaderValue::from_bytes(b"caf\xe9").unwrap())
            .body(())
            .unwrap();
        let (parts, ()) = request.into_parts();
        let (response, _channels) = ResponseHandle::channel();
        let record = RequestRecord::from_parts(RequestId::new(), &parts, "/", response);
        let id = record.id();

        assert_eq!(record.header("X-Name"), Some(&b"caf\xe9"[..]));
        let parsed: serde_json::Value = serde_json::from_str(&record.headers_json()).unwrap();
        assert_eq!(parsed["x-name"], "caf\u{fffd}");

        let registry = RequestRegistry::new(1024);
        registry.begin(record);
        let mut buf = [0u8; 8];
        let copy = registry
            .copy_field(&id, RequestField::Header("x-name"), &mut buf)
            .unwrap();
        assert_eq!(&buf[..copy.copied], b"caf\xe9");
        assert_eq!(buf[copy.copied], 0);
    }

    #[test]
    fn test_begin_rejects_collision() {
        let registry = RequestRegistry::new(1024);
        let (first, _a) = record("GET", "/");
        let id = first.id();
        assert!(registry.begin(first));

        let request = http::Request::builder().uri("/other").body(()).unwrap();
        let (parts, ()) = request.into_parts();
        let (response, _b) = ResponseHandle::channel();
        assert!(!registry.begin(RequestRecord::from_parts(id, &parts, "/other", response)));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.with_record(&id, |r| r.url().to_string()).unwrap(), "/");
    }

    #[test]
    fn test_unknown_id_statuses() {
        let registry = RequestRegistry::new(1024);
        let id = RequestId::new();
        assert_eq!(registry.write(&id, Bytes::new()), ResponseStatus::NoSuchRequest);
        assert_eq!(registry.end(&id, Bytes::new()), ResponseStatus::NoSuchRequest);
        assert_eq!(registry.try_end(&id, Bytes::new(), 0), ResponseStatus::NoSuchRequest);
        assert_eq!(registry.status(&id, "200 OK"), RequestStatus::NoSuchRequest);
        assert_eq!(registry.header(&id, "a", "b"), RequestStatus::NoSuchRequest);
        assert!(!registry.abort(&id));
        assert!(registry.copy_field(&id, RequestField::Method, &mut [0; 8]).is_none());
    }

    #[test]
    fn test_end_is_once() {
        let registry = RequestRegistry::new(1024);
        let (record, _channels) = record("GET", "/");
        let id = record.id();
        registry.begin(record);

        assert_eq!(registry.write(&id, Bytes::from_static(b"a")), ResponseStatus::SentNotEnded);
        assert_eq!(registry.end(&id, Bytes::from_static(b"b")), ResponseStatus::SentAndEnded);
        assert!(!registry.has(&id));
        assert_eq!(registry.end(&id, Bytes::new()), ResponseStatus::NoSuchRequest);
    }

    #[test]
    fn test_try_end_backpressure_and_completion() {
        let registry = RequestRegistry::new(4);
        let (record, _channels) = record("GET", "/");
        let id = record.id();
        registry.begin(record);

        assert_eq!(
            registry.try_end(&id, Bytes::from_static(b"abc"), 10),
            ResponseStatus::SentNotEnded
        );
        // 3 buffered + 3 more exceeds the 4-byte limit
        assert_eq!(
            registry.try_end(&id, Bytes::from_static(b"def"), 10),
            ResponseStatus::NotSent
        );
        assert!(registry.has(&id));
    }

    #[test]
    fn test_try_end_reaches_total() {
        let registry = RequestRegistry::new(1024);
        let (record, _channels) = record("GET", "/");
        let id = record.id();
        registry.begin(record);

        assert_eq!(
            registry.try_end(&id, Bytes::from_static(b"hello"), 5),
            ResponseStatus::SentAndEnded
        );
        assert!(!registry.has(&id));
    }

    #[test]
    fn test_status_and_header() {
        let registry = RequestRegistry::new(1024);
        let (record, _channels) = record("GET", "/");
        let id = record.id();
        registry.begin(record);

        assert_eq!(registry.status(&id, "404 Not Found"), RequestStatus::Ok);
        assert_eq!(registry.status(&id, "nope"), RequestStatus::InvalidValue);
        assert_eq!(registry.header(&id, "x-a", "1"), RequestStatus::Ok);
        registry.write(&id, Bytes::from_static(b"x"));
        assert_eq!(registry.status(&id, "200 OK"), RequestStatus::HeadersSent);
        assert_eq!(registry.header(&id, "x-b", "2"), RequestStatus::HeadersSent);
    }

    #[test]
    fn test_copy_field_truncation() {
        let registry = RequestRegistry::new(1024);
        let (record, _channels) = record("DELETE", "/items/123456");
        let id = record.id();
        registry.begin(record);

        let mut buf = [0u8; 32];
        let copy = registry.copy_field(&id, RequestField::Url, &mut buf).unwrap();
        assert!(copy.is_complete());
        assert_eq!(&buf[..copy.copied], b"/items/123456");
        assert_eq!(buf[copy.copied], 0);

        let mut small = [0u8; 4];
        let copy = registry.copy_field(&id, RequestField::Method, &mut small).unwrap();
        assert!(copy.truncated);
        assert_eq!(&small, b"DEL\0");

        assert!(registry
            .copy_field(&id, RequestField::Header("missing"), &mut buf)
            .is_none());
    }

    #[tokio::test]
    async fn test_abort_all_answers_pending_head() {
        let registry = RequestRegistry::new(1024);
        let (pending, pending_channels) = record("GET", "/");
        let (started, _started_channels) = record("GET", "/");
        let started_id = started.id();
        registry.begin(pending);
        registry.begin(started);
        registry.write(&started_id, Bytes::from_static(b"partial"));

        assert_eq!(registry.abort_all(StatusCode::SERVICE_UNAVAILABLE), 2);
        assert!(registry.is_empty());

        let head = pending_channels.head.await.unwrap();
        assert_eq!(head.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
