//! Standardized extraction from client-specific error shapes.
//!
//! HTTP client libraries disagree about where a failure keeps its status,
//! body, and error code. This module probes those shapes (as loosely typed
//! JSON values) and produces one canonical record per error, independent of
//! which client raised it.

use serde::Serialize;
use serde_json::Value;
use std::fmt::{self, Display, Formatter};

use crate::classify::{
    classify_error, is_retryable_error, Classification, CANCELLED_CODES, NETWORK_CODES,
    TIMEOUT_CODES,
};

/// The client library an error was recognized as coming from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientType {
    /// Axios-shaped (`isAxiosError` marker).
    Axios,
    /// WHATWG fetch-shaped (thrown `Response` or `TypeError` failure).
    Fetch,
    /// Got-shaped (`HTTPError`/`RequestError` with `options`).
    Got,
    /// Undici-shaped (`UND_ERR_*` codes).
    Undici,
    /// node-fetch-shaped (`FetchError`).
    NodeFetch,
    /// No recognizable client markers.
    Generic,
    /// Matched by a registered custom extractor.
    Custom(String),
}

impl Display for ClientType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ClientType::Axios => write!(f, "axios"),
            ClientType::Fetch => write!(f, "fetch"),
            ClientType::Got => write!(f, "got"),
            ClientType::Undici => write!(f, "undici"),
            ClientType::NodeFetch => write!(f, "node-fetch"),
            ClientType::Generic => write!(f, "generic"),
            ClientType::Custom(name) => write!(f, "{}", name),
        }
    }
}

impl Serialize for ClientType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The canonical record produced for every extracted error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardizedError {
    /// The error value the record was extracted from.
    pub original_error: Value,
    /// Best available human-readable message.
    pub message: String,
    /// HTTP status, observed or synthesized from the error code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Request method, uppercased.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Request URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Response headers, when the client exposes them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,
    /// Response body, when the client exposes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Transport-level error code (`ECONNREFUSED`, `UND_ERR_SOCKET`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Semantic classification.
    pub classification: Classification,
    /// Whether the default retry policy considers this error transient.
    pub is_retryable: bool,
    /// Which client the error was recognized as.
    pub client_type: ClientType,
}

/// A capability that recognizes and extracts one family of error shapes.
pub trait ErrorExtractor: Send + Sync {
    /// Unique name of this extractor within a registry.
    fn name(&self) -> &str;

    /// Whether this extractor recognizes the error shape.
    fn can_handle(&self, error: &Value) -> bool;

    /// Produces the standardized record. Only called after [`can_handle`]
    /// returned true for the same error.
    ///
    /// [`can_handle`]: ErrorExtractor::can_handle
    fn extract(&self, error: &Value) -> StandardizedError;
}

const FALLBACK_MESSAGE: &str = "Unknown error";

/// Body fields tried, in order, when mining a response body for a message.
const BODY_MESSAGE_FIELDS: &[&str] = &["message", "error", "detail", "msg", "errorMessage"];

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn status_field(value: &Value, key: &str) -> Option<u16> {
    value
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|s| u16::try_from(s).ok())
}

/// Mines a response body for the most specific message it carries.
fn message_from_body(body: &Value) -> Option<String> {
    for key in BODY_MESSAGE_FIELDS {
        if let Some(text) = str_field(body, key) {
            return Some(text.to_string());
        }
    }
    // Nested `error.message` comes last.
    body.get("error")
        .and_then(|e| str_field(e, "message"))
        .map(str::to_string)
}

fn own_message(error: &Value) -> Option<String> {
    match error {
        Value::String(text) => Some(text.clone()),
        _ => str_field(error, "message").map(str::to_string),
    }
}

/// Synthesizes a status code for request-made-but-no-response failures.
fn synthesized_status(code: &str) -> Option<u16> {
    if TIMEOUT_CODES.contains(&code) {
        Some(408)
    } else if NETWORK_CODES.contains(&code) {
        Some(503)
    } else if CANCELLED_CODES.contains(&code) {
        Some(499)
    } else {
        None
    }
}

fn error_code_of(error: &Value) -> Option<String> {
    match error.get("code") {
        Some(Value::String(code)) => Some(code.clone()),
        Some(Value::Number(code)) => Some(code.to_string()),
        _ => error
            .get("cause")
            .and_then(|cause| str_field(cause, "code"))
            .map(str::to_string),
    }
}

fn uppercased(method: &str) -> String {
    method.to_ascii_uppercase()
}

#[allow(clippy::too_many_arguments)]
fn finish(
    error: &Value,
    message: Option<String>,
    status_code: Option<u16>,
    method: Option<String>,
    url: Option<String>,
    headers: Option<Value>,
    body: Option<Value>,
    error_code: Option<String>,
    client_type: ClientType,
) -> StandardizedError {
    let classification = classify_error(status_code, error_code.as_deref());
    StandardizedError {
        original_error: error.clone(),
        message: message.unwrap_or_else(|| FALLBACK_MESSAGE.to_string()),
        status_code,
        method,
        url,
        headers,
        body,
        error_code,
        classification,
        is_retryable: is_retryable_error(classification, status_code),
        client_type,
    }
}

/// Detects which client produced an error from its shape alone.
pub fn detect_client_type(error: &Value) -> ClientType {
    if error.get("isAxiosError") == Some(&Value::Bool(true)) {
        return ClientType::Axios;
    }

    let name = str_field(error, "name");
    let code = str_field(error, "code");
    let cause_code = error.get("cause").and_then(|cause| str_field(cause, "code"));

    if name == Some("FetchError") {
        return ClientType::NodeFetch;
    }

    if matches!(
        name,
        Some("HTTPError") | Some("RequestError") | Some("MaxRedirectsError")
    ) && error.get("options").is_some()
    {
        return ClientType::Got;
    }

    let undici_code =
        |c: Option<&str>| c.is_some_and(|c| c.starts_with("UND_ERR"));
    if undici_code(code) || undici_code(cause_code) {
        return ClientType::Undici;
    }

    // Native fetch either throws the Response object or a TypeError whose
    // message mentions fetch ("fetch failed", "Failed to fetch").
    let response_shaped = error.get("status").is_some()
        && error.get("ok").is_some()
        && error.get("statusText").is_some();
    let fetch_type_error = name == Some("TypeError")
        && str_field(error, "message").is_some_and(|m| m.to_ascii_lowercase().contains("fetch"));
    if response_shaped || fetch_type_error {
        return ClientType::Fetch;
    }

    ClientType::Generic
}

/// Axios: `response.{status,data,headers}` on responses, `request` plus a
/// code when the request never completed, `config.{method,url}` throughout.
pub struct AxiosExtractor;

impl ErrorExtractor for AxiosExtractor {
    fn name(&self) -> &str {
        "axios"
    }

    fn can_handle(&self, error: &Value) -> bool {
        detect_client_type(error) == ClientType::Axios
    }

    fn extract(&self, error: &Value) -> StandardizedError {
        let code = error_code_of(error);
        let config = error.get("config");
        let method = config
            .and_then(|c| str_field(c, "method"))
            .map(uppercased);
        let url = config.and_then(|c| str_field(c, "url")).map(str::to_string);

        if let Some(response) = error.get("response").filter(|r| !r.is_null()) {
            let status = status_field(response, "status");
            let body = response.get("data").cloned();
            let headers = response.get("headers").cloned();
            let message = body
                .as_ref()
                .and_then(message_from_body)
                .or_else(|| own_message(error));
            return finish(
                error,
                message,
                status,
                method,
                url,
                headers,
                body,
                code,
                ClientType::Axios,
            );
        }

        // Request made, no response: synthesize a status from the code.
        let status = code.as_deref().and_then(synthesized_status);
        finish(
            error,
            own_message(error),
            status,
            method,
            url,
            None,
            None,
            code,
            ClientType::Axios,
        )
    }
}

/// WHATWG fetch: thrown `Response` objects and `TypeError` network failures.
pub struct FetchExtractor;

impl ErrorExtractor for FetchExtractor {
    fn name(&self) -> &str {
        "fetch"
    }

    fn can_handle(&self, error: &Value) -> bool {
        detect_client_type(error) == ClientType::Fetch
    }

    fn extract(&self, error: &Value) -> StandardizedError {
        let url = str_field(error, "url").map(str::to_string);

        if let Some(status) = status_field(error, "status") {
            // A thrown Response: statusText is the only message on offer
            // unless the caller attached a parsed body.
            let body = error.get("body").cloned().filter(|b| !b.is_null());
            let message = body
                .as_ref()
                .and_then(message_from_body)
                .or_else(|| str_field(error, "statusText").map(str::to_string));
            let headers = error.get("headers").cloned().filter(|h| !h.is_null());
            return finish(
                error,
                message,
                Some(status),
                None,
                url,
                headers,
                body,
                None,
                ClientType::Fetch,
            );
        }

        let code = error_code_of(error);
        let status = code.as_deref().and_then(synthesized_status);
        finish(
            error,
            own_message(error),
            status,
            None,
            url,
            None,
            None,
            code,
            ClientType::Fetch,
        )
    }
}

/// Got: `response.{statusCode,body}` plus `options.{method,url}`; body may
/// arrive as an unparsed JSON string.
pub struct GotExtractor;

impl ErrorExtractor for GotExtractor {
    fn name(&self) -> &str {
        "got"
    }

    fn can_handle(&self, error: &Value) -> bool {
        detect_client_type(error) == ClientType::Got
    }

    fn extract(&self, error: &Value) -> StandardizedError {
        let code = error_code_of(error);
        let options = error.get("options");
        let method = options.and_then(|o| str_field(o, "method")).map(uppercased);
        let url = options.and_then(|o| str_field(o, "url")).map(str::to_string);

        if let Some(response) = error.get("response").filter(|r| !r.is_null()) {
            let status = status_field(response, "statusCode");
            let body = response.get("body").cloned().map(|b| match b {
                Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
                other => other,
            });
            let headers = response.get("headers").cloned();
            let message = body
                .as_ref()
                .and_then(message_from_body)
                .or_else(|| own_message(error));
            return finish(
                error,
                message,
                status,
                method,
                url,
                headers,
                body,
                code,
                ClientType::Got,
            );
        }

        let status = code.as_deref().and_then(synthesized_status);
        finish(
            error,
            own_message(error),
            status,
            method,
            url,
            None,
            None,
            code,
            ClientType::Got,
        )
    }
}

/// Undici: `UND_ERR_*` codes, sometimes a `statusCode` and `body` on
/// response-status errors, with codes possibly one level down the cause
/// chain.
pub struct UndiciExtractor;

impl ErrorExtractor for UndiciExtractor {
    fn name(&self) -> &str {
        "undici"
    }

    fn can_handle(&self, error: &Value) -> bool {
        detect_client_type(error) == ClientType::Undici
    }

    fn extract(&self, error: &Value) -> StandardizedError {
        let code = error_code_of(error);
        let status = status_field(error, "statusCode")
            .or_else(|| code.as_deref().and_then(synthesized_status));
        let body = error.get("body").cloned().filter(|b| !b.is_null());
        let headers = error.get("headers").cloned().filter(|h| !h.is_null());
        let message = body
            .as_ref()
            .and_then(message_from_body)
            .or_else(|| own_message(error));
        finish(
            error,
            message,
            status,
            None,
            None,
            headers,
            body,
            code,
            ClientType::Undici,
        )
    }
}

/// node-fetch: `FetchError` with a transport code and never a response.
pub struct NodeFetchExtractor;

impl ErrorExtractor for NodeFetchExtractor {
    fn name(&self) -> &str {
        "node-fetch"
    }

    fn can_handle(&self, error: &Value) -> bool {
        detect_client_type(error) == ClientType::NodeFetch
    }

    fn extract(&self, error: &Value) -> StandardizedError {
        let code = error_code_of(error);
        let status = code.as_deref().and_then(synthesized_status);
        finish(
            error,
            own_message(error),
            status,
            None,
            str_field(error, "url").map(str::to_string),
            None,
            None,
            code,
            ClientType::NodeFetch,
        )
    }
}

/// Fallback for unrecognized shapes: probes the common spots.
pub struct GenericExtractor;

impl ErrorExtractor for GenericExtractor {
    fn name(&self) -> &str {
        "generic"
    }

    fn can_handle(&self, _error: &Value) -> bool {
        true
    }

    fn extract(&self, error: &Value) -> StandardizedError {
        let response = error.get("response").filter(|r| !r.is_null());
        let status = status_field(error, "status")
            .or_else(|| status_field(error, "statusCode"))
            .or_else(|| response.and_then(|r| status_field(r, "status")))
            .or_else(|| response.and_then(|r| status_field(r, "statusCode")));
        let code = error_code_of(error);
        let status = status.or_else(|| code.as_deref().and_then(synthesized_status));

        let body = response
            .and_then(|r| r.get("data").or_else(|| r.get("body")))
            .or_else(|| error.get("body"))
            .cloned()
            .filter(|b| !b.is_null());

        let url = str_field(error, "url")
            .or_else(|| error.get("config").and_then(|c| str_field(c, "url")))
            .or_else(|| error.get("options").and_then(|o| str_field(o, "url")))
            .map(str::to_string);
        let method = str_field(error, "method")
            .or_else(|| error.get("config").and_then(|c| str_field(c, "method")))
            .or_else(|| error.get("options").and_then(|o| str_field(o, "method")))
            .map(uppercased);

        let message = body
            .as_ref()
            .and_then(message_from_body)
            .or_else(|| own_message(error));

        finish(
            error, message, status, method, url, None, body, code,
            ClientType::Generic,
        )
    }
}

/// Runs the built-in detection and extraction path.
pub(crate) fn builtin_extract(error: &Value) -> StandardizedError {
    match detect_client_type(error) {
        ClientType::Axios => AxiosExtractor.extract(error),
        ClientType::Fetch => FetchExtractor.extract(error),
        ClientType::Got => GotExtractor.extract(error),
        ClientType::Undici => UndiciExtractor.extract(error),
        ClientType::NodeFetch => NodeFetchExtractor.extract(error),
        _ => GenericExtractor.extract(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_axios_marker() {
        let err = json!({"isAxiosError": true, "message": "boom"});
        assert_eq!(detect_client_type(&err), ClientType::Axios);
    }

    #[test]
    fn detects_got_by_name_and_options() {
        let err = json!({"name": "HTTPError", "options": {"url": "/x"}});
        assert_eq!(detect_client_type(&err), ClientType::Got);
        // Name alone is not enough.
        let bare = json!({"name": "HTTPError"});
        assert_eq!(detect_client_type(&bare), ClientType::Generic);
    }

    #[test]
    fn detects_undici_through_cause_chain() {
        let err = json!({"message": "fetch failed", "name": "TypeError",
            "cause": {"code": "UND_ERR_CONNECT_TIMEOUT"}});
        assert_eq!(detect_client_type(&err), ClientType::Undici);
    }

    #[test]
    fn detects_node_fetch_and_fetch() {
        let nf = json!({"name": "FetchError", "code": "ECONNREFUSED",
            "message": "request to http://x failed"});
        assert_eq!(detect_client_type(&nf), ClientType::NodeFetch);

        let response = json!({"status": 502, "ok": false, "statusText": "Bad Gateway"});
        assert_eq!(detect_client_type(&response), ClientType::Fetch);

        let type_error = json!({"name": "TypeError", "message": "Failed to fetch"});
        assert_eq!(detect_client_type(&type_error), ClientType::Fetch);
    }

    #[test]
    fn axios_response_extraction() {
        let err = json!({
            "isAxiosError": true,
            "response": {"status": 500, "data": {"message": "x"}},
            "config": {"url": "/u", "method": "get"}
        });
        let std_err = AxiosExtractor.extract(&err);
        assert_eq!(std_err.status_code, Some(500));
        assert_eq!(std_err.message, "x");
        assert_eq!(std_err.classification, Classification::Server);
        assert!(std_err.is_retryable);
        assert_eq!(std_err.client_type, ClientType::Axios);
        assert_eq!(std_err.method.as_deref(), Some("GET"));
        assert_eq!(std_err.url.as_deref(), Some("/u"));
    }

    #[test]
    fn axios_no_response_synthesizes_status() {
        let err = json!({
            "isAxiosError": true,
            "code": "ECONNREFUSED",
            "message": "connect ECONNREFUSED",
            "request": {},
            "config": {"url": "/u", "method": "post"}
        });
        let std_err = AxiosExtractor.extract(&err);
        assert_eq!(std_err.status_code, Some(503));
        assert_eq!(std_err.classification, Classification::Network);
        assert!(std_err.is_retryable);
        assert_eq!(std_err.method.as_deref(), Some("POST"));
    }

    #[test]
    fn got_parses_string_bodies() {
        let err = json!({
            "name": "HTTPError",
            "message": "Response code 422",
            "options": {"url": "https://api/x", "method": "put"},
            "response": {"statusCode": 422, "body": "{\"error\":\"bad field\"}"}
        });
        let std_err = GotExtractor.extract(&err);
        assert_eq!(std_err.status_code, Some(422));
        assert_eq!(std_err.message, "bad field");
        assert_eq!(std_err.classification, Classification::Validation);
        assert!(!std_err.is_retryable);
        assert_eq!(std_err.method.as_deref(), Some("PUT"));
    }

    #[test]
    fn undici_timeout_synthesizes_408() {
        let err = json!({"code": "UND_ERR_CONNECT_TIMEOUT", "message": "connect timeout"});
        let std_err = UndiciExtractor.extract(&err);
        assert_eq!(std_err.status_code, Some(408));
        assert_eq!(std_err.classification, Classification::Timeout);
        assert!(std_err.is_retryable);
    }

    #[test]
    fn node_fetch_dns_failure() {
        let err = json!({
            "name": "FetchError",
            "code": "ENOTFOUND",
            "message": "request to http://nowhere failed"
        });
        let std_err = NodeFetchExtractor.extract(&err);
        assert_eq!(std_err.status_code, Some(503));
        assert_eq!(std_err.classification, Classification::Network);
    }

    #[test]
    fn fetch_thrown_response() {
        let err = json!({"status": 429, "ok": false, "statusText": "Too Many Requests",
            "url": "https://api/limited"});
        let std_err = FetchExtractor.extract(&err);
        assert_eq!(std_err.status_code, Some(429));
        assert_eq!(std_err.message, "Too Many Requests");
        assert_eq!(std_err.classification, Classification::RateLimit);
        assert!(std_err.is_retryable);
        assert_eq!(std_err.url.as_deref(), Some("https://api/limited"));
    }

    #[test]
    fn generic_probes_common_spots() {
        let err = json!({"statusCode": 404, "message": "gone"});
        let std_err = GenericExtractor.extract(&err);
        assert_eq!(std_err.status_code, Some(404));
        assert_eq!(std_err.classification, Classification::NotFound);
        assert!(!std_err.is_retryable);

        let bare = json!("plain failure");
        let std_err = GenericExtractor.extract(&bare);
        assert_eq!(std_err.message, "plain failure");
        assert_eq!(std_err.classification, Classification::Unknown);
    }

    #[test]
    fn body_message_mining_order() {
        assert_eq!(
            message_from_body(&json!({"msg": "third", "message": "first"})),
            Some("first".to_string())
        );
        assert_eq!(
            message_from_body(&json!({"detail": "d", "error": "e"})),
            Some("e".to_string())
        );
        assert_eq!(
            message_from_body(&json!({"error": {"message": "nested"}})),
            Some("nested".to_string())
        );
        assert_eq!(message_from_body(&json!({"unrelated": 1})), None);
    }

    #[test]
    fn round_trip_status_matches_classifier() {
        let shapes = [
            json!({"isAxiosError": true, "response": {"status": 503, "data": {}},
                "config": {}}),
            json!({"name": "HTTPError", "options": {}, "response": {"statusCode": 503}}),
            json!({"status": 503, "ok": false, "statusText": "Service Unavailable"}),
            json!({"code": "UND_ERR_SOCKET", "statusCode": 503}),
            json!({"statusCode": 503}),
        ];
        for shape in &shapes {
            let std_err = builtin_extract(shape);
            assert_eq!(std_err.status_code, Some(503), "shape {shape}");
            assert_eq!(
                std_err.classification,
                classify_error(Some(503), std_err.error_code.as_deref()),
                "shape {shape}"
            );
        }
    }
}
