use std::collections::HashMap;

use serde::de::DeserializeOwned;

use crate::{ErrorCategory, StructuredError};

/// Response body after content-type driven parsing.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedBody {
    /// Body declared as JSON (`application/json` or `*+json`).
    Json(serde_json::Value),
    /// Any other body, as text.
    Text(String),
}

impl ParsedBody {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(_) => None,
        }
    }
}

/// Terminal outcome of one [`crate::ResilientClient::request`] call.
///
/// Holds either a body or an error, never both; [`RequestResult::ok`] is
/// derived from which one is present.
#[derive(Clone, Debug)]
pub struct RequestResult {
    method: String,
    url: String,
    status_code: u16,
    headers: HashMap<String, String>,
    outcome: Result<ParsedBody, StructuredError>,
    attempts: u32,
}

impl RequestResult {
    pub(crate) fn success(
        method: &str,
        sanitized_url: &str,
        status_code: u16,
        headers: HashMap<String, String>,
        body: ParsedBody,
        attempts: u32,
    ) -> Self {
        Self {
            method: method.to_owned(),
            url: sanitized_url.to_owned(),
            status_code,
            headers,
            outcome: Ok(body),
            attempts,
        }
    }

    pub(crate) fn failure(
        headers: HashMap<String, String>,
        error: StructuredError,
        attempts: u32,
    ) -> Self {
        Self {
            method: error.method.clone(),
            url: error.url.clone(),
            status_code: error.http_status.unwrap_or(0),
            headers,
            outcome: Err(error),
            attempts,
        }
    }

    pub fn ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// HTTP status of the final response; `0` when none was received.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Response headers with lower-cased names. Repeated headers are joined
    /// with `", "`.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn body(&self) -> Option<&ParsedBody> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&StructuredError> {
        self.outcome.as_ref().err()
    }

    /// Number of network attempts made for this call.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Sanitized URL the call was made against.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn into_result(self) -> Result<ParsedBody, StructuredError> {
        self.outcome
    }

    /// Deserializes a JSON body into `T`. A text body or a shape mismatch is
    /// reported as [`ErrorCategory::DeserializationFailure`].
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, StructuredError> {
        let body = self.outcome.as_ref().map_err(Clone::clone)?;
        let mismatch = |summary: String| {
            StructuredError::new(
                ErrorCategory::DeserializationFailure,
                self.method.as_str(),
                self.url.as_str(),
                summary,
            )
            .with_status(self.status_code)
        };

        match body {
            ParsedBody::Json(value) => T::deserialize(value)
                .map_err(|err| mismatch(format!("response JSON has unexpected shape: {err}"))),
            ParsedBody::Text(_) => Err(mismatch("response body is not JSON".to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde::Deserialize;
    use serde_json::json;

    use super::{ParsedBody, RequestResult};
    use crate::{ErrorCategory, StructuredError};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
    }

    fn success(body: ParsedBody) -> RequestResult {
        let headers = HashMap::from([("content-type".to_owned(), "application/json".to_owned())]);
        RequestResult::success("GET", "http://h/items", 200, headers, body, 1)
    }

    #[test]
    fn success_has_body_and_no_error() {
        let result = success(ParsedBody::Json(json!({"id": 1})));
        assert!(result.ok());
        assert!(result.error().is_none());
        assert_eq!(result.header("Content-Type"), Some("application/json"));
        assert_eq!(result.json::<Item>().expect("typed body"), Item { id: 1 });
    }

    #[test]
    fn failure_has_error_and_no_body() {
        let error = StructuredError::new(ErrorCategory::ClientError, "GET", "http://h/", "404")
            .with_status(404);
        let result = RequestResult::failure(HashMap::new(), error.clone(), 1);
        assert!(!result.ok());
        assert!(result.body().is_none());
        assert_eq!(result.status_code(), 404);
        assert_eq!(result.into_result(), Err(error));
    }

    #[test]
    fn typed_json_mismatch_is_deserialization_failure() {
        let result = success(ParsedBody::Json(json!({"id": "nope"})));
        let err = result.json::<Item>().expect_err("shape mismatch");
        assert_eq!(err.category, ErrorCategory::DeserializationFailure);
        assert_eq!(err.http_status, Some(200));

        let result = success(ParsedBody::Text("plain".to_owned()));
        let err = result.json::<Item>().expect_err("not json");
        assert_eq!(err.category, ErrorCategory::DeserializationFailure);
    }
}
