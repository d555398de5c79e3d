use crate::ParsedBody;

/// Whether a `Content-Type` value declares a JSON body.
pub(crate) fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

/// Parses a response body according to its declared content type.
///
/// An empty body is always `Text("")`. A body declared as JSON that fails to
/// parse is an error.
pub(crate) fn parse_body(
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<ParsedBody, serde_json::Error> {
    if bytes.is_empty() {
        return Ok(ParsedBody::Text(String::new()));
    }
    if content_type.is_some_and(is_json_content_type) {
        return serde_json::from_slice(bytes).map(ParsedBody::Json);
    }
    Ok(ParsedBody::Text(String::from_utf8_lossy(bytes).into_owned()))
}
