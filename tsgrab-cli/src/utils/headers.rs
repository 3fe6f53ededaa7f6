use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::info;

use crate::error::AppError;

/// Parse a header string in format "Name: Value" and add it to the HeaderMap
pub fn parse_and_add_header(headers: &mut HeaderMap, header_str: &str) {
    // Find the first colon which separates name and value
    let Some(colon_pos) = header_str.find(':') else {
        tracing::warn!(
            "Invalid header format: '{}'. Expected 'Name: Value'",
            header_str
        );
        return;
    };

    let name = header_str[..colon_pos].trim();
    let value = header_str[colon_pos + 1..].trim();
    insert_header(headers, name, value);
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
        tracing::warn!("Invalid header name: '{}'", name);
        return;
    };

    let Ok(header_value) = HeaderValue::from_str(value) else {
        tracing::warn!("Invalid header value: '{}'", value);
        return;
    };

    info!("Adding header: {}: {}", name, value);
    headers.insert(header_name, header_value);
}

/// Parse a collection of header strings and return a HeaderMap
pub fn parse_headers(header_strings: &[String]) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for header_str in header_strings {
        parse_and_add_header(&mut headers, header_str);
    }

    headers
}

/// Parse a JSON object of string values, e.g. `{"Referer": "https://a/"}`.
pub fn parse_json_headers(json: &str) -> Result<HeaderMap, AppError> {
    let map: HashMap<String, String> =
        serde_json::from_str(json).map_err(|e| AppError::InvalidHeader(e.to_string()))?;

    let mut headers = HeaderMap::new();
    for (name, value) in &map {
        insert_header(&mut headers, name, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers_skips_malformed() {
        let headers = parse_headers(&[
            "Referer: http://h/a:b".to_string(),
            "no-colon".to_string(),
            "Bad Name: x".to_string(),
        ]);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["referer"], "http://h/a:b");
    }

    #[test]
    fn test_parse_json_headers() {
        let headers = parse_json_headers(r#"{"User-Agent":"tsgrab","Cookie":"a=b"}"#).unwrap();
        assert_eq!(headers["user-agent"], "tsgrab");
        assert_eq!(headers["cookie"], "a=b");

        assert!(matches!(
            parse_json_headers("[1,2]"),
            Err(AppError::InvalidHeader(_))
        ));
        assert!(matches!(
            parse_json_headers(r#"{"a": 1}"#),
            Err(AppError::InvalidHeader(_))
        ));
    }
}
