use serde::{Deserialize, Serialize};

/// A decoded server response.
///
/// `meta` preserves the header order seen on the wire. `body` is `None`
/// when the server returned no content, never an empty buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub code: u16,
    pub meta: Vec<(String, String)>,
    #[serde(with = "serde_bytes")]
    pub body: Option<Vec<u8>>,
}

impl Response {
    pub fn new(code: u16) -> Self {
        Self {
            code,
            meta: Vec::new(),
            body: None,
        }
    }

    pub fn with_body(code: u16, body: Vec<u8>) -> Self {
        Self {
            code,
            meta: Vec::new(),
            body: Some(body),
        }
    }

    /// Case-insensitive header lookup. Returns the first match in wire order.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.meta
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut response = Response::new(200);
        response
            .meta
            .push(("Content-Type".to_string(), "application/json".to_string()));
        response
            .meta
            .push(("Keep-Alive".to_string(), "timeout=5".to_string()));

        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("KEEP-ALIVE"), Some("timeout=5"));
        assert_eq!(response.header("x-missing"), None);
    }

    #[test]
    fn test_success_codes() {
        assert!(Response::new(200).is_success());
        assert!(Response::new(202).is_success());
        assert!(!Response::new(404).is_success());
        assert!(!Response::new(500).is_success());
    }
}
