use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// HTTP-style verb of a request, shared by both transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
            Verb::Head => "HEAD",
        }
    }

    /// Whether this verb may carry a request body.
    pub fn encloses_entity(&self) -> bool {
        matches!(self, Verb::Post | Verb::Put | Verb::Patch | Verb::Delete)
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An abstract request against a tenant/fabric, independent of transport.
///
/// `tenant` and `database` may be empty, in which case the corresponding
/// URL segment is omitted. Query parameter names are unique; insertion
/// order is irrelevant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub tenant: String,
    pub database: String,
    pub verb: Verb,
    pub path: String,
    pub query_params: HashMap<String, String>,
    pub header_params: Vec<(String, String)>,
    #[serde(with = "serde_bytes")]
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(
        tenant: impl Into<String>,
        database: impl Into<String>,
        verb: Verb,
        path: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            database: database.into(),
            verb,
            path: path.into(),
            query_params: HashMap::new(),
            header_params: Vec::new(),
            body: None,
        }
    }

    /// Adds a query parameter. `None` values are dropped, so optional
    /// parameters can be passed through unconditionally.
    pub fn query_param(mut self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        if let Some(value) = value {
            self.query_params.insert(key.into(), value.to_string());
        }
        self
    }

    pub fn header_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header_params.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }
}
