//! Request accumulation.
//!
//! [`RequestOptions`] is a partial request built up during the schema walk;
//! [`RequestOptions::into_request`] turns it into the final [`HttpRequest`].

use serde_json::{Map, Value};

use super::error::RequestError;
use super::path::merge_maps;

/// A partial outbound request. Later merges win on scalar conflicts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub base_url: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: Map<String, Value>,
    pub query: Map<String, Value>,
    pub body: Map<String, Value>,
}

impl RequestOptions {
    /// Parse a resolved partial request object.
    ///
    /// Recognised keys: `base_url` (or `baseURL`), `url`, `method`,
    /// `headers`, `query` (or `qs`), `body`. Unknown keys are rejected.
    pub fn from_value(value: &Value) -> Result<Self, RequestError> {
        let Value::Object(map) = value else {
            return Err(RequestError::InvalidRouting(format!(
                "request override must be an object, got {value}"
            )));
        };

        let mut options = Self::default();
        for (key, v) in map {
            match key.as_str() {
                "base_url" | "baseURL" => options.base_url = Some(string_field(key, v)?),
                "url" => options.url = Some(string_field(key, v)?),
                "method" => options.method = Some(string_field(key, v)?.to_uppercase()),
                "headers" => options.headers = object_field(key, v)?,
                "query" | "qs" => options.query = object_field(key, v)?,
                "body" => options.body = object_field(key, v)?,
                other => {
                    return Err(RequestError::InvalidRouting(format!(
                        "unknown request option '{other}'"
                    )));
                }
            }
        }
        Ok(options)
    }

    /// Merge `other` into `self`.
    pub fn merge(&mut self, other: RequestOptions) {
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.url.is_some() {
            self.url = other.url;
        }
        if other.method.is_some() {
            self.method = other.method;
        }
        merge_maps(&mut self.headers, other.headers);
        merge_maps(&mut self.query, other.query);
        merge_maps(&mut self.body, other.body);
    }

    /// Mutable access to the query or body map.
    pub fn target_mut(&mut self, target: super::schema::SendTarget) -> &mut Map<String, Value> {
        match target {
            super::schema::SendTarget::Query => &mut self.query,
            super::schema::SendTarget::Body => &mut self.body,
        }
    }

    /// Finalise: join the URL, default the method to GET, and drop an empty
    /// query or body.
    pub fn into_request(self) -> Result<HttpRequest, RequestError> {
        let url = match (self.base_url, self.url) {
            (Some(base), Some(path)) if !is_absolute(&path) => {
                format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
            }
            (_, Some(url)) => url,
            (Some(base), None) => base,
            (None, None) => {
                return Err(RequestError::InvalidRouting(
                    "no url configured for request".to_string(),
                ));
            }
        };

        let headers = self
            .headers
            .into_iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, value)
            })
            .collect();

        Ok(HttpRequest {
            method: self.method.unwrap_or_else(|| "GET".to_string()),
            url,
            headers,
            query: (!self.query.is_empty()).then_some(self.query),
            body: (!self.body.is_empty()).then(|| Value::Object(self.body)),
        })
    }
}

fn is_absolute(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn string_field(key: &str, value: &Value) -> Result<String, RequestError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(RequestError::InvalidRouting(format!(
            "request option '{key}' must be a string, got {other}"
        ))),
    }
}

fn object_field(key: &str, value: &Value) -> Result<Map<String, Value>, RequestError> {
    match value {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        other => Err(RequestError::InvalidRouting(format!(
            "request option '{key}' must be an object, got {other}"
        ))),
    }
}

/// A fully assembled outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// `None` when no query parameters were accumulated.
    pub query: Option<Map<String, Value>>,
    /// `None` when no body fields were accumulated.
    pub body: Option<Value>,
}

impl HttpRequest {
    /// Query parameters flattened to string pairs; arrays repeat the key.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (key, value) in self.query.iter().flatten() {
            match value {
                Value::Array(items) => {
                    pairs.extend(items.iter().map(|v| (key.clone(), scalar_string(v))));
                }
                Value::Null => {}
                other => pairs.push((key.clone(), scalar_string(other))),
            }
        }
        pairs
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_value_accepts_aliases() {
        let options = RequestOptions::from_value(&json!({
            "baseURL": "https://api.example.com",
            "method": "post",
            "qs": { "a": 1 }
        }))
        .unwrap();
        assert_eq!(options.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(options.method.as_deref(), Some("POST"));
        assert_eq!(options.query.get("a"), Some(&json!(1)));
    }

    #[test]
    fn from_value_rejects_unknown_keys() {
        let err = RequestOptions::from_value(&json!({ "timeout": 5 })).unwrap_err();
        assert!(matches!(err, RequestError::InvalidRouting(_)));
    }

    #[test]
    fn merge_deep_merges_maps_and_overrides_scalars() {
        let mut base = RequestOptions::from_value(&json!({
            "url": "/users",
            "query": { "filter": { "a": 1 } }
        }))
        .unwrap();
        base.merge(
            RequestOptions::from_value(&json!({
                "url": "/accounts",
                "query": { "filter": { "b": 2 } }
            }))
            .unwrap(),
        );
        assert_eq!(base.url.as_deref(), Some("/accounts"));
        assert_eq!(
            Value::Object(base.query),
            json!({ "filter": { "a": 1, "b": 2 } })
        );
    }

    #[test]
    fn into_request_omits_empty_query_and_body() {
        let request = RequestOptions {
            base_url: Some("https://api.example.com/".to_string()),
            url: Some("/users".to_string()),
            ..RequestOptions::default()
        }
        .into_request()
        .unwrap();
        assert_eq!(request.url, "https://api.example.com/users");
        assert_eq!(request.method, "GET");
        assert!(request.query.is_none());
        assert!(request.body.is_none());
    }

    #[test]
    fn into_request_keeps_absolute_url() {
        let request = RequestOptions {
            base_url: Some("https://api.example.com".to_string()),
            url: Some("https://other.example.com/x".to_string()),
            ..RequestOptions::default()
        }
        .into_request()
        .unwrap();
        assert_eq!(request.url, "https://other.example.com/x");
    }

    #[test]
    fn into_request_requires_url() {
        assert!(RequestOptions::default().into_request().is_err());
    }

    #[test]
    fn query_pairs_repeat_array_keys() {
        let mut options = RequestOptions {
            url: Some("https://x".to_string()),
            ..RequestOptions::default()
        };
        options.query.insert("tag".to_string(), json!(["a", "b"]));
        options.query.insert("limit".to_string(), json!(5));
        let pairs = options.into_request().unwrap().query_pairs();
        assert_eq!(
            pairs,
            vec![
                ("limit".to_string(), "5".to_string()),
                ("tag".to_string(), "a".to_string()),
                ("tag".to_string(), "b".to_string()),
            ]
        );
    }
}
