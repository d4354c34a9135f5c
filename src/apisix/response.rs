//! Admin API response envelopes.
//!
//! Accepted shapes:
//! - item: `{"action": "...", "node": {"key": "...", "value": {...}}}` or a bare
//!   `{"key": "...", "value": {...}}`
//! - list: `{"count": n, "node": {"key": "...", "items" | "nodes": [{key, value}]}}`
//!   or `{"total": n, "list": [{key, value}]}`

use serde::Deserialize;
use serde_json::Value;

use crate::core::error::{ControllerError, ControllerResult};

/// One `{key, value}` pair
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

impl Node {
    /// Last path segment of the key (`/apisix/routes/12` -> `12`)
    pub fn id(&self) -> &str {
        key_to_id(&self.key)
    }
}

pub fn key_to_id(key: &str) -> &str {
    key.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
}

/// Extract the single node of a create/update/get response
pub fn parse_item(body: &Value) -> ControllerResult<Node> {
    let node = body.get("node").unwrap_or(body);
    if node.get("value").is_none() {
        return Err(ControllerError::remote(None, format!("unexpected admin api response: {}", body)));
    }
    Ok(Node::deserialize(node)?)
}

/// Extract every node of a list response
///
/// An empty directory may come back as an object instead of an array; it
/// yields no nodes.
pub fn parse_list(body: &Value) -> ControllerResult<Vec<Node>> {
    let items = if let Some(list) = body.get("list") {
        list
    } else if let Some(node) = body.get("node") {
        match node.get("items").or_else(|| node.get("nodes")) {
            Some(items) => items,
            None => return Ok(Vec::new()),
        }
    } else {
        return Err(ControllerError::remote(None, format!("unexpected admin api list response: {}", body)));
    };

    match items {
        Value::Array(items) => items
            .iter()
            .map(|item| Node::deserialize(item).map_err(ControllerError::from))
            .collect(),
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_item_envelopes() {
        let wrapped = json!({"action": "create", "node": {"key": "/apisix/services/1", "value": {"id": "1"}}});
        let node = parse_item(&wrapped).unwrap();
        assert_eq!(node.id(), "1");
        assert_eq!(node.value, json!({"id": "1"}));

        let bare = json!({"key": "/apisix/routes/abc", "value": {"id": "abc"}});
        assert_eq!(parse_item(&bare).unwrap().id(), "abc");

        assert!(parse_item(&json!({"error_msg": "oops"})).is_err());
    }

    #[test]
    fn test_parse_list_envelopes() {
        let legacy = json!({
            "count": 2,
            "node": {"key": "/apisix/routes", "items": [
                {"key": "/apisix/routes/1", "value": {"id": "1"}},
                {"key": "/apisix/routes/2", "value": {"id": "2"}}
            ]}
        });
        assert_eq!(parse_list(&legacy).unwrap().len(), 2);

        let v3 = json!({"total": 1, "list": [{"key": "/apisix/upstreams/u", "value": {"id": "u"}}]});
        assert_eq!(parse_list(&v3).unwrap()[0].id(), "u");

        let empty_dir = json!({"count": 0, "node": {"key": "/apisix/ssls", "nodes": {}}});
        assert!(parse_list(&empty_dir).unwrap().is_empty());
    }
}
