//! Ingress annotations that turn into route plugins.
//!
//! Only annotations under [`ANNOTATIONS_PREFIX`] are read. A plugin is only
//! emitted when its annotations carry a value.

use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::apisix::types::Plugins;
use crate::core::error::{ControllerError, ControllerResult};

pub const ANNOTATIONS_PREFIX: &str = "k8s.apisix.apache.org/";

pub const REWRITE_TARGET: &str = "k8s.apisix.apache.org/rewrite-target";
pub const REWRITE_TARGET_REGEX: &str = "k8s.apisix.apache.org/rewrite-target-regex";
pub const REWRITE_TARGET_REGEX_TEMPLATE: &str = "k8s.apisix.apache.org/rewrite-target-regex-template";
pub const HTTP_ALLOW_METHODS: &str = "k8s.apisix.apache.org/http-allow-methods";
pub const HTTP_BLOCK_METHODS: &str = "k8s.apisix.apache.org/http-block-methods";

fn annotation<'a>(annotations: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    annotations
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Plugins requested through annotations
pub fn translate_annotations(annotations: &BTreeMap<String, String>) -> ControllerResult<Plugins> {
    let mut plugins = Plugins::new();
    if let Some(config) = rewrite(annotations)? {
        plugins.insert("proxy-rewrite".to_string(), config);
    }
    if let Some(config) = http_method(annotations) {
        plugins.insert("response-rewrite".to_string(), config);
    }
    Ok(plugins)
}

fn rewrite(annotations: &BTreeMap<String, String>) -> ControllerResult<Option<Value>> {
    let target = annotation(annotations, REWRITE_TARGET);
    let regex = annotation(annotations, REWRITE_TARGET_REGEX);
    let template = annotation(annotations, REWRITE_TARGET_REGEX_TEMPLATE);

    let mut config = serde_json::Map::new();
    if let Some(target) = target {
        config.insert("uri".to_string(), json!(target));
    }
    match (regex, template) {
        (Some(regex), Some(template)) => {
            Regex::new(regex).map_err(|err| {
                ControllerError::malformed(format!("invalid {}: {}", REWRITE_TARGET_REGEX, err))
            })?;
            config.insert("regex_uri".to_string(), json!([regex, template]));
        }
        (None, None) => {}
        _ => {
            return Err(ControllerError::malformed(format!(
                "{} and {} must be set together",
                REWRITE_TARGET_REGEX, REWRITE_TARGET_REGEX_TEMPLATE
            )))
        }
    }

    Ok((!config.is_empty()).then_some(Value::Object(config)))
}

fn methods(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|m| m.trim().to_uppercase())
        .filter(|m| !m.is_empty())
        .collect()
}

/// Rejects requests with 405 by method; an allow-list wins over a block-list
fn http_method(annotations: &BTreeMap<String, String>) -> Option<Value> {
    let expr = if let Some(allow) = annotation(annotations, HTTP_ALLOW_METHODS) {
        json!(["request_method", "!", "in", methods(allow)])
    } else if let Some(block) = annotation(annotations, HTTP_BLOCK_METHODS) {
        json!(["request_method", "in", methods(block)])
    } else {
        return None;
    };
    Some(json!({"status_code": 405, "vars": [expr]}))
}
