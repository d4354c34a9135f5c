//! ApisixConsumer translation.
//!
//! Every auth parameter becomes one auth plugin on the consumer. Values come
//! either inline or from a secret in the consumer's namespace. Both served
//! versions share the auth parameter schema.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::apisix::types::{managed_labels, Consumer, Plugins};
use crate::core::error::{ControllerError, ControllerResult};
use crate::identity::compose_consumer_name;
use crate::k8s::crd::{AuthSource, BasicAuthValue, HmacAuthValue, JwtAuthValue, KeyAuthValue};
use crate::k8s::objects::{ApisixConsumerObject, SourceObject};
use crate::translation::Translator;

impl Translator {
    pub fn translate_consumer(&self, consumer: &ApisixConsumerObject) -> ControllerResult<Consumer> {
        let key = consumer.key();
        let namespace = key.namespace.as_str();
        let params = consumer.auth_parameter();

        let mut plugins = Plugins::new();
        if let Some(source) = &params.basic_auth {
            let value = self.resolve_auth(namespace, source, basic_auth_from_secret)?;
            plugins.insert("basic-auth".to_string(), to_plugin(&value)?);
        }
        if let Some(source) = &params.key_auth {
            let value = self.resolve_auth(namespace, source, key_auth_from_secret)?;
            plugins.insert("key-auth".to_string(), to_plugin(&value)?);
        }
        if let Some(source) = &params.jwt_auth {
            let value = self.resolve_auth(namespace, source, jwt_auth_from_secret)?;
            plugins.insert("jwt-auth".to_string(), to_plugin(&value)?);
        }
        if let Some(source) = &params.hmac_auth {
            let value = self.resolve_auth(namespace, source, hmac_auth_from_secret)?;
            plugins.insert("hmac-auth".to_string(), to_plugin(&value)?);
        }

        if plugins.is_empty() {
            return Err(ControllerError::malformed(format!("consumer {} has no auth parameter", key)));
        }

        Ok(Consumer {
            username: compose_consumer_name(namespace, &key.name),
            desc: None,
            labels: managed_labels(),
            plugins,
        })
    }

    fn resolve_auth<T: Clone>(
        &self,
        namespace: &str,
        source: &AuthSource<T>,
        from_secret: fn(&SecretFields) -> ControllerResult<T>,
    ) -> ControllerResult<T> {
        if let Some(value) = &source.value {
            return Ok(value.clone());
        }
        let secret = source
            .secret_ref
            .as_ref()
            .ok_or_else(|| ControllerError::malformed("auth parameter needs a value or a secretRef"))?;
        let fields = self.secrets().resolve_all(namespace, &secret.name)?;
        from_secret(&SecretFields {
            secret: &secret.name,
            fields,
        })
    }
}

/// Fields of one secret with typed accessors
struct SecretFields<'a> {
    secret: &'a str,
    fields: BTreeMap<String, String>,
}

impl SecretFields<'_> {
    fn required(&self, field: &str) -> ControllerResult<String> {
        self.fields
            .get(field)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| ControllerError::reference("secret", format!("{} has no field {}", self.secret, field)))
    }

    fn optional(&self, field: &str) -> Option<String> {
        self.fields.get(field).filter(|v| !v.is_empty()).cloned()
    }

    fn parsed<T: std::str::FromStr>(&self, field: &str) -> ControllerResult<Option<T>> {
        self.optional(field)
            .map(|raw| {
                raw.parse().map_err(|_| {
                    ControllerError::reference("secret", format!("{} field {} is invalid: {:?}", self.secret, field, raw))
                })
            })
            .transpose()
    }
}

fn basic_auth_from_secret(secret: &SecretFields) -> ControllerResult<BasicAuthValue> {
    Ok(BasicAuthValue {
        username: secret.required("username")?,
        password: secret.required("password")?,
    })
}

fn key_auth_from_secret(secret: &SecretFields) -> ControllerResult<KeyAuthValue> {
    Ok(KeyAuthValue {
        key: secret.required("key")?,
    })
}

fn jwt_auth_from_secret(secret: &SecretFields) -> ControllerResult<JwtAuthValue> {
    Ok(JwtAuthValue {
        key: secret.required("key")?,
        secret: secret.optional("secret"),
        public_key: secret.optional("public_key"),
        private_key: secret.optional("private_key"),
        algorithm: secret.optional("algorithm"),
        exp: secret.parsed("exp")?,
        base64_secret: secret.parsed("base64_secret")?,
        lifetime_grace_period: secret.parsed("lifetime_grace_period")?,
    })
}

fn hmac_auth_from_secret(secret: &SecretFields) -> ControllerResult<HmacAuthValue> {
    Ok(HmacAuthValue {
        access_key: secret.required("access_key")?,
        secret_key: secret.required("secret_key")?,
        algorithm: secret.optional("algorithm"),
        clock_skew: secret.parsed("clock_skew")?,
        signed_headers: secret
            .optional("signed_headers")
            .map(|raw| raw.split(',').map(|h| h.trim().to_string()).filter(|h| !h.is_empty()).collect())
            .unwrap_or_default(),
        keep_headers: secret.parsed("keep_headers")?,
        encode_uri_params: secret.parsed("encode_uri_params")?,
        validate_request_body: secret.parsed("validate_request_body")?,
        max_req_body: secret.parsed("max_req_body")?,
    })
}

fn to_plugin<T: Serialize>(value: &T) -> ControllerResult<Value> {
    Ok(serde_json::to_value(value)?)
}
