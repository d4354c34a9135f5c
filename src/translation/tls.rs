//! TLS bindings from ApisixTls objects and Ingress `spec.tls` entries.

use std::collections::BTreeMap;

use crate::apisix::types::{managed_labels, ClientTls, Ssl};
use crate::core::error::{ControllerError, ControllerResult};
use crate::identity::{compose_tls_name, gen_id};
use crate::k8s::crd::ApisixTls;
use crate::k8s::objects::SourceObject;
use crate::translation::Translator;

pub(super) const CERT_FIELDS: [&str; 2] = ["tls.crt", "cert"];
pub(super) const KEY_FIELDS: [&str; 2] = ["tls.key", "key"];
const CA_FIELDS: [&str; 2] = ["ca.crt", "cert"];

pub(super) fn pick(fields: &BTreeMap<String, String>, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .find_map(|name| fields.get(*name).filter(|v| !v.is_empty()).cloned())
}

impl Translator {
    pub fn translate_tls(&self, tls: &ApisixTls) -> ControllerResult<Ssl> {
        let key = tls.key();
        if tls.spec.hosts.is_empty() {
            return Err(ControllerError::malformed(format!("tls {} has no hosts", key)));
        }

        let mut ssl = self.certificate_ssl(
            &compose_tls_name(&key.namespace, &key.name),
            &tls.spec.secret.namespace,
            &tls.spec.secret.name,
            tls.spec.hosts.clone(),
        )?;

        if let Some(client) = &tls.spec.client {
            let fields = self
                .secrets()
                .resolve_all(&client.ca_secret.namespace, &client.ca_secret.name)?;
            let ca = pick(&fields, &CA_FIELDS).ok_or_else(|| {
                ControllerError::reference("secret", format!("{} has no ca.crt", client.ca_secret.name))
            })?;
            ssl.client = Some(ClientTls {
                ca,
                depth: client.depth,
            });
        }
        Ok(ssl)
    }

    /// SSL object named `full_name` from a kubernetes.io/tls style secret
    pub(crate) fn certificate_ssl(
        &self,
        full_name: &str,
        namespace: &str,
        secret: &str,
        snis: Vec<String>,
    ) -> ControllerResult<Ssl> {
        let fields = self.secrets().resolve_all(namespace, secret)?;
        let cert = pick(&fields, &CERT_FIELDS)
            .ok_or_else(|| ControllerError::reference("secret", format!("{} has no tls.crt", secret)))?;
        let key = pick(&fields, &KEY_FIELDS)
            .ok_or_else(|| ControllerError::reference("secret", format!("{} has no tls.key", secret)))?;

        Ok(Ssl {
            id: gen_id(full_name),
            snis,
            cert,
            key,
            client: None,
            labels: managed_labels(),
        })
    }
}
