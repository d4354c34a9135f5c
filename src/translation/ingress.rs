//! Ingress translation.
//!
//! Both served versions are first flattened into `(host, path, backend)`
//! triples; routes, upstreams and SSL objects are then built the same way for
//! every version.

use k8s_openapi::api::networking::v1::{Ingress, IngressBackend};
use kube::ResourceExt;
use std::collections::BTreeMap;

use crate::apisix::types::{managed_labels, Plugins, Route};
use crate::core::error::{ControllerError, ControllerResult};
use crate::identity::{compose_ingress_route_name, compose_tls_name, gen_id};
use crate::k8s::crd::IngressV1beta1;
use crate::k8s::directory::BackendPort;
use crate::k8s::objects::{IngressObject, SourceObject};
use crate::manifest::Manifest;
use crate::translation::annotations::translate_annotations;
use crate::translation::Translator;

const PATH_TYPE_PREFIX: &str = "Prefix";

/// One `(host, path)` of an Ingress, in any version
#[derive(Debug)]
struct IngressPath {
    host: String,
    path: String,
    prefix: bool,
    service: String,
    port: BackendPort,
}

/// One `spec.tls` entry
#[derive(Debug)]
struct IngressTls {
    hosts: Vec<String>,
    secret: String,
}

impl Translator {
    pub fn translate_ingress(&self, ingress: &IngressObject) -> ControllerResult<Manifest> {
        let key = ingress.key();
        let (paths, tls) = match ingress {
            IngressObject::V1(ing) => flatten_v1(ing)?,
            IngressObject::V1beta1(ing) => flatten_v1beta1(ing),
        };
        let annotations = match ingress {
            IngressObject::V1(ing) => ing.annotations(),
            IngressObject::V1beta1(ing) => ing.annotations(),
        };
        self.build_ingress(&key.namespace, &key.name, annotations, paths, tls)
    }

    fn build_ingress(
        &self,
        namespace: &str,
        name: &str,
        annotations: &BTreeMap<String, String>,
        paths: Vec<IngressPath>,
        tls: Vec<IngressTls>,
    ) -> ControllerResult<Manifest> {
        let plugins: Plugins = translate_annotations(annotations)?;
        let mut manifest = Manifest::new();

        for entry in paths {
            let upstream = self.translate_upstream(namespace, &entry.service, &entry.port, None)?;
            let full_name = compose_ingress_route_name(namespace, name, &entry.host, &entry.path);
            let id = gen_id(&full_name);
            if manifest.routes.iter().any(|r| r.id == id) {
                continue;
            }

            let uri = if entry.prefix {
                format!("{}*", entry.path)
            } else {
                entry.path.clone()
            };
            manifest.routes.push(Route {
                id,
                name: full_name,
                labels: managed_labels(),
                host: (!entry.host.is_empty()).then(|| entry.host.clone()),
                uri: Some(uri),
                plugins: plugins.clone(),
                upstream_id: Some(upstream.id.clone()),
                ..Default::default()
            });
            manifest.add_upstream(upstream);
        }

        for entry in tls {
            if entry.hosts.is_empty() {
                return Err(ControllerError::malformed(format!(
                    "tls entry for secret {} has no hosts",
                    entry.secret
                )));
            }
            let full_name = compose_tls_name(namespace, &format!("{}_{}", name, entry.secret));
            let ssl = self.certificate_ssl(&full_name, namespace, &entry.secret, entry.hosts)?;
            if !manifest.ssls.iter().any(|s| s.id == ssl.id) {
                manifest.ssls.push(ssl);
            }
        }

        Ok(manifest)
    }
}

fn flatten_v1(ing: &Ingress) -> ControllerResult<(Vec<IngressPath>, Vec<IngressTls>)> {
    let Some(spec) = &ing.spec else {
        return Ok((Vec::new(), Vec::new()));
    };

    let mut paths = Vec::new();
    for rule in spec.rules.iter().flatten() {
        let host = rule.host.clone().unwrap_or_default();
        for path in rule.http.iter().flat_map(|http| http.paths.iter()) {
            let (service, port) = v1_backend(&path.backend)?;
            paths.push(IngressPath {
                host: host.clone(),
                path: path.path.clone().unwrap_or_else(|| "/".to_string()),
                prefix: path.path_type == PATH_TYPE_PREFIX,
                service,
                port,
            });
        }
    }

    let tls = spec
        .tls
        .iter()
        .flatten()
        .filter_map(|entry| {
            entry.secret_name.clone().map(|secret| IngressTls {
                hosts: entry.hosts.clone().unwrap_or_default(),
                secret,
            })
        })
        .collect();
    Ok((paths, tls))
}

fn v1_backend(backend: &IngressBackend) -> ControllerResult<(String, BackendPort)> {
    let service = backend
        .service
        .as_ref()
        .ok_or_else(|| ControllerError::malformed("only service backends are supported"))?;
    let port = service.port.as_ref();
    let port = match (port.and_then(|p| p.number), port.and_then(|p| p.name.clone())) {
        (Some(number), _) => BackendPort::Number(number),
        (None, Some(name)) => BackendPort::Name(name),
        (None, None) => {
            return Err(ControllerError::malformed(format!(
                "backend {} has no port",
                service.name
            )))
        }
    };
    Ok((service.name.clone(), port))
}

fn flatten_v1beta1(ing: &IngressV1beta1) -> (Vec<IngressPath>, Vec<IngressTls>) {
    let mut paths = Vec::new();
    for rule in &ing.spec.rules {
        let host = rule.host.clone().unwrap_or_default();
        for path in rule.http.iter().flat_map(|http| http.paths.iter()) {
            paths.push(IngressPath {
                host: host.clone(),
                path: path.path.clone().unwrap_or_else(|| "/".to_string()),
                prefix: path.path_type.as_deref() == Some(PATH_TYPE_PREFIX),
                service: path.backend.service_name.clone(),
                port: BackendPort::from(&path.backend.service_port),
            });
        }
    }

    let tls = ing
        .spec
        .tls
        .iter()
        .filter_map(|entry| {
            entry.secret_name.clone().map(|secret| IngressTls {
                hosts: entry.hosts.clone(),
                secret,
            })
        })
        .collect();
    (paths, tls)
}
