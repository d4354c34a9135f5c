//! ApisixRoute translation.
//!
//! Each HTTP rule becomes one route plus an upstream per backend; each stream
//! rule becomes one stream route plus its upstream.

use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;

use crate::apisix::types::{managed_labels, Route, StreamRoute, Timeout, Upstream};
use crate::core::error::{ControllerError, ControllerResult};
use crate::identity::{compose_plugin_config_name, compose_route_name, compose_stream_route_name, gen_id};
use crate::k8s::crd::{
    ApisixRoute, ApisixRouteAuthentication, ApisixRouteBackend, ApisixRouteHttp, ApisixRouteHttpMatchExpr,
    ApisixRouteStream, ApisixRouteV2beta3, UpstreamTimeout,
};
use crate::k8s::directory::BackendPort;
use crate::k8s::objects::{ApisixRouteObject, SourceObject};
use crate::manifest::Manifest;
use crate::translation::upstream::DEFAULT_NODE_WEIGHT;
use crate::translation::Translator;

impl Translator {
    /// Translate an ApisixRoute of any served version
    pub fn translate_apisix_route(&self, route: &ApisixRouteObject) -> ControllerResult<Manifest> {
        match route {
            ApisixRouteObject::V2(ar) => self.translate_apisix_route_v2(ar),
            ApisixRouteObject::V2beta3(ar) => self.translate_apisix_route_v2beta3(ar),
        }
    }

    fn translate_apisix_route_v2(&self, ar: &ApisixRoute) -> ControllerResult<Manifest> {
        let key = ar.key();
        self.translate_route_rules(&key.namespace, &key.name, &ar.spec.http, &ar.spec.stream)
    }

    /// v2beta3 rules may carry the deprecated single `backend`, which is
    /// folded into `backends` before the shared translation runs
    fn translate_apisix_route_v2beta3(&self, ar: &ApisixRouteV2beta3) -> ControllerResult<Manifest> {
        let key = ar.key();
        let mut rules = Vec::with_capacity(ar.spec.http.len());
        for part in &ar.spec.http {
            let mut rule = part.rule.clone();
            if let Some(backend) = &part.backend {
                if !rule.backends.is_empty() {
                    return Err(ControllerError::malformed(format!(
                        "rule {}: backend and backends are mutually exclusive",
                        rule.name
                    )));
                }
                rule.backends.push(backend.clone());
            }
            rules.push(rule);
        }
        self.translate_route_rules(&key.namespace, &key.name, &rules, &ar.spec.stream)
    }

    fn translate_route_rules(
        &self,
        namespace: &str,
        name: &str,
        http: &[ApisixRouteHttp],
        stream: &[ApisixRouteStream],
    ) -> ControllerResult<Manifest> {
        let mut seen = HashSet::new();
        for rule_name in http.iter().map(|r| &r.name).chain(stream.iter().map(|r| &r.name)) {
            if rule_name.is_empty() {
                return Err(ControllerError::malformed("rule name must not be empty"));
            }
            if !seen.insert(rule_name.as_str()) {
                return Err(ControllerError::malformed(format!("duplicated rule name {}", rule_name)));
            }
        }

        let mut manifest = Manifest::new();
        for rule in http {
            self.translate_http_rule(namespace, name, rule, &mut manifest)?;
        }
        for rule in stream {
            self.translate_stream_rule(namespace, name, rule, &mut manifest)?;
        }
        Ok(manifest)
    }

    fn translate_http_rule(
        &self,
        namespace: &str,
        name: &str,
        rule: &ApisixRouteHttp,
        manifest: &mut Manifest,
    ) -> ControllerResult<()> {
        let matching = &rule.route_match;
        if matching.paths.is_empty() {
            return Err(ControllerError::malformed(format!("rule {}: match.paths is empty", rule.name)));
        }
        if rule.backends.is_empty() {
            return Err(ControllerError::malformed(format!("rule {}: no backends", rule.name)));
        }

        let mut plugins = self.translate_plugins(namespace, &rule.plugins)?;
        if let Some(auth) = rule.authentication.as_ref().filter(|a| a.enable) {
            let (plugin, config) = authentication_plugin(auth)?;
            plugins.insert(plugin.to_string(), config);
        }

        let mut upstream_ids = Vec::with_capacity(rule.backends.len());
        for backend in &rule.backends {
            let upstream = self.translate_backend(namespace, backend)?;
            upstream_ids.push((upstream.id.clone(), backend.weight.unwrap_or(DEFAULT_NODE_WEIGHT)));
            manifest.add_upstream(upstream);
        }
        if upstream_ids.len() > 1 {
            plugins.insert("traffic-split".to_string(), traffic_split(&upstream_ids));
        }

        let full_name = compose_route_name(namespace, name, &rule.name);
        let (host, hosts) = one_or_many(&matching.hosts);
        let (uri, uris) = one_or_many(&matching.paths);
        manifest.routes.push(Route {
            id: gen_id(&full_name),
            name: full_name,
            labels: managed_labels(),
            host,
            hosts,
            uri,
            uris,
            methods: matching.methods.clone(),
            remote_addrs: matching.remote_addrs.clone(),
            priority: rule.priority,
            vars: matching.exprs.iter().map(translate_expr).collect::<ControllerResult<_>>()?,
            plugins,
            upstream_id: upstream_ids.first().map(|(id, _)| id.clone()),
            plugin_config_id: rule
                .plugin_config_name
                .as_deref()
                .filter(|n| !n.is_empty())
                .map(|n| gen_id(&compose_plugin_config_name(namespace, n))),
            enable_websocket: rule.websocket.then_some(true),
            timeout: rule.timeout.as_ref().map(translate_timeout).transpose()?,
            ..Default::default()
        });
        Ok(())
    }

    fn translate_stream_rule(
        &self,
        namespace: &str,
        name: &str,
        rule: &ApisixRouteStream,
        manifest: &mut Manifest,
    ) -> ControllerResult<()> {
        match rule.protocol.as_str() {
            "TCP" | "UDP" => {}
            other => {
                return Err(ControllerError::malformed(format!(
                    "stream rule {}: unsupported protocol {}",
                    rule.name, other
                )))
            }
        }

        let upstream = self.translate_backend(namespace, &rule.backend)?;
        let full_name = compose_stream_route_name(namespace, name, &rule.name);
        manifest.stream_routes.push(StreamRoute {
            id: gen_id(&full_name),
            desc: Some(full_name),
            labels: managed_labels(),
            server_port: Some(rule.stream_match.ingress_port),
            sni: rule.stream_match.host.clone(),
            upstream_id: upstream.id.clone(),
        });
        manifest.add_upstream(upstream);
        Ok(())
    }

    fn translate_backend(&self, namespace: &str, backend: &ApisixRouteBackend) -> ControllerResult<Upstream> {
        let port = backend.service_port.as_ref().ok_or_else(|| {
            ControllerError::malformed(format!("backend {}: servicePort is required", backend.service_name))
        })?;
        self.translate_upstream(
            namespace,
            &backend.service_name,
            &BackendPort::from(port),
            backend.resolve_granularity.as_deref(),
        )
    }
}

fn one_or_many(values: &[String]) -> (Option<String>, Vec<String>) {
    match values {
        [] => (None, Vec::new()),
        [single] => (Some(single.clone()), Vec::new()),
        many => (None, many.to_vec()),
    }
}

/// `traffic-split` config sending each backend its share of requests
///
/// The first backend is the route's own upstream and is listed without an id.
fn traffic_split(upstreams: &[(String, i32)]) -> Value {
    let mut weighted: Vec<Value> = upstreams
        .iter()
        .skip(1)
        .map(|(id, weight)| json!({"upstream_id": id, "weight": weight}))
        .collect();
    if let Some((_, weight)) = upstreams.first() {
        weighted.push(json!({ "weight": weight }));
    }
    json!({"rules": [{"weighted_upstreams": weighted}]})
}

fn authentication_plugin(auth: &ApisixRouteAuthentication) -> ControllerResult<(&'static str, Value)> {
    match auth.auth_type.as_str() {
        "keyAuth" => {
            let mut config = serde_json::Map::new();
            if let Some(header) = auth.key_auth.as_ref().and_then(|k| k.header.clone()) {
                config.insert("header".to_string(), Value::String(header));
            }
            Ok(("key-auth", Value::Object(config)))
        }
        "basicAuth" => Ok(("basic-auth", json!({}))),
        "jwtAuth" => Ok(("jwt-auth", json!({}))),
        "hmacAuth" => Ok(("hmac-auth", json!({}))),
        other => Err(ControllerError::malformed(format!("unsupported authentication type {:?}", other))),
    }
}

/// Translate a match expression into a `vars` entry
fn translate_expr(expr: &ApisixRouteHttpMatchExpr) -> ControllerResult<Value> {
    let subject = &expr.subject;
    let var = match subject.scope.as_str() {
        "Path" => "uri".to_string(),
        scope @ ("Header" | "Query" | "Cookie") => {
            if subject.name.is_empty() {
                return Err(ControllerError::malformed(format!("{} expression without a name", scope)));
            }
            match scope {
                "Header" => format!("http_{}", subject.name.to_lowercase().replace('-', "_")),
                "Query" => format!("arg_{}", subject.name),
                _ => format!("cookie_{}", subject.name),
            }
        }
        other => return Err(ControllerError::malformed(format!("unknown expression scope {:?}", other))),
    };

    let scalar = || {
        expr.value
            .clone()
            .map(Value::String)
            .ok_or_else(|| ControllerError::malformed(format!("operator {} requires a value", expr.op)))
    };
    let set = || {
        if expr.set.is_empty() {
            Err(ControllerError::malformed(format!("operator {} requires a set", expr.op)))
        } else {
            Ok(json!(expr.set))
        }
    };

    let entry = match expr.op.as_str() {
        "Equal" => json!([var, "==", scalar()?]),
        "NotEqual" => json!([var, "~=", scalar()?]),
        "GreaterThan" => json!([var, ">", scalar()?]),
        "LessThan" => json!([var, "<", scalar()?]),
        "RegexMatch" => json!([var, "~~", scalar()?]),
        "RegexMatchCaseInsensitive" => json!([var, "~*", scalar()?]),
        "In" => json!([var, "in", set()?]),
        "NotIn" => json!([var, "!", "in", set()?]),
        other => return Err(ControllerError::malformed(format!("unknown expression operator {:?}", other))),
    };
    Ok(entry)
}

pub(super) fn translate_timeout(timeout: &UpstreamTimeout) -> ControllerResult<Timeout> {
    fn seconds(value: &Option<String>) -> ControllerResult<Option<u64>> {
        value
            .as_deref()
            .map(|raw| {
                humantime::parse_duration(raw)
                    .map(|d: Duration| d.as_secs())
                    .map_err(|err| ControllerError::malformed(format!("invalid timeout {:?}: {}", raw, err)))
            })
            .transpose()
    }
    Ok(Timeout {
        connect: seconds(&timeout.connect)?,
        send: seconds(&timeout.send)?,
        read: seconds(&timeout.read)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apisix::types::Plugins;
    use crate::k8s::crd::{
        ApisixRouteAuthenticationKeyAuth, ApisixRouteHttpMatch, ApisixRouteHttpMatchExprSubject, ApisixRouteHttpV2beta3,
        ApisixRouteSpec, ApisixRouteStreamMatch, ApisixRouteV2beta3Spec,
    };
    use crate::translation::testing::{translator, translator_with, FakeSecrets, FakeServices};
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

    fn backend(service: &str, port: IntOrString) -> ApisixRouteBackend {
        ApisixRouteBackend {
            service_name: service.to_string(),
            service_port: Some(port),
            ..Default::default()
        }
    }

    fn rule(name: &str, host: &str, path: &str) -> ApisixRouteHttp {
        ApisixRouteHttp {
            name: name.to_string(),
            route_match: ApisixRouteHttpMatch {
                paths: vec![path.to_string()],
                hosts: vec![host.to_string()],
                ..Default::default()
            },
            backends: vec![backend("httpbin", IntOrString::Int(80))],
            ..Default::default()
        }
    }

    fn route(http: Vec<ApisixRouteHttp>) -> ApisixRouteObject {
        let mut ar = ApisixRoute::new("httpbin", ApisixRouteSpec { http, ..Default::default() });
        ar.metadata.namespace = Some("default".to_string());
        ApisixRouteObject::V2(ar)
    }

    #[test]
    fn test_single_rule_route_and_upstream() {
        let t = translator();
        let manifest = t
            .translate_apisix_route(&route(vec![rule("r1", "httpbin.org", "/ip")]))
            .unwrap();

        assert_eq!(manifest.routes.len(), 1);
        assert_eq!(manifest.upstreams.len(), 1);
        let r = &manifest.routes[0];
        assert_eq!(r.name, "default_httpbin_r1");
        assert_eq!(r.id, gen_id("default_httpbin_r1"));
        assert_eq!(r.host.as_deref(), Some("httpbin.org"));
        assert_eq!(r.uri.as_deref(), Some("/ip"));
        assert_eq!(r.upstream_id.as_deref(), Some(gen_id("default_httpbin_80").as_str()));
        assert_eq!(manifest.upstreams[0].id, gen_id("default_httpbin_80"));
    }

    #[test]
    fn test_translation_is_deterministic() {
        let t = translator();
        let object = route(vec![rule("r1", "httpbin.org", "/ip"), rule("r2", "httpbin.org", "/get")]);
        let first = t.translate_apisix_route(&object).unwrap();
        let second = t.translate_apisix_route(&object).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&first.routes).unwrap(),
            serde_json::to_vec(&second.routes).unwrap()
        );
        // both rules share the upstream
        assert_eq!(first.upstreams.len(), 1);
    }

    #[test]
    fn test_missing_named_port() {
        let t = translator();
        let mut r = rule("r1", "httpbin.org", "/ip");
        r.backends = vec![backend("httpbin", IntOrString::String("grpc".to_string()))];
        let err = t.translate_apisix_route(&route(vec![r])).unwrap_err();
        assert_eq!(err, ControllerError::reference("service", "port not found"));
    }

    #[test]
    fn test_v2beta3_backend_normalizes_to_v2() {
        let t = translator();
        let mut v2_rule = rule("r1", "httpbin.org", "/ip");
        let v2 = t.translate_apisix_route(&route(vec![v2_rule.clone()])).unwrap();

        let legacy_backend = v2_rule.backends.remove(0);
        let mut ar = ApisixRouteV2beta3::new(
            "httpbin",
            ApisixRouteV2beta3Spec {
                http: vec![ApisixRouteHttpV2beta3 {
                    rule: v2_rule,
                    backend: Some(legacy_backend),
                }],
                ..Default::default()
            },
        );
        ar.metadata.namespace = Some("default".to_string());
        let v2beta3 = t.translate_apisix_route(&ApisixRouteObject::V2beta3(ar)).unwrap();

        assert_eq!(v2, v2beta3);
    }

    #[test]
    fn test_multiple_backends_use_traffic_split() {
        let services = FakeServices::default().with("default", "canary", "http", 8080, &["10.0.1.1"]);
        let t = translator_with(services, FakeSecrets::default());
        let mut r = rule("r1", "httpbin.org", "/ip");
        r.backends[0].weight = Some(90);
        let mut canary = backend("canary", IntOrString::Int(8080));
        canary.weight = Some(10);
        r.backends.push(canary);

        let manifest = t.translate_apisix_route(&route(vec![r])).unwrap();
        assert_eq!(manifest.upstreams.len(), 2);
        let route = &manifest.routes[0];
        assert_eq!(route.upstream_id.as_deref(), Some(gen_id("default_httpbin_80").as_str()));
        assert_eq!(
            route.plugins["traffic-split"],
            json!({"rules": [{"weighted_upstreams": [
                {"upstream_id": gen_id("default_canary_8080"), "weight": 10},
                {"weight": 90}
            ]}]})
        );
    }

    #[test]
    fn test_exprs_auth_timeout_and_plugin_config() {
        let t = translator();
        let mut r = rule("r1", "httpbin.org", "/ip");
        r.route_match.exprs = vec![
            ApisixRouteHttpMatchExpr {
                subject: ApisixRouteHttpMatchExprSubject {
                    scope: "Header".to_string(),
                    name: "X-Foo".to_string(),
                },
                op: "Equal".to_string(),
                value: Some("bar".to_string()),
                set: Vec::new(),
            },
            ApisixRouteHttpMatchExpr {
                subject: ApisixRouteHttpMatchExprSubject {
                    scope: "Query".to_string(),
                    name: "id".to_string(),
                },
                op: "NotIn".to_string(),
                value: None,
                set: vec!["1".to_string(), "2".to_string()],
            },
        ];
        r.authentication = Some(ApisixRouteAuthentication {
            enable: true,
            auth_type: "keyAuth".to_string(),
            key_auth: Some(ApisixRouteAuthenticationKeyAuth {
                header: Some("apikey".to_string()),
            }),
        });
        r.timeout = Some(UpstreamTimeout {
            connect: Some("5s".to_string()),
            read: Some("1m".to_string()),
            send: None,
        });
        r.plugin_config_name = Some("echo".to_string());
        r.websocket = true;

        let manifest = t.translate_apisix_route(&route(vec![r])).unwrap();
        let route = &manifest.routes[0];
        assert_eq!(
            route.vars,
            vec![json!(["http_x_foo", "==", "bar"]), json!(["arg_id", "!", "in", ["1", "2"]])]
        );
        let mut expected = Plugins::new();
        expected.insert("key-auth".to_string(), json!({"header": "apikey"}));
        assert_eq!(route.plugins, expected);
        let timeout = route.timeout.as_ref().unwrap();
        assert_eq!((timeout.connect, timeout.send, timeout.read), (Some(5), None, Some(60)));
        assert_eq!(route.plugin_config_id, Some(gen_id("default_echo")));
        assert_eq!(route.enable_websocket, Some(true));
    }

    #[test]
    fn test_malformed_rules() {
        let t = translator();

        let dup = route(vec![rule("r1", "a", "/a"), rule("r1", "b", "/b")]);
        assert!(matches!(t.translate_apisix_route(&dup), Err(ControllerError::MalformedSpec { .. })));

        let mut no_backend = rule("r1", "a", "/a");
        no_backend.backends.clear();
        assert!(matches!(
            t.translate_apisix_route(&route(vec![no_backend])),
            Err(ControllerError::MalformedSpec { .. })
        ));

        let mut bad_timeout = rule("r1", "a", "/a");
        bad_timeout.timeout = Some(UpstreamTimeout {
            connect: Some("soon".to_string()),
            ..Default::default()
        });
        assert!(t.translate_apisix_route(&route(vec![bad_timeout])).unwrap_err().is_terminal());
    }

    #[test]
    fn test_stream_rule() {
        let t = translator();
        let mut ar = ApisixRoute::new(
            "tcp",
            ApisixRouteSpec {
                stream: vec![ApisixRouteStream {
                    name: "s1".to_string(),
                    protocol: "TCP".to_string(),
                    stream_match: ApisixRouteStreamMatch {
                        ingress_port: 9100,
                        host: None,
                    },
                    backend: backend("httpbin", IntOrString::Int(80)),
                }],
                ..Default::default()
            },
        );
        ar.metadata.namespace = Some("default".to_string());

        let manifest = t.translate_apisix_route(&ApisixRouteObject::V2(ar)).unwrap();
        assert!(manifest.routes.is_empty());
        let sr = &manifest.stream_routes[0];
        assert_eq!(sr.id, gen_id("default_tcp_s1"));
        assert_eq!(sr.server_port, Some(9100));
        assert_eq!(sr.upstream_id, manifest.upstreams[0].id);
    }
}
