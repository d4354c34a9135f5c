//! Upstreams built from service backends.
//!
//! Nodes come from the service's endpoints. Scheme, load balancing, health
//! checks, retries, timeouts and client TLS come from the ApisixUpstream named
//! after the service, when there is one.

use serde_json::{json, Map, Value};
use std::time::Duration;

use crate::apisix::types::{managed_labels, Upstream, UpstreamNode, UpstreamTls};
use crate::core::error::{ControllerError, ControllerResult};
use crate::identity::{compose_upstream_name, gen_id};
use crate::k8s::crd::{
    ActiveHealthCheck, ActiveHealthCheckUnhealthy, ApisixSecret, ApisixUpstreamConfig, HealthCheck, LoadBalancer,
    PassiveHealthCheck,
};
use crate::k8s::directory::BackendPort;
use crate::translation::apisix_route::translate_timeout;
use crate::translation::tls::{pick, CERT_FIELDS, KEY_FIELDS};
use crate::translation::Translator;

/// Node weight of every upstream node
pub const DEFAULT_NODE_WEIGHT: i32 = 100;

/// `resolveGranularity` value selecting the cluster IP as the only node
pub const RESOLVE_GRANULARITY_SERVICE: &str = "service";

const SCHEMES: [&str; 4] = ["http", "https", "grpc", "grpcs"];
const LB_TYPES: [&str; 4] = ["roundrobin", "chash", "ewma", "least_conn"];
const HASH_ON: [&str; 5] = ["vars", "header", "cookie", "consumer", "vars_combinations"];
const CHECK_TYPES: [&str; 3] = ["http", "https", "tcp"];

impl Translator {
    /// Translate a service port into its shared upstream
    ///
    /// The upstream name only depends on the namespace, the service and the
    /// resolved port number, so every rule pointing at the same port shares
    /// one upstream whichever way the port was written.
    pub fn translate_upstream(
        &self,
        namespace: &str,
        service: &str,
        port: &BackendPort,
        resolve_granularity: Option<&str>,
    ) -> ControllerResult<Upstream> {
        let port = self.services().resolve_port(namespace, service, port)?;

        let endpoints = if resolve_granularity == Some(RESOLVE_GRANULARITY_SERVICE) {
            vec![self.services().cluster_ip(namespace, service, port)?]
        } else {
            self.services().endpoints(namespace, service, port)?
        };

        let mut nodes: Vec<UpstreamNode> = endpoints
            .into_iter()
            .map(|ep| UpstreamNode {
                host: ep.host,
                port: ep.port,
                weight: DEFAULT_NODE_WEIGHT,
            })
            .collect();
        nodes.sort();

        let name = compose_upstream_name(namespace, service, port);
        let mut upstream = Upstream {
            id: gen_id(&name),
            name,
            labels: managed_labels(),
            nodes,
            ..Default::default()
        };
        if let Some(config) = self
            .upstream_configs()
            .and_then(|configs| configs.upstream_config(namespace, service, port))
        {
            self.apply_upstream_config(&mut upstream, &config)?;
        }
        Ok(upstream)
    }

    fn apply_upstream_config(&self, upstream: &mut Upstream, config: &ApisixUpstreamConfig) -> ControllerResult<()> {
        if let Some(scheme) = &config.scheme {
            let scheme = scheme.to_ascii_lowercase();
            if !SCHEMES.contains(&scheme.as_str()) {
                return Err(ControllerError::malformed(format!("unsupported scheme {}", scheme)));
            }
            upstream.scheme = Some(scheme);
        }
        if let Some(lb) = &config.loadbalancer {
            apply_load_balancer(upstream, lb)?;
        }
        if let Some(retries) = config.retries {
            if retries < 0 {
                return Err(ControllerError::malformed("retries must not be negative"));
            }
            upstream.retries = Some(retries);
        }
        if let Some(timeout) = &config.timeout {
            upstream.timeout = Some(translate_timeout(timeout)?);
        }
        if let Some(check) = &config.health_check {
            upstream.checks = Some(translate_health_check(check)?);
        }
        if let Some(secret) = &config.tls_secret {
            upstream.tls = Some(self.upstream_tls(secret)?);
        }
        Ok(())
    }

    /// Client certificate and key presented to the upstream
    fn upstream_tls(&self, secret: &ApisixSecret) -> ControllerResult<UpstreamTls> {
        let fields = self.secrets().resolve_all(&secret.namespace, &secret.name)?;
        let client_cert = pick(&fields, &CERT_FIELDS)
            .ok_or_else(|| ControllerError::reference("secret", format!("{} has no tls.crt", secret.name)))?;
        let client_key = pick(&fields, &KEY_FIELDS)
            .ok_or_else(|| ControllerError::reference("secret", format!("{} has no tls.key", secret.name)))?;
        Ok(UpstreamTls {
            client_cert,
            client_key,
        })
    }
}

fn apply_load_balancer(upstream: &mut Upstream, lb: &LoadBalancer) -> ControllerResult<()> {
    let lb_type = lb.lb_type.to_ascii_lowercase();
    if !LB_TYPES.contains(&lb_type.as_str()) {
        return Err(ControllerError::malformed(format!("unsupported load balancer {}", lb.lb_type)));
    }
    if lb_type == "chash" {
        let hash_on = lb.hash_on.clone().unwrap_or_else(|| "vars".to_string());
        if !HASH_ON.contains(&hash_on.as_str()) {
            return Err(ControllerError::malformed(format!("unsupported hashOn {}", hash_on)));
        }
        let key = lb.key.clone().filter(|k| !k.is_empty());
        if key.is_none() && hash_on != "consumer" {
            return Err(ControllerError::malformed("chash load balancer needs a key"));
        }
        upstream.hash_on = Some(hash_on);
        upstream.key = key;
    }
    upstream.lb_type = lb_type;
    Ok(())
}

fn seconds(field: &str, raw: &str) -> ControllerResult<u64> {
    humantime::parse_duration(raw)
        .map(|d: Duration| d.as_secs())
        .map_err(|err| ControllerError::malformed(format!("invalid {} {:?}: {}", field, raw, err)))
}

fn check_type(check_type: Option<&str>) -> ControllerResult<Option<Value>> {
    match check_type {
        None => Ok(None),
        Some(t) if CHECK_TYPES.contains(&t) => Ok(Some(json!(t))),
        Some(t) => Err(ControllerError::malformed(format!("unsupported health check type {}", t))),
    }
}

/// Insert `value` under `key` unless it is `None`
fn put(map: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value);
    }
}

fn statuses(codes: &[i32]) -> Option<Value> {
    (!codes.is_empty()).then(|| json!(codes))
}

fn unhealthy(spec: &ActiveHealthCheckUnhealthy, with_interval: bool) -> ControllerResult<Value> {
    let mut out = Map::new();
    if with_interval {
        put(
            &mut out,
            "interval",
            spec.interval.as_deref().map(|i| seconds("interval", i)).transpose()?.map(Value::from),
        );
    }
    put(&mut out, "http_statuses", statuses(&spec.http_codes));
    put(&mut out, "http_failures", spec.http_failures.map(Value::from));
    put(&mut out, "tcp_failures", spec.tcp_failures.map(Value::from));
    put(&mut out, "timeouts", spec.timeouts.map(Value::from));
    Ok(Value::Object(out))
}

fn active_check(active: &ActiveHealthCheck) -> ControllerResult<Value> {
    let mut out = Map::new();
    put(&mut out, "type", check_type(active.check_type.as_deref())?);
    put(
        &mut out,
        "timeout",
        active.timeout.as_deref().map(|t| seconds("timeout", t)).transpose()?.map(Value::from),
    );
    put(&mut out, "concurrency", active.concurrency.map(Value::from));
    put(&mut out, "host", active.host.clone().map(Value::from));
    put(&mut out, "port", active.port.map(Value::from));
    put(&mut out, "http_path", active.http_path.clone().map(Value::from));
    put(&mut out, "https_verify_certificate", active.strict_tls.map(Value::from));
    put(
        &mut out,
        "req_headers",
        (!active.request_headers.is_empty()).then(|| json!(active.request_headers)),
    );
    if let Some(healthy) = &active.healthy {
        let mut h = Map::new();
        put(
            &mut h,
            "interval",
            healthy.interval.as_deref().map(|i| seconds("interval", i)).transpose()?.map(Value::from),
        );
        put(&mut h, "http_statuses", statuses(&healthy.http_codes));
        put(&mut h, "successes", healthy.successes.map(Value::from));
        out.insert("healthy".to_string(), Value::Object(h));
    }
    if let Some(spec) = &active.unhealthy {
        out.insert("unhealthy".to_string(), unhealthy(spec, true)?);
    }
    Ok(Value::Object(out))
}

fn passive_check(passive: &PassiveHealthCheck) -> ControllerResult<Value> {
    let mut out = Map::new();
    put(&mut out, "type", check_type(passive.check_type.as_deref())?);
    if let Some(healthy) = &passive.healthy {
        let mut h = Map::new();
        put(&mut h, "http_statuses", statuses(&healthy.http_codes));
        put(&mut h, "successes", healthy.successes.map(Value::from));
        out.insert("healthy".to_string(), Value::Object(h));
    }
    if let Some(spec) = &passive.unhealthy {
        out.insert("unhealthy".to_string(), unhealthy(spec, false)?);
    }
    Ok(Value::Object(out))
}

/// The gateway's `checks` object; passive checks only work alongside active ones
fn translate_health_check(check: &HealthCheck) -> ControllerResult<Value> {
    let active = check
        .active
        .as_ref()
        .ok_or_else(|| ControllerError::malformed("passive health check requires an active one"))?;
    let mut out = Map::new();
    out.insert("active".to_string(), active_check(active)?);
    if let Some(passive) = &check.passive {
        out.insert("passive".to_string(), passive_check(passive)?);
    }
    Ok(Value::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ControllerError;
    use crate::k8s::crd::{ActiveHealthCheckHealthy, PassiveHealthCheckHealthy, UpstreamTimeout};
    use crate::translation::testing::{translator, translator_with, FakeSecrets, FakeServices, FakeUpstreams};
    use std::sync::Arc;

    fn configured(config: ApisixUpstreamConfig, secrets: FakeSecrets) -> Translator {
        translator_with(FakeServices::default(), secrets)
            .with_upstream_configs(Arc::new(FakeUpstreams::default().with("default", "httpbin", config)))
    }

    fn httpbin(t: &Translator) -> ControllerResult<Upstream> {
        t.translate_upstream("default", "httpbin", &BackendPort::Number(80), None)
    }

    #[test]
    fn test_named_and_numbered_port_share_upstream() {
        let t = translator();
        let by_name = t
            .translate_upstream("default", "httpbin", &BackendPort::Name("http".to_string()), None)
            .unwrap();
        let by_number = t
            .translate_upstream("default", "httpbin", &BackendPort::Number(80), None)
            .unwrap();

        assert_eq!(by_name, by_number);
        assert_eq!(by_name.name, "default_httpbin_80");
        assert_eq!(by_name.id, gen_id("default_httpbin_80"));
        assert_eq!(
            by_name.nodes.iter().map(|n| n.host.as_str()).collect::<Vec<_>>(),
            vec!["10.0.0.1", "10.0.0.2"]
        );
        assert!(by_name.nodes.iter().all(|n| n.weight == DEFAULT_NODE_WEIGHT && n.port == 80));
    }

    #[test]
    fn test_service_granularity_uses_cluster_ip() {
        let t = translator();
        let upstream = t
            .translate_upstream("default", "httpbin", &BackendPort::Number(80), Some("service"))
            .unwrap();
        assert_eq!(upstream.nodes.len(), 1);
        assert_eq!(upstream.nodes[0].host, "10.96.0.1");
    }

    #[test]
    fn test_unknown_port_name() {
        let t = translator();
        let err = t
            .translate_upstream("default", "httpbin", &BackendPort::Name("grpc".to_string()), None)
            .unwrap_err();
        assert_eq!(err, ControllerError::reference("service", "port not found"));
    }

    #[test]
    fn test_apisix_upstream_settings_are_applied() {
        let config = ApisixUpstreamConfig {
            scheme: Some("HTTPS".to_string()),
            loadbalancer: Some(LoadBalancer {
                lb_type: "chash".to_string(),
                hash_on: Some("header".to_string()),
                key: Some("user-agent".to_string()),
            }),
            retries: Some(3),
            timeout: Some(UpstreamTimeout {
                connect: Some("5s".to_string()),
                send: None,
                read: Some("1m".to_string()),
            }),
            tls_secret: Some(ApisixSecret {
                name: "client-cert".to_string(),
                namespace: "default".to_string(),
            }),
            ..Default::default()
        };
        let secrets = FakeSecrets::default().with("default", "client-cert", &[("cert", "CERT"), ("key", "KEY")]);
        let upstream = httpbin(&configured(config, secrets)).unwrap();

        assert_eq!(upstream.scheme.as_deref(), Some("https"));
        assert_eq!(upstream.lb_type, "chash");
        assert_eq!(upstream.hash_on.as_deref(), Some("header"));
        assert_eq!(upstream.key.as_deref(), Some("user-agent"));
        assert_eq!(upstream.retries, Some(3));
        let timeout = upstream.timeout.as_ref().unwrap();
        assert_eq!((timeout.connect, timeout.send, timeout.read), (Some(5), None, Some(60)));
        assert_eq!(
            upstream.tls,
            Some(UpstreamTls {
                client_cert: "CERT".to_string(),
                client_key: "KEY".to_string(),
            })
        );
        // identity and nodes are untouched
        assert_eq!(upstream.id, gen_id("default_httpbin_80"));
        assert_eq!(upstream.nodes.len(), 2);
    }

    #[test]
    fn test_health_check_translation() {
        let config = ApisixUpstreamConfig {
            health_check: Some(HealthCheck {
                active: Some(ActiveHealthCheck {
                    check_type: Some("http".to_string()),
                    timeout: Some("3s".to_string()),
                    http_path: Some("/healthz".to_string()),
                    healthy: Some(ActiveHealthCheckHealthy {
                        interval: Some("2s".to_string()),
                        http_codes: vec![200, 302],
                        successes: Some(2),
                    }),
                    unhealthy: Some(ActiveHealthCheckUnhealthy {
                        interval: Some("1s".to_string()),
                        http_failures: Some(3),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                passive: Some(PassiveHealthCheck {
                    healthy: Some(PassiveHealthCheckHealthy {
                        http_codes: vec![200],
                        successes: None,
                    }),
                    unhealthy: Some(ActiveHealthCheckUnhealthy {
                        interval: Some("9s".to_string()),
                        timeouts: Some(2),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        };
        let upstream = httpbin(&configured(config, FakeSecrets::default())).unwrap();
        assert_eq!(
            upstream.checks,
            Some(json!({
                "active": {
                    "type": "http",
                    "timeout": 3,
                    "http_path": "/healthz",
                    "healthy": {"interval": 2, "http_statuses": [200, 302], "successes": 2},
                    "unhealthy": {"interval": 1, "http_failures": 3}
                },
                "passive": {
                    "healthy": {"http_statuses": [200]},
                    "unhealthy": {"timeouts": 2}
                }
            }))
        );
    }

    #[test]
    fn test_invalid_apisix_upstream_settings() {
        let passive_only = ApisixUpstreamConfig {
            health_check: Some(HealthCheck {
                active: None,
                passive: Some(PassiveHealthCheck::default()),
            }),
            ..Default::default()
        };
        let chash_without_key = ApisixUpstreamConfig {
            loadbalancer: Some(LoadBalancer {
                lb_type: "chash".to_string(),
                hash_on: None,
                key: None,
            }),
            ..Default::default()
        };
        let bad_scheme = ApisixUpstreamConfig {
            scheme: Some("ftp".to_string()),
            ..Default::default()
        };
        for config in [passive_only, chash_without_key, bad_scheme] {
            let err = httpbin(&configured(config, FakeSecrets::default())).unwrap_err();
            assert!(err.is_terminal(), "{:?}", err);
        }

        let missing_secret = ApisixUpstreamConfig {
            tls_secret: Some(ApisixSecret {
                name: "absent".to_string(),
                namespace: "default".to_string(),
            }),
            ..Default::default()
        };
        match httpbin(&configured(missing_secret, FakeSecrets::default())).unwrap_err() {
            ControllerError::Reference { field, .. } => assert_eq!(field, "secret"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_without_apisix_upstream_defaults_apply() {
        let upstream = httpbin(&translator()).unwrap();
        assert_eq!(upstream.lb_type, "roundrobin");
        assert!(upstream.scheme.is_none() && upstream.checks.is_none() && upstream.tls.is_none());
    }
}
