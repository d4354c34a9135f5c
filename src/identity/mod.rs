//! # Identity & Naming
//!
//! Every gateway entity created by the controller gets a human readable full
//! name derived from its source object, and an id derived from that name.
//! Ids are pure functions of the name so a restarted controller (or a different
//! replica) computes exactly the same ids and keeps updating the same entities.
//!
//! ## Id scheme
//! `gen_id(name)` is the first 64 bits of `SHA-256(name)` rendered as 16
//! lower-case hex characters. An empty name yields an empty id.

use sha2::{Digest, Sha256};

const SEPARATOR: &str = "_";

/// Derive the deterministic entity id for a full name
pub fn gen_id(full_name: &str) -> String {
    if full_name.is_empty() {
        return String::new();
    }
    let digest = Sha256::digest(full_name.as_bytes());
    hex::encode(&digest[..8])
}

fn join(parts: &[&str]) -> String {
    parts.join(SEPARATOR)
}

/// Route name for one HTTP rule of an ApisixRoute
pub fn compose_route_name(namespace: &str, name: &str, rule: &str) -> String {
    join(&[namespace, name, rule])
}

/// Stream route name for one stream rule of an ApisixRoute
pub fn compose_stream_route_name(namespace: &str, name: &str, rule: &str) -> String {
    join(&[namespace, name, rule])
}

/// Upstream name for a service port
///
/// Upstreams are shared by every route pointing at the same service port.
pub fn compose_upstream_name(namespace: &str, service: &str, port: i32) -> String {
    join(&[namespace, service, &port.to_string()])
}

/// Route name for one (host, path) pair of an Ingress
pub fn compose_ingress_route_name(namespace: &str, name: &str, host: &str, path: &str) -> String {
    let host = host.replace('*', "wildcard");
    join(&["ingress", namespace, name, &host, path])
}

/// Consumer username
///
/// The admin API only accepts `[A-Za-z0-9_]` in usernames, every other
/// character is replaced with `_`. Replacing loses information
/// (`team-a/web` and `team/a-web` read the same), so the readable part is
/// followed by a short id of the raw `namespace/name`.
pub fn compose_consumer_name(namespace: &str, name: &str) -> String {
    let readable: String = join(&[namespace, name])
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    let raw = format!("{}/{}", namespace, name);
    join(&[&readable, &gen_id(&raw)[..CONSUMER_SUFFIX_LEN]])
}

const CONSUMER_SUFFIX_LEN: usize = 8;

pub fn compose_plugin_config_name(namespace: &str, name: &str) -> String {
    join(&[namespace, name])
}

pub fn compose_global_rule_name(namespace: &str, name: &str) -> String {
    join(&[namespace, name])
}

pub fn compose_tls_name(namespace: &str, name: &str) -> String {
    join(&[namespace, name])
}

/// Stream route name for one backend of one rule of a TCPRoute
pub fn compose_tcp_route_name(namespace: &str, name: &str, rule_index: usize, backend_index: usize) -> String {
    join(&[
        "tcproute",
        namespace,
        name,
        &rule_index.to_string(),
        &backend_index.to_string(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gen_id_is_deterministic() {
        let a = gen_id("default_httpbin_r1");
        let b = gen_id("default_httpbin_r1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(a, gen_id("default_httpbin_r2"));
    }

    #[test]
    fn test_gen_id_known_value() {
        // sha256("abc") = ba7816bf8f01cfea414140de5dae2223...
        assert_eq!(gen_id("abc"), "ba7816bf8f01cfea");
    }

    #[test]
    fn test_gen_id_empty() {
        assert_eq!(gen_id(""), "");
    }

    #[test]
    fn test_compose_names() {
        assert_eq!(compose_route_name("default", "httpbin", "r1"), "default_httpbin_r1");
        assert_eq!(compose_upstream_name("default", "svc", 80), "default_svc_80");
        assert_eq!(
            compose_ingress_route_name("default", "ing", "*.foo.com", "/api"),
            "ingress_default_ing_wildcard.foo.com_/api"
        );
        assert!(compose_consumer_name("team-a", "jack.smith").starts_with("team_a_jack_smith_"));
        assert_eq!(compose_tcp_route_name("default", "redis", 0, 1), "tcproute_default_redis_0_1");
    }

    #[test]
    fn test_consumer_names_do_not_collide() {
        let a = compose_consumer_name("team-a", "web");
        let b = compose_consumer_name("team", "a-web");
        assert_ne!(a, b);
        assert!(a.starts_with("team_a_web_"));
        assert!(b.starts_with("team_a_web_"));

        let name = compose_consumer_name("default", "jack");
        assert_eq!(name, format!("default_jack_{}", &gen_id("default/jack")[..8]));
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        assert_eq!(name, compose_consumer_name("default", "jack"));
    }
}
