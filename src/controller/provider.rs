//! # Controller Provider
//!
//! Wires the running controller together:
//!
//! - loads the gateway cache
//! - starts informers for Services, Endpoints, Secrets and ApisixUpstreams
//!   and waits for them to sync, since every translation reads them
//! - builds one [`Controller`] per watched kind, choosing the served API
//!   version from configuration
//! - requeues dependents when a Service, Endpoints, Secret or ApisixUpstream
//!   changes
//! - resyncs every controller periodically and TCPRoutes whenever Gateway
//!   listeners change

use k8s_openapi::api::core::v1::{Endpoints, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::watcher;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::apisix::cluster::ApisixClient;
use crate::controller::apisix_route::ApisixRouteReconciler;
use crate::controller::consumer::ConsumerReconciler;
use crate::controller::gateway::GatewayReconciler;
use crate::controller::global_rule::GlobalRuleReconciler;
use crate::controller::ingress::IngressReconciler;
use crate::controller::plugin_config::PluginConfigReconciler;
use crate::controller::tcp_route::TcpRouteReconciler;
use crate::controller::tls::TlsReconciler;
use crate::controller::{Controller, ControllerContext, ControllerHandle, Dependency, Reconciler};
use crate::core::config::ControllerConfig;
use crate::core::error::{ControllerError, ControllerResult};
use crate::core::types::ObjectKey;
use crate::k8s::crd::{
    ApisixConsumer, ApisixConsumerV2beta3, ApisixGlobalRule, ApisixPluginConfig, ApisixRoute, ApisixRouteV2beta3,
    ApisixTls, ApisixUpstream, Gateway, IngressV1beta1, TCPRoute,
};
use crate::k8s::directory::{KubeSecretDirectory, KubeServiceDirectory, KubeUpstreamDirectory};
use crate::k8s::objects::SourceObject;
use crate::k8s::status::KubeStatusRecorder;
use crate::k8s::store::{run_informer, LocalStore, Notification};
use crate::manifest::sync::Synchronizer;
use crate::observability::metrics::ControllerMetrics;
use crate::translation::{ListenerTable, Translator};

const NOTIFICATION_BUFFER: usize = 1024;

pub const INGRESS_V1: &str = "networking/v1";
pub const INGRESS_V1BETA1: &str = "networking/v1beta1";
pub const APISIX_ROUTE_V2: &str = "apisix.apache.org/v2";
pub const APISIX_ROUTE_V2BETA3: &str = "apisix.apache.org/v2beta3";
pub const APISIX_CONSUMER_V2: &str = "apisix.apache.org/v2";
pub const APISIX_CONSUMER_V2BETA3: &str = "apisix.apache.org/v2beta3";

/// Builds and runs every controller of the process
pub struct ControllerProvider {
    config: Arc<ControllerConfig>,
    kube: Client,
    apisix: Arc<ApisixClient>,
    metrics: ControllerMetrics,
}

impl ControllerProvider {
    pub fn new(config: Arc<ControllerConfig>, kube: Client, apisix: Arc<ApisixClient>) -> Self {
        Self {
            config,
            kube,
            apisix,
            metrics: ControllerMetrics::new(),
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<DynamicType = ()>,
    {
        Api::all(self.kube.clone())
    }

    /// Run until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> ControllerResult<()> {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            result = self.apisix.sync_cache() => result?,
        }

        let mut tasks = JoinSet::new();
        let (dependency_tx, dependency_rx) = mpsc::channel(NOTIFICATION_BUFFER);

        let services = Arc::new(LocalStore::<Service>::new());
        let endpoints = Arc::new(LocalStore::<Endpoints>::new());
        let secrets = Arc::new(LocalStore::<Secret>::new());
        let upstream_configs = Arc::new(LocalStore::<ApisixUpstream>::new());
        self.spawn_dependency_informer(&mut tasks, services.clone(), Dependency::Service, &dependency_tx, &cancel);
        self.spawn_dependency_informer(&mut tasks, endpoints.clone(), Dependency::Service, &dependency_tx, &cancel);
        self.spawn_dependency_informer(&mut tasks, secrets.clone(), Dependency::Secret, &dependency_tx, &cancel);
        // An ApisixUpstream shares its key with the Service it configures
        self.spawn_dependency_informer(
            &mut tasks,
            upstream_configs.clone(),
            Dependency::Service,
            &dependency_tx,
            &cancel,
        );
        drop(dependency_tx);

        let synced = async {
            tokio::join!(
                services.wait_synced(),
                endpoints.wait_synced(),
                secrets.wait_synced(),
                upstream_configs.wait_synced()
            );
        };
        tokio::select! {
            _ = cancel.cancelled() => {
                tasks.shutdown().await;
                return Ok(());
            }
            _ = synced => info!("Service, Endpoints, Secret and ApisixUpstream caches synced"),
        }

        let class = self.config.kubernetes.ingress_class.as_str();
        let upstream_directory = Arc::new(KubeUpstreamDirectory::new(upstream_configs, class));
        let translator = Translator::new(
            Arc::new(KubeServiceDirectory::new(services, endpoints)),
            Arc::new(KubeSecretDirectory::new(secrets)),
            Arc::new(ListenerTable::new()),
        )
        .with_upstream_configs(upstream_directory.clone());
        let context = ControllerContext {
            synchronizer: Synchronizer::new(self.apisix.clone()),
            status: Arc::new(KubeStatusRecorder::new(self.kube.clone())),
            metrics: self.metrics.clone(),
            config: self.config.clone(),
        };
        let mut handles: Vec<Arc<dyn ControllerHandle>> = Vec::new();

        let ingress = IngressReconciler::new(Arc::new(LocalStore::new()), translator.clone(), class);
        handles.push(match self.config.kubernetes.ingress_version.as_str() {
            INGRESS_V1 => self.spawn_controller::<_, Ingress>(&mut tasks, ingress, &context, &cancel),
            INGRESS_V1BETA1 => self.spawn_controller::<_, IngressV1beta1>(&mut tasks, ingress, &context, &cancel),
            other => return Err(ControllerError::config(format!("Unsupported ingress_version: {}", other))),
        });

        let route = ApisixRouteReconciler::new(Arc::new(LocalStore::new()), translator.clone(), class);
        handles.push(match self.config.kubernetes.apisix_route_version.as_str() {
            APISIX_ROUTE_V2 => self.spawn_controller::<_, ApisixRoute>(&mut tasks, route, &context, &cancel),
            APISIX_ROUTE_V2BETA3 => {
                self.spawn_controller::<_, ApisixRouteV2beta3>(&mut tasks, route, &context, &cancel)
            }
            other => {
                return Err(ControllerError::config(format!(
                    "Unsupported apisix_route_version: {}",
                    other
                )))
            }
        });

        let consumer = ConsumerReconciler::new(Arc::new(LocalStore::new()), translator.clone(), class);
        handles.push(match self.config.kubernetes.apisix_consumer_version.as_str() {
            APISIX_CONSUMER_V2 => self.spawn_controller::<_, ApisixConsumer>(&mut tasks, consumer, &context, &cancel),
            APISIX_CONSUMER_V2BETA3 => {
                self.spawn_controller::<_, ApisixConsumerV2beta3>(&mut tasks, consumer, &context, &cancel)
            }
            other => {
                return Err(ControllerError::config(format!(
                    "Unsupported apisix_consumer_version: {}",
                    other
                )))
            }
        });
        handles.push(self.spawn_controller::<_, ApisixPluginConfig>(
            &mut tasks,
            PluginConfigReconciler::new(Arc::new(LocalStore::new()), translator.clone()),
            &context,
            &cancel,
        ));
        handles.push(self.spawn_controller::<_, ApisixGlobalRule>(
            &mut tasks,
            GlobalRuleReconciler::new(Arc::new(LocalStore::new()), translator.clone()),
            &context,
            &cancel,
        ));
        handles.push(self.spawn_controller::<_, ApisixTls>(
            &mut tasks,
            TlsReconciler::new(Arc::new(LocalStore::new()), translator.clone(), class),
            &context,
            &cancel,
        ));

        if self.config.kubernetes.enable_gateway_api {
            let listeners_changed = Arc::new(Notify::new());
            handles.push(self.spawn_controller::<_, Gateway>(
                &mut tasks,
                GatewayReconciler::new(Arc::new(LocalStore::new()), translator.clone(), listeners_changed.clone()),
                &context,
                &cancel,
            ));
            let tcp_routes = self.spawn_controller::<_, TCPRoute>(
                &mut tasks,
                TcpRouteReconciler::new(Arc::new(LocalStore::new()), translator.clone()),
                &context,
                &cancel,
            );
            handles.push(tcp_routes.clone());
            tasks.spawn(resync_on_listener_change(tcp_routes, listeners_changed, cancel.clone()));
        }

        let handles: Arc<[Arc<dyn ControllerHandle>]> = handles.into();
        tasks.spawn(dispatch_dependencies(
            handles.clone(),
            dependency_rx,
            upstream_directory,
            cancel.clone(),
        ));
        tasks.spawn(periodic_resync(handles.clone(), self.config.kubernetes.resync_interval, cancel.clone()));
        info!(controllers = handles.len(), "Controllers started");

        while let Some(result) = tasks.join_next().await {
            if let Err(err) = result {
                if err.is_panic() {
                    error!(error = %err, "Controller task panicked");
                    cancel.cancel();
                }
            }
        }
        info!("All controllers stopped");
        Ok(())
    }

    /// Start the informer and the event loop of one kind
    ///
    /// `W` is the wire type watched from the API server; it converts into the
    /// reconciler's object type.
    fn spawn_controller<R, W>(
        &self,
        tasks: &mut JoinSet<()>,
        reconciler: R,
        context: &ControllerContext,
        cancel: &CancellationToken,
    ) -> Arc<dyn ControllerHandle>
    where
        R: Reconciler,
        R::Object: From<W>,
        W: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
        let store = reconciler.store().clone();
        let controller = Arc::new(Controller::new(reconciler, context.clone()));

        tasks.spawn(run_informer(
            self.api::<W>(),
            watcher::Config::default(),
            store,
            Some(tx),
            cancel.clone(),
        ));
        tasks.spawn(controller.clone().run(rx, cancel.clone()));
        controller
    }

    /// Start an informer whose changes requeue dependent objects
    fn spawn_dependency_informer<K>(
        &self,
        tasks: &mut JoinSet<()>,
        store: Arc<LocalStore<K>>,
        dependency: fn(ObjectKey) -> Dependency,
        dependencies: &mpsc::Sender<Dependency>,
        cancel: &CancellationToken,
    ) where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<Notification<K>>(NOTIFICATION_BUFFER);
        tasks.spawn(run_informer(self.api::<K>(), watcher::Config::default(), store, Some(tx), cancel.clone()));

        let dependencies = dependencies.clone();
        tasks.spawn(async move {
            while let Some(notification) = rx.recv().await {
                let key = match &notification {
                    Notification::Added(object) | Notification::Deleted(object) => object.key(),
                    Notification::Updated { new, .. } => new.key(),
                };
                if dependencies.send(dependency(key)).await.is_err() {
                    break;
                }
            }
        });
    }
}

/// Every dependency a change of `changed` touches
///
/// A Secret used as an ApisixUpstream client certificate also touches the
/// Service that ApisixUpstream configures.
fn expand_dependency(changed: Dependency, upstreams: &KubeUpstreamDirectory) -> Vec<Dependency> {
    let mut touched = Vec::new();
    if let Dependency::Secret(secret) = &changed {
        touched.extend(upstreams.services_using_secret(secret).into_iter().map(Dependency::Service));
    }
    touched.push(changed);
    touched
}

async fn dispatch_dependencies(
    handles: Arc<[Arc<dyn ControllerHandle>]>,
    mut dependencies: mpsc::Receiver<Dependency>,
    upstreams: Arc<KubeUpstreamDirectory>,
    cancel: CancellationToken,
) {
    loop {
        let changed = tokio::select! {
            _ = cancel.cancelled() => break,
            dependency = dependencies.recv() => match dependency {
                Some(dependency) => dependency,
                None => break,
            },
        };
        for dependency in expand_dependency(changed, &upstreams) {
            for handle in handles.iter() {
                handle.requeue_dependents(&dependency);
            }
        }
    }
}

async fn periodic_resync(
    handles: Arc<[Arc<dyn ControllerHandle>]>,
    period: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                info!("Resyncing all controllers");
                for handle in handles.iter() {
                    let queued = handle.resync();
                    debug!(resource = handle.kind(), queued = queued, "Resync queued");
                }
            }
        }
    }
}

async fn resync_on_listener_change(
    tcp_routes: Arc<dyn ControllerHandle>,
    listeners_changed: Arc<Notify>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = listeners_changed.notified() => {
                let queued = tcp_routes.resync();
                info!(queued = queued, "Gateway listeners changed, resyncing TCPRoutes");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::testing::Harness;
    use crate::k8s::crd::{BackendRef, GatewayListener, GatewaySpec, ParentReference, TCPRouteRule, TCPRouteSpec};
    use crate::translation::testing::{translator_with, FakeSecrets, FakeServices};
    use std::time::Duration;

    #[test]
    fn test_upstream_tls_secret_touches_its_service() {
        use crate::k8s::crd::{ApisixSecret, ApisixUpstreamConfig, ApisixUpstreamSpec};

        let store = Arc::new(LocalStore::new());
        let mut upstream = ApisixUpstream::new(
            "httpbin",
            ApisixUpstreamSpec {
                config: ApisixUpstreamConfig {
                    tls_secret: Some(ApisixSecret {
                        name: "client-cert".to_string(),
                        namespace: "default".to_string(),
                    }),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        upstream.metadata.namespace = Some("default".to_string());
        store.insert(upstream);
        let directory = KubeUpstreamDirectory::new(store, "apisix");

        let secret = ObjectKey::new("default", "client-cert");
        assert_eq!(
            expand_dependency(Dependency::Secret(secret.clone()), &directory),
            vec![
                Dependency::Service(ObjectKey::new("default", "httpbin")),
                Dependency::Secret(secret),
            ]
        );
        let other = Dependency::Secret(ObjectKey::new("default", "other"));
        assert_eq!(expand_dependency(other.clone(), &directory), vec![other]);
    }

    #[tokio::test]
    async fn test_periodic_resync_requeues_everything() {
        let harness = Harness::start().await;
        let store = Arc::new(LocalStore::new());
        let mut gw = Gateway::new("gw", GatewaySpec::default());
        gw.metadata.namespace = Some("default".to_string());
        store.apply(gw);

        let translator = translator_with(FakeServices::default(), FakeSecrets::default());
        let controller = Arc::new(Controller::new(
            GatewayReconciler::new(store, translator, Arc::new(Notify::new())),
            harness.context(3),
        ));
        let handles: Arc<[Arc<dyn ControllerHandle>]> = vec![controller.clone() as Arc<dyn ControllerHandle>].into();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(periodic_resync(handles, Duration::from_millis(20), cancel.clone()));
        tokio::time::timeout(Duration::from_secs(1), async {
            while controller.queue().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_listener_change_resyncs_tcp_routes() {
        let harness = Harness::start().await;
        let services = FakeServices::default().with("default", "redis", "redis", 6379, &["10.0.2.1"]);
        let translator = translator_with(services, FakeSecrets::default());
        let context = harness.context(3);

        let tcp_store = Arc::new(LocalStore::new());
        let mut route = TCPRoute::new(
            "redis",
            TCPRouteSpec {
                parent_refs: vec![ParentReference {
                    name: "gw".to_string(),
                    ..Default::default()
                }],
                rules: vec![TCPRouteRule {
                    backend_refs: vec![BackendRef {
                        name: "redis".to_string(),
                        port: Some(6379),
                        ..Default::default()
                    }],
                }],
            },
        );
        route.metadata.namespace = Some("default".to_string());
        tcp_store.apply(route);
        let tcp_routes = Arc::new(Controller::new(
            TcpRouteReconciler::new(tcp_store, translator.clone()),
            context.clone(),
        ));

        let listeners_changed = Arc::new(Notify::new());
        let gateways = Controller::new(
            GatewayReconciler::new(Arc::new(LocalStore::new()), translator, listeners_changed.clone()),
            context,
        );
        let cancel = CancellationToken::new();
        let task = tokio::spawn(resync_on_listener_change(
            tcp_routes.clone(),
            listeners_changed,
            cancel.clone(),
        ));

        let mut gw = Gateway::new(
            "gw",
            GatewaySpec {
                gateway_class_name: "apisix".to_string(),
                listeners: vec![GatewayListener {
                    name: "tcp".to_string(),
                    hostname: None,
                    port: 9100,
                    protocol: "TCP".to_string(),
                }],
            },
        );
        gw.metadata.namespace = Some("default".to_string());
        let notification = gateways.reconciler().store().apply(gw);
        gateways.handle_notification(notification);
        assert!(gateways.process_next().await);

        tokio::time::timeout(Duration::from_secs(1), async {
            while tcp_routes.queue().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(tcp_routes.process_next().await);
        assert_eq!(
            harness.take_log(),
            vec![
                format!("PUT /upstreams/{}", crate::identity::gen_id("default_redis_6379")),
                format!(
                    "PUT /stream_routes/{}",
                    crate::identity::gen_id("tcproute_default_redis_0_0")
                ),
            ]
        );

        // Deleting the Gateway detaches the route from the gateway
        let stored = gateways.reconciler().store().get(&ObjectKey::new("default", "gw")).unwrap();
        let notification = gateways.reconciler().store().delete((*stored).clone());
        gateways.handle_notification(notification);
        assert!(gateways.process_next().await);

        tokio::time::timeout(Duration::from_secs(1), async {
            while tcp_routes.queue().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(tcp_routes.process_next().await);
        assert_eq!(
            harness.take_log(),
            vec![
                format!(
                    "DELETE /stream_routes/{}",
                    crate::identity::gen_id("tcproute_default_redis_0_0")
                ),
                format!("DELETE /upstreams/{}", crate::identity::gen_id("default_redis_6379")),
            ]
        );
        let synced = tcp_routes.last_manifest(&ObjectKey::new("default", "redis")).unwrap();
        assert!(synced.is_empty());

        cancel.cancel();
        task.await.unwrap();
    }
}
