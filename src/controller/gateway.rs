//! Gateway reconciliation.
//!
//! A Gateway produces no gateway entities. Its sync keeps the shared
//! [`ListenerTable`] current and signals listener changes so TCPRoutes can be
//! translated again.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

use crate::controller::Reconciler;
use crate::core::error::ControllerResult;
use crate::core::types::Event;
use crate::k8s::crd::Gateway;
use crate::k8s::objects::SourceObject;
use crate::k8s::store::LocalStore;
use crate::manifest::Manifest;
use crate::translation::{ListenerTable, Translator};

pub struct GatewayReconciler {
    store: Arc<LocalStore<Gateway>>,
    translator: Translator,
    listeners_changed: Arc<Notify>,
}

impl GatewayReconciler {
    pub fn new(store: Arc<LocalStore<Gateway>>, translator: Translator, listeners_changed: Arc<Notify>) -> Self {
        Self {
            store,
            translator,
            listeners_changed,
        }
    }

    pub fn listeners(&self) -> &Arc<ListenerTable> {
        self.translator.listeners()
    }
}

#[async_trait]
impl Reconciler for GatewayReconciler {
    type Object = Gateway;
    const KIND: &'static str = "Gateway";

    fn store(&self) -> &Arc<LocalStore<Gateway>> {
        &self.store
    }

    /// Validates the listeners
    fn translate(&self, object: &Gateway) -> ControllerResult<Manifest> {
        self.translator.translate_gateway(object)?;
        Ok(Manifest::new())
    }

    async fn after_sync(&self, event: &Event<Gateway>, current: Option<&Gateway>) -> ControllerResult<()> {
        let changed = match current {
            Some(gateway) => {
                let listeners = self.translator.translate_gateway(gateway)?;
                self.listeners().set(event.key.clone(), listeners)
            }
            None => self.listeners().remove(&event.key),
        };
        if changed {
            info!(gateway = %event.key, "Gateway listeners changed");
            self.listeners_changed.notify_one();
        }
        Ok(())
    }
}
