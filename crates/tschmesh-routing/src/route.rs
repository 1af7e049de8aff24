//! Default-route lookup

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tschmesh_protocol::Eui64;

/// Source of default routes
///
/// Routes are ordered destination first. The DAG root may be omitted; the
/// track manager appends it.
#[async_trait]
pub trait RouteProvider: Send + Sync {
    async fn source_route(&self, destination: Eui64) -> Option<Vec<Eui64>>;
}

/// Fixed route table
#[derive(Debug, Default)]
pub struct StaticRoutes {
    routes: RwLock<BTreeMap<Eui64, Vec<Eui64>>>,
}

impl StaticRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the route for a destination, which must be `route[0]`
    pub async fn insert(&self, route: Vec<Eui64>) {
        if let Some(destination) = route.first().copied() {
            self.routes.write().await.insert(destination, route);
        }
    }

    pub async fn remove(&self, destination: &Eui64) -> Option<Vec<Eui64>> {
        self.routes.write().await.remove(destination)
    }
}

#[async_trait]
impl RouteProvider for StaticRoutes {
    async fn source_route(&self, destination: Eui64) -> Option<Vec<Eui64>> {
        self.routes.read().await.get(&destination).cloned()
    }
}
