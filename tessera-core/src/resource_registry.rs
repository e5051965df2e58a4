//! Registry of root resources.
//!
//! Resources are kept sorted by the specificity of their root pattern, so
//! [`ResourceRegistry::find`] returns the most specific match. Registration
//! and removal publish a new snapshot; dispatch reads the current one
//! without locking.
//!
//! # Examples
//!
//! ```
//! use tessera_core::{Resource, ResourceBuilder, ResourceRegistry};
//!
//! #[derive(Default)]
//! struct Health;
//!
//! impl Resource for Health {
//!     fn path() -> Option<&'static str> {
//!         Some("/health")
//!     }
//!
//!     fn describe(r: &mut ResourceBuilder<Self>) {
//!         r.get(|_, _| Ok("ok"));
//!     }
//! }
//!
//! let registry = ResourceRegistry::new();
//! registry.add_singleton(Health).unwrap();
//!
//! let (resource, m) = registry.find("/health").unwrap();
//! assert_eq!(resource.type_name(), std::any::type_name::<Health>());
//! assert!(m.is_terminal());
//! ```

use crate::component::{ObjectFactory, Scope};
use crate::resource::{Resource, ResourceDescriptor};
use crate::snapshot::SnapshotCell;
use crate::uri_pattern::{UriMatch, UriPattern};
use crate::Error;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Property holding a resource's expiry time in epoch milliseconds.
pub const RESOURCE_EXPIRATION_PROPERTY: &str = "tessera.resource.expiration";

/// A registered root resource: its compiled descriptor, its instance
/// supplier and free-form properties.
#[derive(Clone)]
pub struct RootResource {
    descriptor: Arc<ResourceDescriptor>,
    pattern: UriPattern,
    factory: ObjectFactory<dyn Resource>,
    properties: HashMap<String, String>,
}

impl RootResource {
    /// One shared instance serves every request.
    pub fn singleton<R: Resource>(instance: R) -> Result<Self, Error> {
        let factory = ObjectFactory::singleton(Arc::new(instance)).erase(|r| r as Arc<dyn Resource>);
        Self::with_factory::<R>(factory)
    }

    /// `factory` is called for every request that reaches the resource.
    pub fn per_request<R, F>(factory: F) -> Result<Self, Error>
    where
        R: Resource,
        F: Fn() -> R + Send + Sync + 'static,
    {
        let factory = ObjectFactory::per_request(move || Arc::new(factory()) as Arc<dyn Resource>);
        Self::with_factory::<R>(factory)
    }

    fn with_factory<R: Resource>(factory: ObjectFactory<dyn Resource>) -> Result<Self, Error> {
        let descriptor = ResourceDescriptor::of::<R>()?;
        let pattern = descriptor.path().cloned().ok_or_else(|| {
            Error::InvalidResource(format!("{} has no root path", descriptor.type_name()))
        })?;
        Ok(Self {
            descriptor: Arc::new(descriptor),
            pattern,
            factory,
            properties: HashMap::new(),
        })
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Expire the resource at `at`.
    pub fn expires_at(self, at: SystemTime) -> Self {
        let millis = at
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis();
        self.with_property(RESOURCE_EXPIRATION_PROPERTY, millis.to_string())
    }

    pub fn descriptor(&self) -> &Arc<ResourceDescriptor> {
        &self.descriptor
    }

    pub fn pattern(&self) -> &UriPattern {
        &self.pattern
    }

    pub fn type_id(&self) -> TypeId {
        self.descriptor.type_id()
    }

    pub fn type_name(&self) -> &'static str {
        self.descriptor.type_name()
    }

    pub fn scope(&self) -> Scope {
        self.factory.scope()
    }

    pub fn instance(&self) -> Arc<dyn Resource> {
        self.factory.instance()
    }

    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Expiry in epoch milliseconds; an unparsable value means no expiry.
    pub fn expiration(&self) -> Option<u64> {
        self.property(RESOURCE_EXPIRATION_PROPERTY)
            .and_then(|v| v.trim().parse().ok())
    }
}

impl fmt::Debug for RootResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootResource")
            .field("type", &self.type_name())
            .field("pattern", &self.pattern)
            .field("scope", &self.scope())
            .field("properties", &self.properties)
            .finish()
    }
}

/// Notified after resources are added or removed.
pub trait ResourceListener: Send + Sync {
    fn resource_added(&self, _resource: &RootResource) {}

    fn resource_removed(&self, _resource: &RootResource) {}
}

/// Process-wide set of root resources.
pub struct ResourceRegistry {
    resources: SnapshotCell<Vec<Arc<RootResource>>>,
    listeners: RwLock<Vec<Arc<dyn ResourceListener>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self {
            resources: SnapshotCell::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn ResourceListener>) {
        self.listeners.write().push(listener);
    }

    /// Register `resource`.
    ///
    /// Returns `Ok(false)` when the same resource type is already
    /// registered under the same pattern. A different type under an
    /// identical pattern is rejected.
    pub fn add_resource(&self, resource: RootResource) -> Result<bool, Error> {
        let resource = Arc::new(resource);
        let added = self.resources.update(|list| {
            if let Some(existing) = list.iter().find(|r| r.pattern == resource.pattern) {
                if existing.type_id() == resource.type_id() {
                    return Ok(false);
                }
                return Err(Error::DuplicateResource(format!(
                    "resource {} and {} have the same path {}",
                    resource.type_name(),
                    existing.type_name(),
                    resource.pattern
                )));
            }
            list.push(Arc::clone(&resource));
            list.sort_by(|a, b| a.pattern.cmp(&b.pattern));
            Ok(true)
        })?;

        if added {
            info!(
                resource = resource.type_name(),
                path = resource.pattern.template(),
                scope = ?resource.scope(),
                "Resource registered"
            );
            self.notify(|l| l.resource_added(&resource));
        } else {
            warn!(
                resource = resource.type_name(),
                path = resource.pattern.template(),
                "Resource already registered, ignoring"
            );
        }
        Ok(added)
    }

    pub fn add_singleton<R: Resource>(&self, instance: R) -> Result<bool, Error> {
        self.add_resource(RootResource::singleton(instance)?)
    }

    pub fn add_per_request<R, F>(&self, factory: F) -> Result<bool, Error>
    where
        R: Resource,
        F: Fn() -> R + Send + Sync + 'static,
    {
        self.add_resource(RootResource::per_request(factory)?)
    }

    /// Most specific resource matching `path`.
    ///
    /// A match that leaves a deeper path only counts when the resource has
    /// sub-resource methods or locators to consume it.
    pub fn find(&self, path: &str) -> Option<(Arc<RootResource>, UriMatch)> {
        let resources = self.resources.load();
        resources.iter().find_map(|resource| {
            let m = resource.pattern.match_uri(path)?;
            if m.is_terminal() || resource.descriptor.has_sub_resources() {
                Some((Arc::clone(resource), m))
            } else {
                None
            }
        })
    }

    /// Remove the resource of type `R`.
    pub fn remove<R: Resource>(&self) -> Option<Arc<RootResource>> {
        let type_id = TypeId::of::<R>();
        self.remove_where(|r| r.type_id() == type_id)
    }

    /// Remove the resource registered under `path`.
    pub fn remove_by_path(&self, path: &str) -> Result<Option<Arc<RootResource>>, Error> {
        let pattern = UriPattern::new(path)?;
        Ok(self.remove_where(|r| r.pattern == pattern))
    }

    fn remove_where(&self, predicate: impl Fn(&RootResource) -> bool) -> Option<Arc<RootResource>> {
        let removed = self.resources.modify(|list| {
            let index = list.iter().position(|r| predicate(r))?;
            Some(list.remove(index))
        })?;
        debug!(resource = removed.type_name(), path = removed.pattern.template(), "Resource removed");
        self.notify(|l| l.resource_removed(&removed));
        Some(removed)
    }

    /// Remove every resource whose expiry is at or before `now_millis`.
    /// Returns how many were removed.
    pub fn remove_expired(&self, now_millis: u64) -> usize {
        let expired = self.resources.modify(|list| {
            let (expired, live): (Vec<_>, Vec<_>) = list
                .drain(..)
                .partition(|r| r.expiration().is_some_and(|at| at <= now_millis));
            *list = live;
            expired
        });
        for resource in &expired {
            info!(resource = resource.type_name(), path = resource.pattern.template(), "Resource expired");
            self.notify(|l| l.resource_removed(resource));
        }
        expired.len()
    }

    /// Run [`remove_expired`](Self::remove_expired) every `interval`.
    pub fn spawn_expiry_cleaner(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            // first tick completes immediately
            timer.tick().await;
            loop {
                timer.tick().await;
                let removed = registry.remove_expired(now_millis());
                if removed > 0 {
                    debug!(removed, "Expired resources removed");
                }
            }
        })
    }

    /// Registered resources, most specific pattern first.
    pub fn resources(&self) -> Vec<Arc<RootResource>> {
        self.resources.load().as_ref().clone()
    }

    pub fn len(&self) -> usize {
        self.resources.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.load().is_empty()
    }

    /// Remove everything, notifying listeners for each resource.
    pub fn clear(&self) {
        let removed = self.resources.modify(std::mem::take);
        for resource in &removed {
            self.notify(|l| l.resource_removed(resource));
        }
    }

    fn notify(&self, f: impl Fn(&dyn ResourceListener)) {
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            f(listener.as_ref());
        }
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("resources", &self.resources.load())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
