// Instance suppliers for resources and providers

use std::fmt;
use std::sync::Arc;

/// Lifecycle of a registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// One shared instance for the whole application
    Singleton,
    /// A fresh instance for every request (or provider lookup)
    PerRequest,
}

/// Produces the instance a descriptor is invoked on.
///
/// Singletons are owned here for as long as the registration lives; the
/// composition root that registered them is responsible for any shutdown
/// hooks.
pub enum ObjectFactory<T: ?Sized> {
    Singleton(Arc<T>),
    PerRequest(Arc<dyn Fn() -> Arc<T> + Send + Sync>),
}

impl<T: ?Sized> ObjectFactory<T> {
    pub fn singleton(instance: Arc<T>) -> Self {
        ObjectFactory::Singleton(instance)
    }

    pub fn per_request<F>(factory: F) -> Self
    where
        F: Fn() -> Arc<T> + Send + Sync + 'static,
    {
        ObjectFactory::PerRequest(Arc::new(factory))
    }

    pub fn instance(&self) -> Arc<T> {
        match self {
            ObjectFactory::Singleton(instance) => Arc::clone(instance),
            ObjectFactory::PerRequest(factory) => factory(),
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            ObjectFactory::Singleton(_) => Scope::Singleton,
            ObjectFactory::PerRequest(_) => Scope::PerRequest,
        }
    }
}

impl<T: ?Sized + 'static> ObjectFactory<T> {
    /// Convert to a factory of another (usually unsized) view of `T`,
    /// e.g. `factory.erase(|w| w as Arc<dyn MessageBodyWriter>)`.
    pub fn erase<U: ?Sized + 'static>(self, cast: fn(Arc<T>) -> Arc<U>) -> ObjectFactory<U> {
        match self {
            ObjectFactory::Singleton(instance) => ObjectFactory::Singleton(cast(instance)),
            ObjectFactory::PerRequest(factory) => {
                ObjectFactory::PerRequest(Arc::new(move || cast(factory())))
            }
        }
    }
}

impl<T: ?Sized> Clone for ObjectFactory<T> {
    fn clone(&self) -> Self {
        match self {
            ObjectFactory::Singleton(instance) => ObjectFactory::Singleton(Arc::clone(instance)),
            ObjectFactory::PerRequest(factory) => ObjectFactory::PerRequest(Arc::clone(factory)),
        }
    }
}

impl<T: ?Sized> fmt::Debug for ObjectFactory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectFactory").field(&self.scope()).finish()
    }
}
