//! Resource declarations compiled into immutable descriptors.
//!
//! A resource type implements [`Resource`] and declares its methods,
//! sub-resource methods and sub-resource locators through a
//! [`ResourceBuilder`]. [`ResourceDescriptor::of`] validates the declaration
//! once and produces the plain data the dispatcher walks.
//!
//! # Examples
//!
//! ```
//! use tessera_core::{ApplicationContext, Resource, ResourceBuilder, ResourceDescriptor};
//!
//! struct Books;
//!
//! impl Resource for Books {
//!     fn path() -> Option<&'static str> {
//!         Some("/books/{id}")
//!     }
//!
//!     fn describe(r: &mut ResourceBuilder<Self>) {
//!         r.get(|_, ctx: &mut ApplicationContext| Ok(format!("book {}", ctx.path_param("id").unwrap_or_default())))
//!             .produces(&["text/plain"]);
//!         r.delete(|_, _| Ok(()));
//!     }
//! }
//!
//! let descriptor = ResourceDescriptor::of::<Books>().unwrap();
//! assert_eq!(descriptor.allowed_methods(), ["DELETE", "GET"]);
//! ```

use crate::context::ApplicationContext;
use crate::error::ResourceError;
use crate::http::Outcome;
use crate::media_type::{MediaType, parse_media_types};
use crate::uri_pattern::UriPattern;
use crate::Error;
use http::Method;
use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

// ============================================================================
// Resource trait
// ============================================================================

/// A type whose instances handle requests.
pub trait Resource: Any + Send + Sync {
    /// Root URI template. Required for resources registered directly,
    /// ignored for resources reached through a locator.
    fn path() -> Option<&'static str>
    where
        Self: Sized,
    {
        None
    }

    /// Declare the methods and locators of this resource.
    fn describe(builder: &mut ResourceBuilder<Self>)
    where
        Self: Sized;

    /// Called once a per-request instance is no longer needed.
    fn destroy(&self) -> Result<(), ResourceError> {
        Ok(())
    }
}

/// A resource instance as handlers receive it.
pub type ResourceRef<'a> = &'a (dyn Resource + 'static);

pub(crate) type MethodHandler = Arc<
    dyn Fn(ResourceRef<'_>, &mut ApplicationContext) -> Result<Outcome, ResourceError> + Send + Sync,
>;

pub(crate) type LocatorHandler = Arc<
    dyn Fn(ResourceRef<'_>, &mut ApplicationContext) -> Result<Located, ResourceError> + Send + Sync,
>;

fn method_handler<F>(handler: F) -> MethodHandler
where
    F: Fn(ResourceRef<'_>, &mut ApplicationContext) -> Result<Outcome, ResourceError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(handler)
}

fn locator_handler<F>(handler: F) -> LocatorHandler
where
    F: Fn(ResourceRef<'_>, &mut ApplicationContext) -> Result<Located, ResourceError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(handler)
}

fn downcast<R: Resource>(instance: ResourceRef<'_>) -> Result<&R, ResourceError> {
    let any: &dyn Any = instance;
    any.downcast_ref::<R>().ok_or_else(|| {
        Error::Internal(format!(
            "handler of {} invoked on a different resource type",
            std::any::type_name::<R>()
        ))
        .into()
    })
}

// ============================================================================
// Located sub-resources
// ============================================================================

/// Resource instance returned by a sub-resource locator.
pub struct Located {
    pub(crate) instance: Arc<dyn Resource>,
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) describe: fn() -> Result<ResourceDescriptor, Error>,
}

impl Located {
    pub fn new<R: Resource>(resource: R) -> Self {
        Self::from_arc(Arc::new(resource))
    }

    pub fn from_arc<R: Resource>(resource: Arc<R>) -> Self {
        Self {
            instance: resource,
            type_id: TypeId::of::<R>(),
            type_name: std::any::type_name::<R>(),
            describe: ResourceDescriptor::of_located::<R>,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Located {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Located").field(&self.type_name).finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Declaration of one resource or sub-resource method.
pub struct MethodSpec {
    verb: Method,
    path: Option<String>,
    consumes: Vec<String>,
    produces: Vec<String>,
    name: Option<String>,
    handler: MethodHandler,
}

impl MethodSpec {
    /// Bind the method to a sub-path, making it a sub-resource method.
    pub fn path(&mut self, path: &str) -> &mut Self {
        self.path = Some(path.to_string());
        self
    }

    pub fn consumes(&mut self, types: &[&str]) -> &mut Self {
        self.consumes.extend(types.iter().map(|t| t.to_string()));
        self
    }

    pub fn produces(&mut self, types: &[&str]) -> &mut Self {
        self.produces.extend(types.iter().map(|t| t.to_string()));
        self
    }

    /// Name used in logs and error messages.
    pub fn name(&mut self, name: &str) -> &mut Self {
        self.name = Some(name.to_string());
        self
    }
}

/// Declaration of one sub-resource locator.
pub struct LocatorSpec {
    path: String,
    name: Option<String>,
    handler: LocatorHandler,
}

impl LocatorSpec {
    pub fn name(&mut self, name: &str) -> &mut Self {
        self.name = Some(name.to_string());
        self
    }
}

/// Collects the declarations of resource type `R`.
pub struct ResourceBuilder<R> {
    methods: Vec<MethodSpec>,
    locators: Vec<LocatorSpec>,
    _resource: PhantomData<fn(&R)>,
}

impl<R: Resource> ResourceBuilder<R> {
    fn new() -> Self {
        Self {
            methods: Vec::new(),
            locators: Vec::new(),
            _resource: PhantomData,
        }
    }

    /// Declare a method for `verb`.
    pub fn method<F, O>(&mut self, verb: Method, handler: F) -> &mut MethodSpec
    where
        F: Fn(&R, &mut ApplicationContext) -> Result<O, ResourceError> + Send + Sync + 'static,
        O: Into<Outcome> + 'static,
    {
        let handler = method_handler(move |instance, ctx| {
            let resource = downcast::<R>(instance)?;
            handler(resource, ctx).map(Into::into)
        });
        self.methods.push(MethodSpec {
            verb,
            path: None,
            consumes: Vec::new(),
            produces: Vec::new(),
            name: None,
            handler,
        });
        let last = self.methods.len() - 1;
        &mut self.methods[last]
    }

    pub fn get<F, O>(&mut self, handler: F) -> &mut MethodSpec
    where
        F: Fn(&R, &mut ApplicationContext) -> Result<O, ResourceError> + Send + Sync + 'static,
        O: Into<Outcome> + 'static,
    {
        self.method(Method::GET, handler)
    }

    pub fn post<F, O>(&mut self, handler: F) -> &mut MethodSpec
    where
        F: Fn(&R, &mut ApplicationContext) -> Result<O, ResourceError> + Send + Sync + 'static,
        O: Into<Outcome> + 'static,
    {
        self.method(Method::POST, handler)
    }

    pub fn put<F, O>(&mut self, handler: F) -> &mut MethodSpec
    where
        F: Fn(&R, &mut ApplicationContext) -> Result<O, ResourceError> + Send + Sync + 'static,
        O: Into<Outcome> + 'static,
    {
        self.method(Method::PUT, handler)
    }

    pub fn delete<F, O>(&mut self, handler: F) -> &mut MethodSpec
    where
        F: Fn(&R, &mut ApplicationContext) -> Result<O, ResourceError> + Send + Sync + 'static,
        O: Into<Outcome> + 'static,
    {
        self.method(Method::DELETE, handler)
    }

    /// Declare a sub-resource locator at `path`.
    pub fn locator<F>(&mut self, path: &str, handler: F) -> &mut LocatorSpec
    where
        F: Fn(&R, &mut ApplicationContext) -> Result<Located, ResourceError> + Send + Sync + 'static,
    {
        let handler = locator_handler(move |instance, ctx| {
            let resource = downcast::<R>(instance)?;
            handler(resource, ctx)
        });
        self.locators.push(LocatorSpec {
            path: path.to_string(),
            name: None,
            handler,
        });
        let last = self.locators.len() - 1;
        &mut self.locators[last]
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// A compiled resource method or sub-resource method.
pub struct ResourceMethodDescriptor {
    verb: Method,
    name: String,
    /// Set for sub-resource methods.
    path: Option<UriPattern>,
    consumes: Vec<MediaType>,
    produces: Vec<MediaType>,
    handler: MethodHandler,
}

impl ResourceMethodDescriptor {
    pub fn verb(&self) -> &Method {
        &self.verb
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&UriPattern> {
        self.path.as_ref()
    }

    pub fn consumes(&self) -> &[MediaType] {
        &self.consumes
    }

    pub fn produces(&self) -> &[MediaType] {
        &self.produces
    }

    pub fn is_sub_resource_method(&self) -> bool {
        self.path.is_some()
    }

    pub(crate) fn invoke(
        &self,
        instance: ResourceRef<'_>,
        ctx: &mut ApplicationContext,
    ) -> Result<Outcome, ResourceError> {
        (self.handler)(instance, ctx)
    }

    /// Lists are sorted, so the last entries are the least specific.
    fn compare(&self, other: &Self) -> Ordering {
        compare_last(&self.consumes, &other.consumes)
            .then_with(|| compare_last(&self.produces, &other.produces))
            .then_with(|| self.consumes.len().cmp(&other.consumes.len()))
            .then_with(|| self.produces.len().cmp(&other.produces.len()))
    }

    fn same_media_types(&self, other: &Self) -> bool {
        self.consumes == other.consumes && self.produces == other.produces
    }
}

fn compare_last(a: &[MediaType], b: &[MediaType]) -> Ordering {
    match (a.last(), b.last()) {
        (Some(a), Some(b)) => a.compare_specificity(b),
        _ => Ordering::Equal,
    }
}

impl fmt::Debug for ResourceMethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceMethodDescriptor")
            .field("verb", &self.verb)
            .field("name", &self.name)
            .field("path", &self.path)
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .finish()
    }
}

/// A compiled sub-resource locator.
pub struct SubResourceLocatorDescriptor {
    name: String,
    path: UriPattern,
    handler: LocatorHandler,
}

impl SubResourceLocatorDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &UriPattern {
        &self.path
    }

    pub(crate) fn invoke(
        &self,
        instance: ResourceRef<'_>,
        ctx: &mut ApplicationContext,
    ) -> Result<Located, ResourceError> {
        (self.handler)(instance, ctx)
    }
}

impl fmt::Debug for SubResourceLocatorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubResourceLocatorDescriptor")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

/// Methods grouped by verb name, each group ordered most specific first.
pub type MethodMap = BTreeMap<String, Vec<Arc<ResourceMethodDescriptor>>>;

/// Sub-resource methods sharing one child pattern.
#[derive(Debug)]
pub struct SubResourceMethods {
    pub pattern: UriPattern,
    pub methods: MethodMap,
}

/// Everything the dispatcher needs to know about one resource type.
#[derive(Debug)]
pub struct ResourceDescriptor {
    type_id: TypeId,
    type_name: &'static str,
    path: Option<UriPattern>,
    methods: MethodMap,
    sub_resource_methods: Vec<SubResourceMethods>,
    locators: Vec<Arc<SubResourceLocatorDescriptor>>,
}

impl ResourceDescriptor {
    /// Compile a root resource; its path is required and must not be empty.
    pub fn of<R: Resource>() -> Result<Self, Error> {
        let path = R::path().ok_or_else(|| {
            Error::InvalidResource(format!(
                "{} is registered as a root resource but declares no path",
                std::any::type_name::<R>()
            ))
        })?;
        if path.is_empty() {
            return Err(Error::InvalidResource(format!(
                "{} is a root resource but its path is empty",
                std::any::type_name::<R>()
            )));
        }
        Self::compile::<R>(Some(UriPattern::new(path)?))
    }

    /// Compile a resource reached through a locator.
    pub fn of_located<R: Resource>() -> Result<Self, Error> {
        Self::compile::<R>(None)
    }

    fn compile<R: Resource>(path: Option<UriPattern>) -> Result<Self, Error> {
        let type_name = std::any::type_name::<R>();
        let mut builder = ResourceBuilder::<R>::new();
        R::describe(&mut builder);

        if builder.methods.is_empty() && builder.locators.is_empty() {
            return Err(Error::InvalidResource(format!(
                "no resource methods, sub-resource methods or sub-resource locators in {}",
                type_name
            )));
        }

        let mut methods = MethodMap::new();
        let mut sub_resource_methods: Vec<SubResourceMethods> = Vec::new();

        for spec in builder.methods {
            let name = spec
                .name
                .unwrap_or_else(|| format!("{}::{}", type_name, spec.verb));
            let pattern = match spec.path.as_deref() {
                None => None,
                Some("") => {
                    return Err(Error::InvalidResource(format!(
                        "path is empty for sub-resource method {}",
                        name
                    )));
                }
                Some(p) => Some(UriPattern::new(p)?),
            };
            let descriptor = Arc::new(ResourceMethodDescriptor {
                verb: spec.verb,
                name,
                path: pattern.clone(),
                consumes: media_types(&spec.consumes)?,
                produces: media_types(&spec.produces)?,
                handler: spec.handler,
            });

            let map = match pattern {
                None => &mut methods,
                Some(pattern) => {
                    let index = match sub_resource_methods.iter().position(|s| s.pattern == pattern) {
                        Some(index) => index,
                        None => {
                            sub_resource_methods.push(SubResourceMethods {
                                pattern,
                                methods: MethodMap::new(),
                            });
                            sub_resource_methods.len() - 1
                        }
                    };
                    &mut sub_resource_methods[index].methods
                }
            };
            add_method(map, descriptor)?;
        }

        let mut locators: Vec<Arc<SubResourceLocatorDescriptor>> = Vec::new();
        for spec in builder.locators {
            let name = spec
                .name
                .unwrap_or_else(|| format!("{}::locator({})", type_name, spec.path));
            if spec.path.is_empty() {
                return Err(Error::InvalidResource(format!(
                    "path is empty for sub-resource locator {}",
                    name
                )));
            }
            let pattern = UriPattern::new(&spec.path)?;
            if let Some(existing) = locators.iter().find(|l| l.path == pattern) {
                return Err(Error::DuplicateResourceMethod(format!(
                    "two sub-resource locators {} and {} have the same path {}",
                    name, existing.name, pattern
                )));
            }
            locators.push(Arc::new(SubResourceLocatorDescriptor {
                name,
                path: pattern,
                handler: spec.handler,
            }));
        }

        for group in methods.values_mut() {
            group.sort_by(|a, b| a.compare(b));
        }
        for sub in &mut sub_resource_methods {
            for group in sub.methods.values_mut() {
                group.sort_by(|a, b| a.compare(b));
            }
        }
        sub_resource_methods.sort_by(|a, b| a.pattern.cmp(&b.pattern));
        locators.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(Self {
            type_id: TypeId::of::<R>(),
            type_name,
            path,
            methods,
            sub_resource_methods,
            locators,
        })
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Root pattern; `None` for resources reached through a locator.
    pub fn path(&self) -> Option<&UriPattern> {
        self.path.as_ref()
    }

    pub fn methods(&self) -> &MethodMap {
        &self.methods
    }

    /// Sub-resource method groups, most specific pattern first.
    pub fn sub_resource_methods(&self) -> &[SubResourceMethods] {
        &self.sub_resource_methods
    }

    /// Locators, most specific pattern first.
    pub fn locators(&self) -> &[Arc<SubResourceLocatorDescriptor>] {
        &self.locators
    }

    pub fn has_sub_resources(&self) -> bool {
        !self.sub_resource_methods.is_empty() || !self.locators.is_empty()
    }

    /// Verbs with at least one declared resource method.
    pub fn allowed_methods(&self) -> Vec<&str> {
        allowed(&self.methods)
    }
}

/// Verb names of a method map, in map order.
pub fn allowed(methods: &MethodMap) -> Vec<&str> {
    methods
        .iter()
        .filter(|(_, group)| !group.is_empty())
        .map(|(verb, _)| verb.as_str())
        .collect()
}

fn media_types(raw: &[String]) -> Result<Vec<MediaType>, Error> {
    let raw: Vec<&str> = raw.iter().map(String::as_str).collect();
    parse_media_types(&raw)
}

fn add_method(map: &mut MethodMap, descriptor: Arc<ResourceMethodDescriptor>) -> Result<(), Error> {
    let group = map.entry(descriptor.verb.as_str().to_string()).or_default();
    if let Some(existing) = group.iter().find(|m| m.same_media_types(&descriptor)) {
        return Err(Error::DuplicateResourceMethod(format!(
            "two resource methods {} and {} with the same HTTP method, consumes and produces",
            descriptor.name, existing.name
        )));
    }
    group.push(descriptor);
    Ok(())
}
