//! Request dispatch over the resource tree.
//!
//! Dispatch matches the request path against the root resources, then
//! walks down: a path consumed by the root goes to one of its resource
//! methods, a longer path goes to a sub-resource method or a sub-resource
//! locator. A locator returns another resource instance and dispatch
//! continues on it with whatever its pattern left over.
//!
//! No-match conditions are answered with responses (404, 405, 406, 415).
//! Errors returned by resource code propagate unchanged.

use crate::component::Scope;
use crate::config::DispatcherConfig;
use crate::content_negotiation::{acceptable_media_type, process_quality};
use crate::context::ApplicationContext;
use crate::error::ResourceError;
use crate::http::{HttpRequest, HttpResponse};
use crate::resource::{
    Located, MethodMap, Resource, ResourceDescriptor, ResourceMethodDescriptor,
    SubResourceLocatorDescriptor, allowed,
};
use crate::resource_registry::ResourceRegistry;
use crate::response;
use crate::uri_pattern::UriMatch;
use crate::Error;
use http::header::ALLOW;
use http::{Method, StatusCode};
use lru::LruCache;
use parking_lot::Mutex;
use std::any::TypeId;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// ============================================================================
// Locator descriptor cache
// ============================================================================

struct CachedDescriptor {
    descriptor: Arc<ResourceDescriptor>,
    last_access: Instant,
}

/// Bounded cache of descriptors for types returned by locators.
///
/// Entries idle for longer than the TTL are recompiled. Two requests may
/// compile the same type concurrently; the last insert wins.
pub struct DescriptorCache {
    entries: Mutex<LruCache<TypeId, CachedDescriptor>>,
    ttl: Duration,
}

impl DescriptorCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn get_or_compile(&self, located: &Located) -> Result<Arc<ResourceDescriptor>, Error> {
        {
            let mut entries = self.entries.lock();
            if let Some(cached) = entries.get_mut(&located.type_id) {
                if cached.last_access.elapsed() <= self.ttl {
                    cached.last_access = Instant::now();
                    trace!(resource = located.type_name, "Descriptor cache hit");
                    return Ok(Arc::clone(&cached.descriptor));
                }
                entries.pop(&located.type_id);
            }
        }

        let descriptor = Arc::new((located.describe)()?);
        debug!(resource = located.type_name, "Compiled locator resource descriptor");
        self.entries.lock().put(
            located.type_id,
            CachedDescriptor {
                descriptor: Arc::clone(&descriptor),
                last_access: Instant::now(),
            },
        );
        Ok(descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Outcome of method selection within one method map.
enum Selection {
    Method(Arc<ResourceMethodDescriptor>),
    /// Selection ended in a response (405, 406, 415 or automatic OPTIONS).
    Response(HttpResponse),
}

pub struct RequestDispatcher {
    resources: Arc<ResourceRegistry>,
    cache: DescriptorCache,
    max_locator_depth: usize,
}

impl RequestDispatcher {
    pub fn new(resources: Arc<ResourceRegistry>) -> Self {
        Self::with_config(resources, &DispatcherConfig::default())
    }

    pub fn with_config(resources: Arc<ResourceRegistry>, config: &DispatcherConfig) -> Self {
        Self {
            resources,
            cache: DescriptorCache::new(config.locator_cache_capacity, config.locator_cache_ttl),
            max_locator_depth: config.max_locator_depth,
        }
    }

    pub fn resources(&self) -> &Arc<ResourceRegistry> {
        &self.resources
    }

    pub fn descriptor_cache(&self) -> &DescriptorCache {
        &self.cache
    }

    /// Dispatch the request held by `ctx` and build its response.
    ///
    /// Errors from resource code are returned as is. Malformed
    /// `Content-Type` or `Accept` headers yield [`Error::BadRequest`] and a
    /// runaway locator chain yields [`Error::LocatorDepthExceeded`].
    pub fn dispatch(&self, ctx: &mut ApplicationContext) -> Result<HttpResponse, ResourceError> {
        let path = ctx.path();
        let Some((root, m)) = self.resources.find(&path) else {
            debug!(path = %path, "No root resource matched");
            return Ok(not_found(&path));
        };
        debug!(path = %path, resource = root.type_name(), "Root resource matched");

        ctx.push_matched_uri(m.matched(&path));
        ctx.add_path_params(root.pattern().parameter_names(), m.values());

        let instance = root.instance();
        if root.scope() == Scope::PerRequest {
            ctx.destroy_on_completion(Arc::clone(&instance));
        }

        self.dispatch_resource(ctx, root.descriptor(), instance, m.tail().map(str::to_string))
    }

    fn dispatch_resource(
        &self,
        ctx: &mut ApplicationContext,
        descriptor: &ResourceDescriptor,
        instance: Arc<dyn Resource>,
        tail: Option<String>,
    ) -> Result<HttpResponse, ResourceError> {
        let at_resource = matches!(tail.as_deref(), None | Some("/"));
        if at_resource && !descriptor.methods().is_empty() {
            return match select_method(ctx, descriptor.methods())? {
                Selection::Method(method) => self.invoke_method(ctx, &method, instance),
                Selection::Response(response) => {
                    debug!(status = %response.status, resource = descriptor.type_name(), "No resource method selected");
                    Ok(response)
                }
            };
        }

        let request_path = tail.unwrap_or_default();

        // the first terminal match is the most specific sub-resource pattern
        let sub_methods = descriptor.sub_resource_methods().iter().find_map(|group| {
            let m = group.pattern.match_uri(&request_path)?;
            m.is_terminal().then_some((group, m))
        });
        let selection = match sub_methods {
            Some((group, m)) => Some((select_method(ctx, &group.methods)?, group, m)),
            None => None,
        };

        let locator = descriptor
            .locators()
            .iter()
            .find_map(|l| l.path().match_uri(&request_path).map(|m| (l, m)));

        match (selection, locator) {
            (Some((Selection::Method(method), group, m)), locator) => {
                // the method also wins when both patterns are equally specific
                if let Some((l, lm)) = locator
                    && group.pattern.cmp(l.path()) == Ordering::Greater
                {
                    return self.invoke_locator(ctx, l, lm, &request_path, instance);
                }
                debug!(method = method.name(), path = %request_path, "Sub-resource method matched");
                ctx.push_matched_uri(&request_path);
                ctx.add_path_params(group.pattern.parameter_names(), m.values());
                self.invoke_method(ctx, &method, instance)
            }
            (_, Some((locator, lm))) => self.invoke_locator(ctx, locator, lm, &request_path, instance),
            (Some((Selection::Response(response), _, _)), None) => {
                debug!(status = %response.status, path = %request_path, "No sub-resource method selected");
                Ok(response)
            }
            (None, None) => {
                debug!(path = %request_path, resource = descriptor.type_name(), "No sub-resource method or locator matched");
                Ok(not_found(&request_path))
            }
        }
    }

    fn invoke_method(
        &self,
        ctx: &mut ApplicationContext,
        method: &ResourceMethodDescriptor,
        instance: Arc<dyn Resource>,
    ) -> Result<HttpResponse, ResourceError> {
        ctx.push_matched_resource(Arc::clone(&instance));

        for filter in ctx.providers().get_method_invoker_filters(&ctx.path()) {
            filter.accept(ctx, method)?;
        }

        let accept = ctx.request().accept_media_types()?;
        trace!(method = method.name(), "Invoking resource method");
        let outcome = method.invoke(&*instance, ctx)?;
        let content_type = acceptable_media_type(&accept, method.produces())
            .filter(|ct| !ct.is_wildcard_type() && !ct.is_wildcard_subtype());
        Ok(response::assemble(outcome, content_type))
    }

    fn invoke_locator(
        &self,
        ctx: &mut ApplicationContext,
        locator: &SubResourceLocatorDescriptor,
        m: UriMatch,
        request_path: &str,
        instance: Arc<dyn Resource>,
    ) -> Result<HttpResponse, ResourceError> {
        let depth = ctx.enter_locator();
        if depth > self.max_locator_depth {
            return Err(Error::LocatorDepthExceeded(self.max_locator_depth).into());
        }
        debug!(locator = locator.name(), path = %request_path, depth, "Sub-resource locator matched");

        ctx.push_matched_resource(Arc::clone(&instance));
        ctx.push_matched_uri(m.matched(request_path));
        ctx.add_path_params(locator.path().parameter_names(), m.values());

        let located = locator.invoke(&*instance, ctx)?;
        let descriptor = self.cache.get_or_compile(&located)?;
        ctx.destroy_on_completion(Arc::clone(&located.instance));

        self.dispatch_resource(ctx, &descriptor, located.instance, m.tail().map(str::to_string))
    }
}

// ============================================================================
// Method selection
// ============================================================================

fn select_method(ctx: &ApplicationContext, methods: &MethodMap) -> Result<Selection, Error> {
    let request = ctx.request();
    let verb = request.method.as_str();

    let candidates = match methods.get(verb) {
        Some(group) if !group.is_empty() => group,
        _ => {
            if request.method == Method::HEAD
                && let Some(group) = methods.get(Method::GET.as_str())
            {
                group
            } else if request.method == Method::OPTIONS {
                return Ok(Selection::Response(options_response(methods)));
            } else {
                return Ok(Selection::Response(method_not_allowed(request, methods, &ctx.path())));
            }
        }
    };

    let content_type = request.content_type()?;
    let consumable: Vec<&Arc<ResourceMethodDescriptor>> = match &content_type {
        None => candidates.iter().collect(),
        Some(ct) => candidates
            .iter()
            .filter(|m| m.consumes().iter().any(|c| c.is_compatible(ct)))
            .collect(),
    };
    if consumable.is_empty() {
        let ct = content_type.map(|c| c.to_string()).unwrap_or_default();
        return Ok(Selection::Response(
            HttpResponse::new(StatusCode::UNSUPPORTED_MEDIA_TYPE)
                .with_text(format!("Media type {} is not supported.", ct)),
        ));
    }

    // the first method with the strictly highest quality wins
    let accept = request.accept_media_types()?;
    let mut best: Option<(&Arc<ResourceMethodDescriptor>, f32)> = None;
    for method in consumable {
        let q = process_quality(&accept, method.produces());
        if q > best.map_or(0.0, |(_, q)| q) {
            best = Some((method, q));
        }
    }

    match best {
        Some((method, _)) => Ok(Selection::Method(Arc::clone(method))),
        None => Ok(Selection::Response(
            HttpResponse::new(StatusCode::NOT_ACCEPTABLE).with_text("Not Acceptable"),
        )),
    }
}

fn method_not_allowed(request: &HttpRequest, methods: &MethodMap, path: &str) -> HttpResponse {
    HttpResponse::new(StatusCode::METHOD_NOT_ALLOWED)
        .with_header(ALLOW.as_str(), &allowed(methods).join(","))
        .with_text(format!(
            "{} method is not allowed for resource {}",
            request.method, path
        ))
}

fn options_response(methods: &MethodMap) -> HttpResponse {
    let mut verbs: BTreeSet<&str> = allowed(methods).into_iter().collect();
    if verbs.contains(Method::GET.as_str()) {
        verbs.insert(Method::HEAD.as_str());
    }
    verbs.insert(Method::OPTIONS.as_str());
    let allow: Vec<&str> = verbs.into_iter().collect();
    HttpResponse::ok().with_header(ALLOW.as_str(), &allow.join(","))
}

fn not_found(path: &str) -> HttpResponse {
    HttpResponse::not_found().with_text(format!(
        "There is no any resources matched to request path {}",
        path
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderRegistry;
    use crate::resource::ResourceBuilder;

    struct Widget;

    impl Resource for Widget {
        fn describe(r: &mut ResourceBuilder<Self>) {
            r.get(|_, _| Ok("widget"));
        }
    }

    #[test]
    fn test_cache_hit_and_expiry() {
        let cache = DescriptorCache::new(4, Duration::from_secs(600));
        let first = cache.get_or_compile(&Located::new(Widget)).unwrap();
        let second = cache.get_or_compile(&Located::new(Widget)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        let expiring = DescriptorCache::new(4, Duration::ZERO);
        let first = expiring.get_or_compile(&Located::new(Widget)).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        let second = expiring.get_or_compile(&Located::new(Widget)).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(expiring.len(), 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = DescriptorCache::new(0, Duration::from_secs(1));
        cache.get_or_compile(&Located::new(Widget)).unwrap();
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    struct Doc;

    impl Resource for Doc {
        fn path() -> Option<&'static str> {
            Some("/doc")
        }

        fn describe(r: &mut ResourceBuilder<Self>) {
            r.get(|_, _| Ok("json")).produces(&["application/json"]);
            r.get(|_, _| Ok("text")).produces(&["text/plain"]);
            r.put(|_, _| Ok(())).consumes(&["text/plain"]);
        }
    }

    fn select(request: HttpRequest) -> Selection {
        let descriptor = ResourceDescriptor::of::<Doc>().unwrap();
        let ctx = ApplicationContext::new(request, Arc::new(ProviderRegistry::new()));
        select_method(&ctx, descriptor.methods()).unwrap()
    }

    fn selected_produces(selection: Selection) -> String {
        match selection {
            Selection::Method(m) => m.produces()[0].to_string(),
            Selection::Response(r) => panic!("expected a method, got {:?}", r),
        }
    }

    fn status(selection: Selection) -> StatusCode {
        match selection {
            Selection::Method(m) => panic!("expected a response, got {:?}", m),
            Selection::Response(r) => r.status,
        }
    }

    #[test]
    fn test_quality_decides() {
        let chosen = select(HttpRequest::get("/doc").with_header("Accept", "text/plain, application/json;q=0.9"));
        assert_eq!(selected_produces(chosen), "text/plain");

        // equal quality keeps the first declared method
        let chosen = select(HttpRequest::get("/doc"));
        assert_eq!(selected_produces(chosen), "application/json");
    }

    #[test]
    fn test_rejections() {
        assert_eq!(
            status(select(HttpRequest::get("/doc").with_header("Accept", "image/png"))),
            StatusCode::NOT_ACCEPTABLE
        );
        assert_eq!(
            status(select(HttpRequest::put("/doc").with_header("Content-Type", "application/json"))),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(status(select(HttpRequest::delete("/doc"))), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_implicit_head_and_options() {
        assert!(matches!(select(HttpRequest::head("/doc")), Selection::Method(_)));

        match select(HttpRequest::options("/doc")) {
            Selection::Response(r) => {
                assert_eq!(r.status, StatusCode::OK);
                assert_eq!(r.header("allow"), Some("GET,HEAD,OPTIONS,PUT"));
            }
            Selection::Method(_) => panic!("expected automatic OPTIONS response"),
        }
    }

    #[test]
    fn test_malformed_accept_is_bad_request() {
        let descriptor = ResourceDescriptor::of::<Doc>().unwrap();
        let ctx = ApplicationContext::new(
            HttpRequest::get("/doc").with_header("Accept", "text/plain;q=abc"),
            Arc::new(ProviderRegistry::new()),
        );
        assert!(matches!(
            select_method(&ctx, descriptor.methods()),
            Err(Error::BadRequest(_))
        ));
    }
}
