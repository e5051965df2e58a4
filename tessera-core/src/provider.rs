//! Message body readers/writers, exception mappers, context resolvers and
//! filters, and the registry that resolves them.
//!
//! Readers and writers are filed under every media type they declare.
//! Lookups expand the requested media type into its range (exact type,
//! `type/*+suffix`, `type/*`, `*/*`) and ask each provider filed under each
//! step, in registration order, whether it handles the entity type. The
//! first that answers yes wins; finding none is a normal outcome.
//!
//! # Examples
//!
//! ```
//! use tessera_core::{EntityType, MediaType, ProviderRegistry};
//!
//! let providers = ProviderRegistry::with_defaults();
//!
//! let writer = providers.get_message_body_writer(&EntityType::of::<String>(), &MediaType::plain_text());
//! assert!(writer.is_some());
//!
//! // nothing writes a u32
//! assert!(providers.get_message_body_writer(&EntityType::of::<u32>(), &MediaType::any()).is_none());
//! ```

use crate::component::ObjectFactory;
use crate::context::ApplicationContext;
use crate::error::ResourceError;
use crate::http::{Entity, EntityType, HttpResponse};
use crate::media_type::{MediaType, parse_media_types, sorted_media_types};
use crate::resource::ResourceMethodDescriptor;
use crate::snapshot::SnapshotCell;
use crate::uri_pattern::UriPattern;
use crate::Error;
use http::HeaderMap;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::error::Error as StdError;
use std::fmt;
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, trace};

// ============================================================================
// Provider contracts
// ============================================================================

/// Turns a request body into an entity.
pub trait MessageBodyReader: Send + Sync {
    fn is_readable(&self, ty: &EntityType, media_type: &MediaType) -> bool;

    fn read_from(
        &self,
        ty: &EntityType,
        media_type: &MediaType,
        headers: &HeaderMap,
        body: &mut dyn Read,
    ) -> Result<Entity, Error>;
}

/// Serializes a response entity.
pub trait MessageBodyWriter: Send + Sync {
    fn is_writeable(&self, ty: &EntityType, media_type: &MediaType) -> bool;

    /// Length of the serialized form when known up front.
    fn size(&self, _entity: &Entity, _media_type: &MediaType) -> Option<u64> {
        None
    }

    fn write_to(
        &self,
        entity: &Entity,
        media_type: &MediaType,
        headers: &mut HeaderMap,
        out: &mut dyn Write,
    ) -> Result<(), Error>;
}

/// Converts errors of exactly type `E` into responses.
pub trait ExceptionMapper<E: StdError + 'static>: Send + Sync {
    fn to_response(&self, error: &E) -> HttpResponse;
}

/// Supplies contextual values of type `T`, selected by media type.
pub trait ContextResolver<T>: Send + Sync {
    fn get_context(&self, ty: &EntityType) -> Option<T>;
}

/// Runs before dispatch; returning a response short-circuits the request.
pub trait RequestFilter: Send + Sync {
    fn filter(&self, ctx: &mut ApplicationContext) -> Result<Option<HttpResponse>, ResourceError>;
}

/// Runs after dispatch and may rewrite the response.
pub trait ResponseFilter: Send + Sync {
    fn filter(&self, ctx: &ApplicationContext, response: &mut HttpResponse)
    -> Result<(), ResourceError>;
}

/// Runs right before a resource method is invoked; an error aborts the
/// invocation.
pub trait MethodInvokerFilter: Send + Sync {
    fn accept(
        &self,
        ctx: &ApplicationContext,
        method: &ResourceMethodDescriptor,
    ) -> Result<(), ResourceError>;
}

// ============================================================================
// Descriptors
// ============================================================================

/// Media types a provider declares.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderDescriptor {
    pub name: String,
    pub consumes: Vec<MediaType>,
    pub produces: Vec<MediaType>,
}

impl ProviderDescriptor {
    /// Empty lists become `*/*`; both lists are sorted by specificity.
    pub fn new(name: impl Into<String>, consumes: Vec<MediaType>, produces: Vec<MediaType>) -> Self {
        Self {
            name: name.into(),
            consumes: sorted_media_types(consumes),
            produces: sorted_media_types(produces),
        }
    }

    pub fn parse(name: impl Into<String>, consumes: &[&str], produces: &[&str]) -> Result<Self, Error> {
        Ok(Self {
            name: name.into(),
            consumes: parse_media_types(consumes)?,
            produces: parse_media_types(produces)?,
        })
    }

    pub fn of<T>(consumes: Vec<MediaType>, produces: Vec<MediaType>) -> Self {
        Self::new(std::any::type_name::<T>(), consumes, produces)
    }
}

/// A provider descriptor with the factory supplying its instances.
pub struct ProviderFactory<T: ?Sized> {
    pub descriptor: ProviderDescriptor,
    pub factory: ObjectFactory<T>,
}

impl<T: ?Sized> ProviderFactory<T> {
    pub fn new(descriptor: ProviderDescriptor, factory: ObjectFactory<T>) -> Self {
        Self {
            descriptor,
            factory,
        }
    }
}

impl<T: ?Sized> fmt::Debug for ProviderFactory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderFactory")
            .field("descriptor", &self.descriptor)
            .field("scope", &self.factory.scope())
            .finish()
    }
}

type ReaderFactory = Arc<ProviderFactory<dyn MessageBodyReader>>;
type WriterFactory = Arc<ProviderFactory<dyn MessageBodyWriter>>;

// ============================================================================
// Type-erased registrations
// ============================================================================

trait ErasedExceptionMapper: Send + Sync {
    fn try_map(&self, error: &(dyn StdError + 'static)) -> Option<HttpResponse>;
}

struct TypedExceptionMapper<E, M> {
    factory: ObjectFactory<M>,
    _error: PhantomData<fn(&E)>,
}

impl<E, M> ErasedExceptionMapper for TypedExceptionMapper<E, M>
where
    E: StdError + 'static,
    M: ExceptionMapper<E> + 'static,
{
    fn try_map(&self, error: &(dyn StdError + 'static)) -> Option<HttpResponse> {
        error
            .downcast_ref::<E>()
            .map(|e| self.factory.instance().to_response(e))
    }
}

struct FnExceptionMapper<F>(F);

impl<E, F> ExceptionMapper<E> for FnExceptionMapper<F>
where
    E: StdError + 'static,
    F: Fn(&E) -> HttpResponse + Send + Sync,
{
    fn to_response(&self, error: &E) -> HttpResponse {
        (self.0)(error)
    }
}

#[derive(Clone)]
struct MapperEntry {
    error_type: &'static str,
    mapper: Arc<dyn ErasedExceptionMapper>,
}

/// Context resolvers for one context type, most specific media type first.
#[derive(Clone, Default)]
struct ResolverMap {
    entries: Vec<(MediaType, Arc<dyn Any + Send + Sync>)>,
}

struct FilterEntry<T: ?Sized> {
    pattern: Option<UriPattern>,
    factory: ObjectFactory<T>,
}

impl<T: ?Sized> Clone for FilterEntry<T> {
    fn clone(&self) -> Self {
        Self {
            pattern: self.pattern.clone(),
            factory: self.factory.clone(),
        }
    }
}

impl<T: ?Sized> FilterEntry<T> {
    /// A pattern applies only when it consumes the whole path.
    fn applies_to(&self, path: &str) -> bool {
        match &self.pattern {
            None => true,
            Some(pattern) => pattern.match_uri(path).is_some_and(|m| m.is_terminal()),
        }
    }
}

#[derive(Clone, Default)]
struct ProviderSnapshot {
    readers: BTreeMap<String, Vec<ReaderFactory>>,
    writers: BTreeMap<String, Vec<WriterFactory>>,
    exception_mappers: HashMap<TypeId, MapperEntry>,
    context_resolvers: HashMap<TypeId, ResolverMap>,
    request_filters: Vec<FilterEntry<dyn RequestFilter>>,
    response_filters: Vec<FilterEntry<dyn ResponseFilter>>,
    invoker_filters: Vec<FilterEntry<dyn MethodInvokerFilter>>,
}

// ============================================================================
// Registry
// ============================================================================

/// Application-wide provider registry.
///
/// Registration is serialized and publishes a new snapshot; lookups read
/// the current snapshot without locking.
pub struct ProviderRegistry {
    snapshot: SnapshotCell<ProviderSnapshot>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            snapshot: SnapshotCell::new(ProviderSnapshot::default()),
        }
    }

    /// A registry with the built-in string, bytes and JSON providers.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        crate::builtin::install(&registry);
        registry
    }

    // ------------------------------------------------------------------------
    // Message body readers / writers
    // ------------------------------------------------------------------------

    /// File `factory` under each media type it consumes. Several readers may
    /// claim the same type; registration order breaks ties.
    pub fn add_message_body_reader(&self, factory: ProviderFactory<dyn MessageBodyReader>) {
        let factory = Arc::new(factory);
        debug!(provider = %factory.descriptor.name, consumes = ?mime_list(&factory.descriptor.consumes), "Registering message body reader");
        self.snapshot.modify(|s| {
            for media_type in &factory.descriptor.consumes {
                s.readers
                    .entry(media_type.mime_type())
                    .or_default()
                    .push(Arc::clone(&factory));
            }
        });
    }

    pub fn add_message_body_writer(&self, factory: ProviderFactory<dyn MessageBodyWriter>) {
        let factory = Arc::new(factory);
        debug!(provider = %factory.descriptor.name, produces = ?mime_list(&factory.descriptor.produces), "Registering message body writer");
        self.snapshot.modify(|s| {
            for media_type in &factory.descriptor.produces {
                s.writers
                    .entry(media_type.mime_type())
                    .or_default()
                    .push(Arc::clone(&factory));
            }
        });
    }

    /// Register a singleton reader for the given media types.
    pub fn add_reader<R>(&self, reader: R, consumes: &[&str]) -> Result<(), Error>
    where
        R: MessageBodyReader + 'static,
    {
        let descriptor = ProviderDescriptor::parse(std::any::type_name::<R>(), consumes, &[])?;
        let factory = ObjectFactory::singleton(Arc::new(reader))
            .erase(|r| r as Arc<dyn MessageBodyReader>);
        self.add_message_body_reader(ProviderFactory::new(descriptor, factory));
        Ok(())
    }

    /// Register a singleton writer for the given media types.
    pub fn add_writer<W>(&self, writer: W, produces: &[&str]) -> Result<(), Error>
    where
        W: MessageBodyWriter + 'static,
    {
        let descriptor = ProviderDescriptor::parse(std::any::type_name::<W>(), &[], produces)?;
        let factory = ObjectFactory::singleton(Arc::new(writer))
            .erase(|w| w as Arc<dyn MessageBodyWriter>);
        self.add_message_body_writer(ProviderFactory::new(descriptor, factory));
        Ok(())
    }

    /// First reader able to read `ty` as `media_type`, walking the media
    /// type range.
    pub fn get_message_body_reader(
        &self,
        ty: &EntityType,
        media_type: &MediaType,
    ) -> Option<Arc<dyn MessageBodyReader>> {
        let snapshot = self.snapshot.load();
        let mut instances = InstanceCache::default();
        for actual in media_type.range() {
            let Some(factories) = snapshot.readers.get(&actual.mime_type()) else {
                continue;
            };
            for factory in factories {
                let reader = instances.get(factory);
                if reader.is_readable(ty, &actual) {
                    trace!(entity = ty.name(), media_type = %actual, provider = %factory.descriptor.name, "Reader selected");
                    return Some(reader);
                }
            }
        }
        None
    }

    /// First writer able to write `ty` as `media_type`, walking the media
    /// type range.
    pub fn get_message_body_writer(
        &self,
        ty: &EntityType,
        media_type: &MediaType,
    ) -> Option<Arc<dyn MessageBodyWriter>> {
        let snapshot = self.snapshot.load();
        let mut instances = InstanceCache::default();
        for actual in media_type.range() {
            let Some(factories) = snapshot.writers.get(&actual.mime_type()) else {
                continue;
            };
            for factory in factories {
                let writer = instances.get(factory);
                if writer.is_writeable(ty, &actual) {
                    trace!(entity = ty.name(), media_type = %actual, provider = %factory.descriptor.name, "Writer selected");
                    return Some(writer);
                }
            }
        }
        None
    }

    /// Every registered produced media type with a writer for `ty`, most
    /// specific first.
    pub fn get_acceptable_writer_media_types(&self, ty: &EntityType) -> Vec<MediaType> {
        let snapshot = self.snapshot.load();
        let mut instances = InstanceCache::default();
        let mut types = Vec::new();
        for factories in snapshot.writers.values() {
            for factory in factories {
                let writer = instances.get(factory);
                for produced in &factory.descriptor.produces {
                    if writer.is_writeable(ty, produced) && !types.contains(produced) {
                        types.push(produced.clone());
                    }
                }
            }
        }
        types.sort_by(|a, b| a.compare_specificity(b));
        types
    }

    // ------------------------------------------------------------------------
    // Exception mappers
    // ------------------------------------------------------------------------

    /// Register the mapper for errors of exactly type `E`.
    ///
    /// A second mapper for the same type is rejected.
    pub fn add_exception_mapper<E, M>(&self, factory: ObjectFactory<M>) -> Result<(), Error>
    where
        E: StdError + 'static,
        M: ExceptionMapper<E> + 'static,
    {
        let error_type = std::any::type_name::<E>();
        self.snapshot.update(|s| {
            if s.exception_mappers.contains_key(&TypeId::of::<E>()) {
                return Err(Error::DuplicateExceptionMapper(format!(
                    "ExceptionMapper for {} already registered",
                    error_type
                )));
            }
            s.exception_mappers.insert(
                TypeId::of::<E>(),
                MapperEntry {
                    error_type,
                    mapper: Arc::new(TypedExceptionMapper::<E, M> {
                        factory,
                        _error: PhantomData,
                    }),
                },
            );
            Ok(())
        })?;
        debug!(error_type, "Exception mapper registered");
        Ok(())
    }

    /// Register a closure as the singleton mapper for `E`.
    pub fn add_exception_mapper_fn<E, F>(&self, mapper: F) -> Result<(), Error>
    where
        E: StdError + 'static,
        F: Fn(&E) -> HttpResponse + Send + Sync + 'static,
    {
        self.add_exception_mapper::<E, _>(ObjectFactory::singleton(Arc::new(FnExceptionMapper(
            mapper,
        ))))
    }

    pub fn has_exception_mapper<E: StdError + 'static>(&self) -> bool {
        self.snapshot
            .load()
            .exception_mappers
            .contains_key(&TypeId::of::<E>())
    }

    /// Map `error` with the mapper registered for its exact concrete type.
    ///
    /// The cause chain is not consulted here; callers walk it themselves.
    pub fn map_exception(&self, error: &(dyn StdError + 'static)) -> Option<HttpResponse> {
        let snapshot = self.snapshot.load();
        snapshot.exception_mappers.values().find_map(|entry| {
            let response = entry.mapper.try_map(error)?;
            trace!(error_type = entry.error_type, "Exception mapped");
            Some(response)
        })
    }

    // ------------------------------------------------------------------------
    // Context resolvers
    // ------------------------------------------------------------------------

    /// Register a resolver of `T` for each media type in `produces`.
    ///
    /// Registering a second resolver of `T` for an already covered media
    /// type is rejected.
    pub fn add_context_resolver<T, R>(
        &self,
        produces: Vec<MediaType>,
        factory: ObjectFactory<R>,
    ) -> Result<(), Error>
    where
        T: 'static,
        R: ContextResolver<T> + 'static,
    {
        let factory: ObjectFactory<dyn ContextResolver<T>> =
            factory.erase(|r| r as Arc<dyn ContextResolver<T>>);
        let erased: Arc<dyn Any + Send + Sync> = Arc::new(factory);
        let produces = sorted_media_types(produces);
        let context_type = std::any::type_name::<T>();

        self.snapshot.update(|s| {
            let map = s.context_resolvers.entry(TypeId::of::<T>()).or_default();
            for media_type in &produces {
                if map.entries.iter().any(|(m, _)| m.same_essence(media_type)) {
                    return Err(Error::DuplicateContextResolver(format!(
                        "ContextResolver for {} and media type {} already registered",
                        context_type, media_type
                    )));
                }
                map.entries.push((media_type.clone(), Arc::clone(&erased)));
            }
            map.entries.sort_by(|(a, _), (b, _)| {
                a.compare_specificity(b)
                    .then_with(|| a.mime_type().cmp(&b.mime_type()))
            });
            Ok(())
        })?;
        debug!(context_type, "Context resolver registered");
        Ok(())
    }

    /// Resolver of `T` for `media_type`.
    ///
    /// Walks the media type range; at each step the first registered type
    /// (most specific first) compatible with it wins.
    pub fn get_context_resolver<T: 'static>(
        &self,
        media_type: &MediaType,
    ) -> Option<Arc<dyn ContextResolver<T>>> {
        let snapshot = self.snapshot.load();
        let map = snapshot.context_resolvers.get(&TypeId::of::<T>())?;
        for actual in media_type.range() {
            for (registered, erased) in &map.entries {
                if actual.is_compatible(registered) {
                    let factory = erased.downcast_ref::<ObjectFactory<dyn ContextResolver<T>>>()?;
                    return Some(factory.instance());
                }
            }
        }
        None
    }

    // ------------------------------------------------------------------------
    // Filters
    // ------------------------------------------------------------------------

    /// Register a request filter for paths matching `path`, or for every
    /// path when `None`.
    pub fn add_request_filter(
        &self,
        path: Option<&str>,
        factory: ObjectFactory<dyn RequestFilter>,
    ) -> Result<(), Error> {
        let pattern = path.map(UriPattern::new).transpose()?;
        self.snapshot
            .modify(|s| s.request_filters.push(FilterEntry { pattern, factory }));
        Ok(())
    }

    pub fn add_response_filter(
        &self,
        path: Option<&str>,
        factory: ObjectFactory<dyn ResponseFilter>,
    ) -> Result<(), Error> {
        let pattern = path.map(UriPattern::new).transpose()?;
        self.snapshot
            .modify(|s| s.response_filters.push(FilterEntry { pattern, factory }));
        Ok(())
    }

    pub fn add_method_invoker_filter(
        &self,
        path: Option<&str>,
        factory: ObjectFactory<dyn MethodInvokerFilter>,
    ) -> Result<(), Error> {
        let pattern = path.map(UriPattern::new).transpose()?;
        self.snapshot
            .modify(|s| s.invoker_filters.push(FilterEntry { pattern, factory }));
        Ok(())
    }

    pub fn get_request_filters(&self, path: &str) -> Vec<Arc<dyn RequestFilter>> {
        let snapshot = self.snapshot.load();
        matched_filters(&snapshot.request_filters, path)
    }

    pub fn get_response_filters(&self, path: &str) -> Vec<Arc<dyn ResponseFilter>> {
        let snapshot = self.snapshot.load();
        matched_filters(&snapshot.response_filters, path)
    }

    pub fn get_method_invoker_filters(&self, path: &str) -> Vec<Arc<dyn MethodInvokerFilter>> {
        let snapshot = self.snapshot.load();
        matched_filters(&snapshot.invoker_filters, path)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot.load();
        f.debug_struct("ProviderRegistry")
            .field("readers", &snapshot.readers.keys().collect::<Vec<_>>())
            .field("writers", &snapshot.writers.keys().collect::<Vec<_>>())
            .field("exception_mappers", &snapshot.exception_mappers.len())
            .field("request_filters", &snapshot.request_filters.len())
            .field("response_filters", &snapshot.response_filters.len())
            .finish()
    }
}

fn matched_filters<T: ?Sized>(entries: &[FilterEntry<T>], path: &str) -> Vec<Arc<T>> {
    entries
        .iter()
        .filter(|e| e.applies_to(path))
        .map(|e| e.factory.instance())
        .collect()
}

fn mime_list(types: &[MediaType]) -> Vec<String> {
    types.iter().map(MediaType::mime_type).collect()
}

/// Instances created during one lookup, so a per-request provider filed
/// under several media types is only built once.
struct InstanceCache<T: ?Sized> {
    instances: HashMap<usize, Arc<T>>,
}

impl<T: ?Sized> Default for InstanceCache<T> {
    fn default() -> Self {
        Self {
            instances: HashMap::new(),
        }
    }
}

impl<T: ?Sized> InstanceCache<T> {
    fn get(&mut self, factory: &Arc<ProviderFactory<T>>) -> Arc<T> {
        let key = Arc::as_ptr(factory) as *const () as usize;
        Arc::clone(
            self.instances
                .entry(key)
                .or_insert_with(|| factory.factory.instance()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NamedWriter {
        name: &'static str,
        accepts: fn(&EntityType) -> bool,
    }

    impl MessageBodyWriter for NamedWriter {
        fn is_writeable(&self, ty: &EntityType, _media_type: &MediaType) -> bool {
            (self.accepts)(ty)
        }

        fn write_to(
            &self,
            _entity: &Entity,
            _media_type: &MediaType,
            _headers: &mut HeaderMap,
            out: &mut dyn Write,
        ) -> Result<(), Error> {
            out.write_all(self.name.as_bytes())?;
            Ok(())
        }
    }

    fn written_by(writer: &Arc<dyn MessageBodyWriter>) -> String {
        let mut out = Vec::new();
        writer
            .write_to(&Entity::new(()), &MediaType::any(), &mut HeaderMap::new(), &mut out)
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_writer_range_walk() {
        let registry = ProviderRegistry::new();
        registry
            .add_writer(NamedWriter { name: "text", accepts: |t| t.is::<String>() }, &["text/plain"])
            .unwrap();
        registry
            .add_writer(NamedWriter { name: "any", accepts: |t| t.is::<String>() }, &["*/*"])
            .unwrap();

        let ty = EntityType::of::<String>();
        let exact = registry.get_message_body_writer(&ty, &MediaType::plain_text()).unwrap();
        assert_eq!(written_by(&exact), "text");

        // text/html falls through text/*+html and text/* to */*
        let fallback = registry.get_message_body_writer(&ty, &MediaType::html()).unwrap();
        assert_eq!(written_by(&fallback), "any");

        let wildcard = registry.get_message_body_writer(&ty, &MediaType::any()).unwrap();
        assert_eq!(written_by(&wildcard), "any");
    }

    #[test]
    fn test_registration_order_breaks_ties() {
        let registry = ProviderRegistry::new();
        registry
            .add_writer(NamedWriter { name: "first", accepts: |_| true }, &["application/json"])
            .unwrap();
        registry
            .add_writer(NamedWriter { name: "second", accepts: |_| true }, &["application/json"])
            .unwrap();

        let writer = registry
            .get_message_body_writer(&EntityType::of::<u8>(), &MediaType::json())
            .unwrap();
        assert_eq!(written_by(&writer), "first");
    }

    #[test]
    fn test_per_request_instance_built_once_per_lookup() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let factory: ObjectFactory<dyn MessageBodyWriter> = ObjectFactory::per_request(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(NamedWriter { name: "never", accepts: |_| false }) as Arc<dyn MessageBodyWriter>
        });
        let registry = ProviderRegistry::new();
        registry.add_message_body_writer(ProviderFactory::new(
            ProviderDescriptor::parse("never", &[], &["text/plain", "text/*", "*/*"]).unwrap(),
            factory,
        ));

        assert!(registry
            .get_message_body_writer(&EntityType::of::<u8>(), &MediaType::plain_text())
            .is_none());
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_acceptable_writer_media_types_sorted() {
        let registry = ProviderRegistry::new();
        registry
            .add_writer(NamedWriter { name: "a", accepts: |t| t.is::<String>() }, &["*/*", "text/plain"])
            .unwrap();
        registry
            .add_writer(NamedWriter { name: "b", accepts: |t| t.is::<u8>() }, &["application/json"])
            .unwrap();

        let types = registry.get_acceptable_writer_media_types(&EntityType::of::<String>());
        assert_eq!(types, vec![MediaType::plain_text(), MediaType::any()]);
    }

    #[derive(Debug)]
    struct Missing;

    impl fmt::Display for Missing {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("missing")
        }
    }

    impl StdError for Missing {}

    #[test]
    fn test_exception_mapper_exact_type_and_duplicates() {
        let registry = ProviderRegistry::new();
        registry
            .add_exception_mapper_fn(|_: &Missing| HttpResponse::not_found())
            .unwrap();

        let err = registry
            .add_exception_mapper_fn(|_: &Missing| HttpResponse::bad_request())
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateExceptionMapper(_)));

        let response = registry.map_exception(&Missing).unwrap();
        assert_eq!(response.status, http::StatusCode::NOT_FOUND);

        let other = std::io::Error::other("x");
        assert!(registry.map_exception(&other).is_none());
        assert!(registry.has_exception_mapper::<Missing>());
    }

    struct Label(&'static str);

    impl ContextResolver<String> for Label {
        fn get_context(&self, _ty: &EntityType) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    #[test]
    fn test_context_resolver_range_lookup() {
        let registry = ProviderRegistry::new();
        registry
            .add_context_resolver::<String, _>(vec![MediaType::xml()], ObjectFactory::singleton(Arc::new(Label("xml"))))
            .unwrap();
        registry
            .add_context_resolver::<String, _>(vec![MediaType::any()], ObjectFactory::singleton(Arc::new(Label("any"))))
            .unwrap();

        let ty = EntityType::of::<u8>();
        let resolve = |mt: MediaType| {
            registry
                .get_context_resolver::<String>(&mt)
                .and_then(|r| r.get_context(&ty))
        };
        assert_eq!(resolve(MediaType::xml()).as_deref(), Some("xml"));
        assert_eq!(resolve(MediaType::json()).as_deref(), Some("any"));
        assert!(registry.get_context_resolver::<u64>(&MediaType::xml()).is_none());

        let dup = registry.add_context_resolver::<String, _>(
            vec![MediaType::xml()],
            ObjectFactory::singleton(Arc::new(Label("again"))),
        );
        assert!(matches!(dup, Err(Error::DuplicateContextResolver(_))));
    }

    struct Tag;

    impl ResponseFilter for Tag {
        fn filter(&self, _ctx: &ApplicationContext, response: &mut HttpResponse) -> Result<(), ResourceError> {
            response.status = http::StatusCode::IM_A_TEAPOT;
            Ok(())
        }
    }

    #[test]
    fn test_filters_match_whole_path_only() {
        let registry = ProviderRegistry::new();
        registry
            .add_response_filter(Some("/a/{x}"), ObjectFactory::singleton(Arc::new(Tag) as Arc<dyn ResponseFilter>))
            .unwrap();
        registry
            .add_response_filter(None, ObjectFactory::singleton(Arc::new(Tag) as Arc<dyn ResponseFilter>))
            .unwrap();

        assert_eq!(registry.get_response_filters("/a/1").len(), 2);
        assert_eq!(registry.get_response_filters("/a/1/").len(), 2);
        assert_eq!(registry.get_response_filters("/a/1/b").len(), 1);
        assert_eq!(registry.get_response_filters("/b").len(), 1);
        assert!(registry.add_request_filter(Some("/{"), ObjectFactory::singleton(Arc::new(NoopRequest) as Arc<dyn RequestFilter>)).is_err());
    }

    struct NoopRequest;

    impl RequestFilter for NoopRequest {
        fn filter(&self, _ctx: &mut ApplicationContext) -> Result<Option<HttpResponse>, ResourceError> {
            Ok(None)
        }
    }
}
