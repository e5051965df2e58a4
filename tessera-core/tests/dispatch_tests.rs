// End-to-end dispatch behavior through the registries and the dispatcher

use http::{Method, StatusCode};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tessera_core::{
    ApplicationContext, DispatcherConfig, Error, HttpRequest, HttpResponse, Located,
    ProviderRegistry, RequestDispatcher, RequestHandler, Resource, ResourceBuilder, ResourceError,
    ResourceRegistry,
};

fn dispatch(resources: &Arc<ResourceRegistry>, request: HttpRequest) -> (HttpResponse, ApplicationContext) {
    let dispatcher = RequestDispatcher::new(Arc::clone(resources));
    let mut ctx = ApplicationContext::new(request, Arc::new(ProviderRegistry::with_defaults()));
    let response = dispatcher.dispatch(&mut ctx).unwrap();
    (response, ctx)
}

fn text(response: &HttpResponse) -> &str {
    response
        .entity_ref::<String>()
        .map(String::as_str)
        .or_else(|| response.entity_ref::<&'static str>().copied())
        .unwrap_or_default()
}

// ============================================================================
// Books: quality decides between two GET methods
// ============================================================================

struct Books;

impl Resource for Books {
    fn path() -> Option<&'static str> {
        Some("/books/{id}")
    }

    fn describe(r: &mut ResourceBuilder<Self>) {
        r.get(|_, ctx| Ok(format!("{{\"id\":\"{}\"}}", ctx.path_param("id").unwrap_or_default())))
            .produces(&["application/json"])
            .name("book_json");
        r.get(|_, ctx| Ok(format!("<book id=\"{}\"/>", ctx.path_param("id").unwrap_or_default())))
            .produces(&["application/xml"])
            .name("book_xml");
    }
}

#[test]
fn test_books_prefers_xml_by_quality() {
    let resources = Arc::new(ResourceRegistry::new());
    resources.add_singleton(Books).unwrap();

    let request = HttpRequest::get("/books/42")
        .with_header("Accept", "application/xml;q=1.0,application/json;q=0.5");
    let (response, ctx) = dispatch(&resources, request);

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("application/xml"));
    assert_eq!(text(&response), "<book id=\"42\"/>");
    assert_eq!(ctx.path_param("id").as_deref(), Some("42"));
}

#[test]
fn test_books_through_handler() {
    let resources = Arc::new(ResourceRegistry::new());
    resources.add_singleton(Books).unwrap();
    let handler = RequestHandler::new(resources, Arc::new(ProviderRegistry::with_defaults()));

    let response = handler
        .handle_buffered(HttpRequest::get("/books/7").with_header("Accept", "application/json"))
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("application/json"));
    assert_eq!(response.text(), "{\"id\":\"7\"}");
}

// ============================================================================
// Accounts: one locator hop
// ============================================================================

struct Accounts;

struct Transactions {
    account: String,
}

impl Resource for Accounts {
    fn path() -> Option<&'static str> {
        Some("/accounts/{id}")
    }

    fn describe(r: &mut ResourceBuilder<Self>) {
        r.get(|_, ctx| Ok(format!("account {}", ctx.path_param("id").unwrap_or_default())));
        r.locator("/transactions", |_, ctx| {
            Ok(Located::new(Transactions {
                account: ctx.path_param("id").unwrap_or_default(),
            }))
        });
    }
}

impl Resource for Transactions {
    fn describe(r: &mut ResourceBuilder<Self>) {
        r.get(|t, ctx| {
            let uris: Vec<&str> = ctx.matched_uris().collect();
            Ok(format!("{} {} {}", t.account, ctx.locator_depth(), uris.join(",")))
        });
    }
}

#[test]
fn test_accounts_locator_recurses_once() {
    let resources = Arc::new(ResourceRegistry::new());
    resources.add_singleton(Accounts).unwrap();

    let (response, ctx) = dispatch(&resources, HttpRequest::get("/accounts/7/transactions"));
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(text(&response), "7 1 /transactions,/accounts/7");
    assert_eq!(ctx.matched_uris().count(), 2);
    assert_eq!(ctx.matched_resources().count(), 2);

    let (response, ctx) = dispatch(&resources, HttpRequest::get("/accounts/7"));
    assert_eq!(text(&response), "account 7");
    assert_eq!(ctx.locator_depth(), 0);
}

#[test]
fn test_locator_descriptor_is_cached() {
    let resources = Arc::new(ResourceRegistry::new());
    resources.add_singleton(Accounts).unwrap();
    let dispatcher = RequestDispatcher::new(Arc::clone(&resources));
    let providers = Arc::new(ProviderRegistry::with_defaults());

    for _ in 0..3 {
        let mut ctx = ApplicationContext::new(HttpRequest::get("/accounts/1/transactions"), Arc::clone(&providers));
        dispatcher.dispatch(&mut ctx).unwrap();
    }
    assert_eq!(dispatcher.descriptor_cache().len(), 1);
}

// ============================================================================
// Registration and matching properties
// ============================================================================

struct Items;

impl Resource for Items {
    fn path() -> Option<&'static str> {
        Some("/items/{id}")
    }

    fn describe(r: &mut ResourceBuilder<Self>) {
        r.get(|_, _| Ok("item"));
        r.post(|_, _| Ok(()));
    }
}

struct OtherItems;

impl Resource for OtherItems {
    fn path() -> Option<&'static str> {
        Some("/items/{key}")
    }

    fn describe(r: &mut ResourceBuilder<Self>) {
        r.get(|_, _| Ok("other"));
    }
}

#[test]
fn test_structurally_equal_patterns_conflict() {
    let resources = ResourceRegistry::new();
    assert!(resources.add_singleton(Items).unwrap());
    assert!(!resources.add_singleton(Items).unwrap());
    assert_eq!(resources.len(), 1);

    let result = resources.add_singleton(OtherItems);
    assert!(matches!(result, Err(Error::DuplicateResource(_))));
    assert_eq!(resources.len(), 1);
}

#[test]
fn test_not_found_until_registered() {
    let resources = Arc::new(ResourceRegistry::new());

    let (response, _) = dispatch(&resources, HttpRequest::get("/items/1"));
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(text(&response), "There is no any resources matched to request path /items/1");

    resources.add_singleton(Items).unwrap();
    let (response, _) = dispatch(&resources, HttpRequest::get("/items/1"));
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(text(&response), "item");
}

#[test]
fn test_method_not_allowed_lists_declared_verbs() {
    let resources = Arc::new(ResourceRegistry::new());
    resources.add_singleton(Items).unwrap();

    let (response, _) = dispatch(&resources, HttpRequest::put("/items/1"));
    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);

    let mut allow: Vec<&str> = response.header("allow").unwrap().split(',').collect();
    allow.sort_unstable();
    assert_eq!(allow, ["GET", "POST"]);
    assert_eq!(text(&response), "PUT method is not allowed for resource /items/1");
}

#[test]
fn test_options_and_head_are_implicit() {
    let resources = Arc::new(ResourceRegistry::new());
    resources.add_singleton(Items).unwrap();

    let (response, _) = dispatch(&resources, HttpRequest::options("/items/1"));
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("allow"), Some("GET,HEAD,OPTIONS,POST"));

    let handler = RequestHandler::new(resources, Arc::new(ProviderRegistry::with_defaults()));
    let response = handler.handle_buffered(HttpRequest::head("/items/1")).unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-length"), Some("4"));
    assert!(response.body.is_empty());
}

// ============================================================================
// Method versus locator
// ============================================================================

struct Shelf;

struct Drawer;

impl Resource for Shelf {
    fn path() -> Option<&'static str> {
        Some("/shelf")
    }

    fn describe(r: &mut ResourceBuilder<Self>) {
        r.get(|_, _| Ok("method")).path("/{slot}");
        r.locator("/{slot}", |_, _| Ok(Located::new(Drawer)));
        r.locator("/{slot}/inside", |_, _| Ok(Located::new(Drawer)));
    }
}

impl Resource for Drawer {
    fn describe(r: &mut ResourceBuilder<Self>) {
        r.get(|_, _| Ok("locator"));
    }
}

#[test]
fn test_method_wins_equal_specificity() {
    let resources = Arc::new(ResourceRegistry::new());
    resources.add_singleton(Shelf).unwrap();

    let (response, ctx) = dispatch(&resources, HttpRequest::get("/shelf/top"));
    assert_eq!(text(&response), "method");
    assert_eq!(ctx.path_param("slot").as_deref(), Some("top"));
    assert_eq!(ctx.locator_depth(), 0);

    let (response, ctx) = dispatch(&resources, HttpRequest::get("/shelf/top/inside"));
    assert_eq!(text(&response), "locator");
    assert_eq!(ctx.locator_depth(), 1);
}

struct Cabinet;

impl Resource for Cabinet {
    fn path() -> Option<&'static str> {
        Some("/cabinet")
    }

    fn describe(r: &mut ResourceBuilder<Self>) {
        r.get(|_, _| Ok("method")).path("/{slot}");
        r.locator("/top", |_, _| Ok(Located::new(Drawer)));
    }
}

#[test]
fn test_more_specific_locator_beats_method() {
    let resources = Arc::new(ResourceRegistry::new());
    resources.add_singleton(Cabinet).unwrap();

    let (response, ctx) = dispatch(&resources, HttpRequest::get("/cabinet/top"));
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(text(&response), "locator");
    assert_eq!(ctx.locator_depth(), 1);
    assert_eq!(ctx.path_param("slot"), None);

    let (response, ctx) = dispatch(&resources, HttpRequest::get("/cabinet/other"));
    assert_eq!(text(&response), "method");
    assert_eq!(ctx.path_param("slot").as_deref(), Some("other"));
    assert_eq!(ctx.locator_depth(), 0);
}

// ============================================================================
// Media types
// ============================================================================

struct Uploads;

impl Resource for Uploads {
    fn path() -> Option<&'static str> {
        Some("/uploads")
    }

    fn describe(r: &mut ResourceBuilder<Self>) {
        r.post(|_, ctx| {
            let body: serde_json::Value = ctx.read_entity()?;
            Ok(body)
        })
        .consumes(&["application/json"])
        .produces(&["application/json"]);
    }
}

#[test]
fn test_unsupported_and_not_acceptable() {
    let resources = Arc::new(ResourceRegistry::new());
    resources.add_singleton(Uploads).unwrap();

    let request = HttpRequest::post("/uploads").with_header("Content-Type", "text/plain");
    let (response, _) = dispatch(&resources, request);
    assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(text(&response), "Media type text/plain is not supported.");

    let request = HttpRequest::post("/uploads")
        .with_header("Content-Type", "application/json")
        .with_header("Accept", "text/html");
    let (response, _) = dispatch(&resources, request);
    assert_eq!(response.status, StatusCode::NOT_ACCEPTABLE);
}

#[test]
fn test_json_round_trip() {
    let resources = Arc::new(ResourceRegistry::new());
    resources.add_singleton(Uploads).unwrap();
    let handler = RequestHandler::new(resources, Arc::new(ProviderRegistry::with_defaults()));

    let request = HttpRequest::post("/uploads")
        .with_header("Content-Type", "application/json")
        .with_body(r#"{"name":"tessera"}"#);
    let response = handler.handle_buffered(request).unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("application/json"));

    let echoed: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(echoed["name"], "tessera");
}

// ============================================================================
// Depth guard
// ============================================================================

struct Mirror;

impl Resource for Mirror {
    fn path() -> Option<&'static str> {
        Some("/mirror")
    }

    fn describe(r: &mut ResourceBuilder<Self>) {
        r.get(|_, _| Ok("reflection"));
        r.locator("/{any}", |_, _| Ok(Located::new(Mirror)));
    }
}

#[test]
fn test_locator_depth_guard() {
    let resources = Arc::new(ResourceRegistry::new());
    resources.add_singleton(Mirror).unwrap();
    let config = DispatcherConfig::new().max_locator_depth(3);
    let dispatcher = RequestDispatcher::with_config(Arc::clone(&resources), &config);
    let providers = Arc::new(ProviderRegistry::with_defaults());

    let mut ctx = ApplicationContext::new(HttpRequest::get("/mirror/a/b/c"), Arc::clone(&providers));
    let response = dispatcher.dispatch(&mut ctx).unwrap();
    assert_eq!(text(&response), "reflection");

    let mut ctx = ApplicationContext::new(HttpRequest::get("/mirror/a/b/c/d"), Arc::clone(&providers));
    let err = dispatcher.dispatch(&mut ctx).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::LocatorDepthExceeded(3))));

    let handler = RequestHandler::with_config(resources, providers, config);
    let response = handler.handle_buffered(HttpRequest::get("/mirror/a/b/c/d")).unwrap();
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
}

// ============================================================================
// Per-request lifecycle
// ============================================================================

static CREATED: AtomicUsize = AtomicUsize::new(0);
static DESTROYED: AtomicUsize = AtomicUsize::new(0);

struct Session;

impl Resource for Session {
    fn path() -> Option<&'static str> {
        Some("/session")
    }

    fn describe(r: &mut ResourceBuilder<Self>) {
        r.method(Method::GET, |_, _| Ok("open"));
    }

    fn destroy(&self) -> Result<(), ResourceError> {
        DESTROYED.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_per_request_instances_are_destroyed() {
    let resources = Arc::new(ResourceRegistry::new());
    resources
        .add_per_request(|| {
            CREATED.fetch_add(1, Ordering::SeqCst);
            Session
        })
        .unwrap();
    let handler = RequestHandler::new(resources, Arc::new(ProviderRegistry::with_defaults()));

    for _ in 0..2 {
        let response = handler.handle_buffered(HttpRequest::get("/session")).unwrap();
        assert_eq!(response.text(), "open");
    }
    assert_eq!(CREATED.load(Ordering::SeqCst), 2);
    assert_eq!(DESTROYED.load(Ordering::SeqCst), 2);
}
