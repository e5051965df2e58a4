use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use tessera::content_negotiation::{acceptable_media_type, process_quality};
use tessera::{
    AcceptMediaType, ApplicationContext, HttpRequest, Located, MediaType, ProviderRegistry,
    RequestDispatcher, RequestHandler, Resource, ResourceBuilder, ResourceRegistry, RootResource,
    UriPattern, Variant, select_variant,
};

struct Books;

impl Resource for Books {
    fn path() -> Option<&'static str> {
        Some("/books/{id}")
    }

    fn describe(r: &mut ResourceBuilder<Self>) {
        r.get(|_, ctx| Ok(ctx.path_param("id").unwrap_or_default()))
            .produces(&["application/json"]);
        r.get(|_, ctx| Ok(ctx.path_param("id").unwrap_or_default()))
            .produces(&["application/xml"]);
        r.locator("/chapters/{n}", |_, _| Ok(Located::new(Chapter)));
    }
}

struct Chapter;

impl Resource for Chapter {
    fn describe(r: &mut ResourceBuilder<Self>) {
        r.get(|_, _| Ok("chapter"));
    }
}

macro_rules! filler_resource {
    ($($name:ident => $path:literal),* $(,)?) => {
        $(
            struct $name;

            impl Resource for $name {
                fn path() -> Option<&'static str> {
                    Some($path)
                }

                fn describe(r: &mut ResourceBuilder<Self>) {
                    r.get(|_, _| Ok("filler"));
                }
            }
        )*
    };
}

filler_resource! {
    Authors => "/authors/{id}",
    Publishers => "/publishers/{id}",
    Series => "/series/{id}/volumes",
    Reviews => "/reviews/{id}",
    Tags => "/tags",
    Search => "/search/{query: .+}",
}

fn registry() -> Arc<ResourceRegistry> {
    let resources = Arc::new(ResourceRegistry::new());
    resources.add_singleton(Books).unwrap();
    resources.add_singleton(Authors).unwrap();
    resources.add_singleton(Publishers).unwrap();
    resources.add_singleton(Series).unwrap();
    resources.add_singleton(Reviews).unwrap();
    resources.add_singleton(Tags).unwrap();
    resources.add_singleton(Search).unwrap();
    resources
}

fn bench_uri_pattern(c: &mut Criterion) {
    let mut group = c.benchmark_group("uri_pattern");
    let pattern = UriPattern::new("/books/{id}/chapters/{n}").unwrap();

    group.bench_function("compile", |b| {
        b.iter(|| UriPattern::new(black_box("/books/{id}/chapters/{n}")))
    });
    group.bench_function("match_terminal", |b| {
        b.iter(|| pattern.match_uri(black_box("/books/42/chapters/7")))
    });
    group.bench_function("match_tail", |b| {
        b.iter(|| pattern.match_uri(black_box("/books/42/chapters/7/pages/3")))
    });
    group.bench_function("miss", |b| {
        b.iter(|| pattern.match_uri(black_box("/authors/42")))
    });

    group.finish();
}

fn bench_registry(c: &mut Criterion) {
    let resources = registry();

    c.bench_function("registry_find", |b| {
        b.iter(|| resources.find(black_box("/series/9/volumes")))
    });

    c.bench_function("registry_add_remove", |b| {
        b.iter(|| {
            let root = RootResource::singleton(Tags).unwrap();
            let resources = ResourceRegistry::new();
            resources.add_resource(root).unwrap();
            resources.remove::<Tags>()
        })
    });
}

fn bench_negotiation(c: &mut Criterion) {
    let mut group = c.benchmark_group("negotiation");
    let header = "application/xml;q=1.0, application/json;q=0.5, text/*;q=0.2, */*;q=0.1";
    let accept = AcceptMediaType::parse_list(Some(header)).unwrap();
    let produces = vec![MediaType::json(), MediaType::plain_text()];

    group.bench_function("parse_accept", |b| {
        b.iter(|| AcceptMediaType::parse_list(black_box(Some(header))))
    });
    group.bench_function("process_quality", |b| {
        b.iter(|| process_quality(black_box(&accept), black_box(&produces)))
    });
    group.bench_function("acceptable_media_type", |b| {
        b.iter(|| acceptable_media_type(black_box(&accept), black_box(&produces)))
    });

    let variants = Variant::media_types(&[MediaType::json(), MediaType::xml(), MediaType::html()])
        .languages(&["en", "de", "fr"])
        .encodings(&["gzip", "identity"])
        .build();
    let request = HttpRequest::get("/")
        .with_header("Accept", header)
        .with_header("Accept-Language", "fr, en;q=0.7")
        .with_header("Accept-Encoding", "gzip");
    group.bench_function("select_variant", |b| {
        b.iter(|| select_variant(black_box(&request), black_box(&variants)))
    });

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    let resources = registry();
    let providers = Arc::new(ProviderRegistry::with_defaults());
    let dispatcher = RequestDispatcher::new(Arc::clone(&resources));

    let books = HttpRequest::get("/books/42")
        .with_header("Accept", "application/xml;q=1.0,application/json;q=0.5");
    group.bench_function("resource_method", |b| {
        b.iter(|| {
            let mut ctx = ApplicationContext::new(books.clone(), Arc::clone(&providers));
            dispatcher.dispatch(&mut ctx)
        })
    });

    let chapter = HttpRequest::get("/books/42/chapters/3");
    group.bench_function("locator_cached", |b| {
        b.iter(|| {
            let mut ctx = ApplicationContext::new(chapter.clone(), Arc::clone(&providers));
            dispatcher.dispatch(&mut ctx)
        })
    });

    let handler = RequestHandler::new(resources, providers);
    group.bench_function("full_pipeline", |b| {
        b.iter(|| handler.handle_buffered(black_box(books.clone())))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_uri_pattern,
    bench_registry,
    bench_negotiation,
    bench_dispatch
);
criterion_main!(benches);
