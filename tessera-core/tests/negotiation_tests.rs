// Provider lookup and representation negotiation

use http::HeaderMap;
use http::StatusCode;
use std::io::Write;
use std::sync::Arc;
use tessera_core::builtin::StringProvider;
use tessera_core::variant::{AcceptHeaders, filter_variants};
use tessera_core::{
    Entity, EntityType, Error, HttpRequest, MediaType, MessageBodyWriter, ProviderRegistry,
    RequestHandler, Resource, ResourceBuilder, ResourceRegistry, Variant,
};

struct Report {
    rows: Vec<(String, u32)>,
}

struct CsvWriter;

impl MessageBodyWriter for CsvWriter {
    fn is_writeable(&self, ty: &EntityType, _media_type: &MediaType) -> bool {
        ty.is::<Report>()
    }

    fn write_to(
        &self,
        entity: &Entity,
        _media_type: &MediaType,
        _headers: &mut HeaderMap,
        out: &mut dyn Write,
    ) -> Result<(), Error> {
        let report = entity
            .downcast_ref::<Report>()
            .ok_or_else(|| Error::Serialization("not a report".to_string()))?;
        for (name, count) in &report.rows {
            writeln!(out, "{},{}", name, count)?;
        }
        Ok(())
    }
}

#[test]
fn test_writer_lookup_walks_media_type_range() {
    let providers = ProviderRegistry::with_defaults();
    let string = EntityType::of::<String>();

    let plain = providers.get_message_body_writer(&string, &MediaType::plain_text());
    assert!(plain.is_some_and(|w| w.is_writeable(&string, &MediaType::plain_text())));
    assert!(providers.get_message_body_writer(&string, &MediaType::any()).is_some());
    assert!(providers.get_message_body_writer(&string, &MediaType::html()).is_some());
}

#[test]
fn test_custom_writer_round_trip() {
    let providers = ProviderRegistry::new();
    providers.add_writer(CsvWriter, &["text/csv"]).unwrap();
    let report = EntityType::of::<Report>();

    let csv = MediaType::parse("text/csv").unwrap();
    assert!(providers.get_message_body_writer(&report, &csv).is_some());

    let csv_utf8 = MediaType::parse("text/csv; charset=utf-8").unwrap();
    assert!(providers.get_message_body_writer(&report, &csv_utf8).is_some());

    assert!(providers.get_message_body_writer(&report, &MediaType::json()).is_none());
    assert!(
        providers
            .get_message_body_writer(&EntityType::of::<String>(), &csv)
            .is_none()
    );
    assert_eq!(providers.get_acceptable_writer_media_types(&report), [csv]);
}

#[test]
fn test_later_writer_does_not_shadow_earlier() {
    let providers = ProviderRegistry::new();
    providers.add_writer(StringProvider, &["text/plain"]).unwrap();
    providers.add_writer(CsvWriter, &["text/plain"]).unwrap();

    let string = EntityType::of::<String>();
    let report = EntityType::of::<Report>();
    assert!(providers.get_message_body_writer(&string, &MediaType::plain_text()).is_some());
    assert!(providers.get_message_body_writer(&report, &MediaType::plain_text()).is_some());
}

struct Reports;

impl Resource for Reports {
    fn path() -> Option<&'static str> {
        Some("/reports")
    }

    fn describe(r: &mut ResourceBuilder<Self>) {
        r.get(|_, _| {
            Ok(Entity::new(Report {
                rows: vec![("alpha".to_string(), 3), ("beta".to_string(), 5)],
            }))
        })
        .produces(&["text/csv"]);
    }
}

#[test]
fn test_custom_writer_serves_response() {
    let resources = Arc::new(ResourceRegistry::new());
    resources.add_singleton(Reports).unwrap();
    let providers = Arc::new(ProviderRegistry::with_defaults());
    providers.add_writer(CsvWriter, &["text/csv"]).unwrap();
    let handler = RequestHandler::new(resources, providers);

    let response = handler.handle_buffered(HttpRequest::get("/reports")).unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("text/csv"));
    assert_eq!(response.text(), "alpha,3\nbeta,5\n");
}

#[test]
fn test_variant_filtering_is_idempotent() {
    let variants = Variant::media_types(&[MediaType::json(), MediaType::xml(), MediaType::html()])
        .languages(&["en", "de"])
        .encodings(&["gzip", "identity"])
        .build();
    let request = HttpRequest::get("/")
        .with_header("Accept", "application/xml, application/json;q=0.8, */*;q=0.1")
        .with_header("Accept-Language", "de, en;q=0.5")
        .with_header("Accept-Encoding", "gzip");
    let accept = AcceptHeaders::from_request(&request).unwrap();

    let once: Vec<Variant> = filter_variants(&accept, &variants).into_iter().cloned().collect();
    let twice: Vec<Variant> = filter_variants(&accept, &once).into_iter().cloned().collect();
    assert!(!once.is_empty());
    assert_eq!(once, twice);
    assert_eq!(once[0].media_type, Some(MediaType::xml()));
    assert_eq!(once[0].encoding.as_deref(), Some("gzip"));
}
