// Built-in message body providers

use crate::Error;
use crate::component::ObjectFactory;
use crate::http::{Entity, EntityType};
use crate::media_type::MediaType;
use crate::provider::{
    MessageBodyReader, MessageBodyWriter, ProviderDescriptor, ProviderFactory, ProviderRegistry,
};
use bytes::Bytes;
use http::HeaderMap;
use std::io::{Read, Write};
use std::sync::Arc;

/// Reads and writes `String` bodies; also writes `&'static str`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringProvider;

impl StringProvider {
    fn text(entity: &Entity) -> Option<&str> {
        entity
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| entity.downcast_ref::<&'static str>().copied())
    }
}

impl MessageBodyReader for StringProvider {
    fn is_readable(&self, ty: &EntityType, _media_type: &MediaType) -> bool {
        ty.is::<String>()
    }

    fn read_from(
        &self,
        _ty: &EntityType,
        media_type: &MediaType,
        _headers: &HeaderMap,
        body: &mut dyn Read,
    ) -> Result<Entity, Error> {
        let mut raw = Vec::new();
        body.read_to_end(&mut raw)?;
        if let Some(charset) = media_type.charset()
            && !charset.eq_ignore_ascii_case("utf-8")
            && !charset.eq_ignore_ascii_case("us-ascii")
        {
            return Err(Error::UnsupportedMediaType(format!(
                "Charset {} is not supported.",
                charset
            )));
        }
        let text = String::from_utf8(raw)
            .map_err(|e| Error::Deserialization(format!("request body is not UTF-8: {}", e)))?;
        Ok(Entity::new(text))
    }
}

impl MessageBodyWriter for StringProvider {
    fn is_writeable(&self, ty: &EntityType, _media_type: &MediaType) -> bool {
        ty.is::<String>() || ty.is::<&'static str>()
    }

    fn size(&self, entity: &Entity, _media_type: &MediaType) -> Option<u64> {
        Self::text(entity).map(|s| s.len() as u64)
    }

    fn write_to(
        &self,
        entity: &Entity,
        _media_type: &MediaType,
        _headers: &mut HeaderMap,
        out: &mut dyn Write,
    ) -> Result<(), Error> {
        let text = Self::text(entity).ok_or_else(|| {
            Error::Serialization(format!("{} is not a string", entity.entity_type()))
        })?;
        out.write_all(text.as_bytes())?;
        Ok(())
    }
}

/// Reads `Vec<u8>` or `Bytes` bodies and writes either.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesProvider;

impl BytesProvider {
    fn bytes(entity: &Entity) -> Option<&[u8]> {
        entity
            .downcast_ref::<Vec<u8>>()
            .map(Vec::as_slice)
            .or_else(|| entity.downcast_ref::<Bytes>().map(|b| b.as_ref()))
    }
}

impl MessageBodyReader for BytesProvider {
    fn is_readable(&self, ty: &EntityType, _media_type: &MediaType) -> bool {
        ty.is::<Vec<u8>>() || ty.is::<Bytes>()
    }

    fn read_from(
        &self,
        ty: &EntityType,
        _media_type: &MediaType,
        _headers: &HeaderMap,
        body: &mut dyn Read,
    ) -> Result<Entity, Error> {
        let mut raw = Vec::new();
        body.read_to_end(&mut raw)?;
        if ty.is::<Bytes>() {
            Ok(Entity::new(Bytes::from(raw)))
        } else {
            Ok(Entity::new(raw))
        }
    }
}

impl MessageBodyWriter for BytesProvider {
    fn is_writeable(&self, ty: &EntityType, _media_type: &MediaType) -> bool {
        ty.is::<Vec<u8>>() || ty.is::<Bytes>()
    }

    fn size(&self, entity: &Entity, _media_type: &MediaType) -> Option<u64> {
        Self::bytes(entity).map(|b| b.len() as u64)
    }

    fn write_to(
        &self,
        entity: &Entity,
        _media_type: &MediaType,
        _headers: &mut HeaderMap,
        out: &mut dyn Write,
    ) -> Result<(), Error> {
        let bytes = Self::bytes(entity).ok_or_else(|| {
            Error::Serialization(format!("{} is not a byte buffer", entity.entity_type()))
        })?;
        out.write_all(bytes)?;
        Ok(())
    }
}

/// `serde_json::Value` as `application/json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonValueProvider;

impl MessageBodyReader for JsonValueProvider {
    fn is_readable(&self, ty: &EntityType, _media_type: &MediaType) -> bool {
        ty.is::<serde_json::Value>()
    }

    fn read_from(
        &self,
        _ty: &EntityType,
        _media_type: &MediaType,
        _headers: &HeaderMap,
        body: &mut dyn Read,
    ) -> Result<Entity, Error> {
        let value: serde_json::Value = serde_json::from_reader(body)
            .map_err(|e| Error::Deserialization(e.to_string()))?;
        Ok(Entity::new(value))
    }
}

impl MessageBodyWriter for JsonValueProvider {
    fn is_writeable(&self, ty: &EntityType, _media_type: &MediaType) -> bool {
        ty.is::<serde_json::Value>()
    }

    fn write_to(
        &self,
        entity: &Entity,
        _media_type: &MediaType,
        _headers: &mut HeaderMap,
        out: &mut dyn Write,
    ) -> Result<(), Error> {
        let value = entity.downcast_ref::<serde_json::Value>().ok_or_else(|| {
            Error::Serialization(format!("{} is not a JSON value", entity.entity_type()))
        })?;
        serde_json::to_writer(out, value).map_err(|e| Error::Serialization(e.to_string()))
    }
}

fn descriptor<T>(types: &[MediaType]) -> ProviderDescriptor {
    ProviderDescriptor::of::<T>(types.to_vec(), types.to_vec())
}

/// Register the built-in providers with `registry`.
pub fn install(registry: &ProviderRegistry) {
    let text = [MediaType::plain_text(), MediaType::any()];
    let binary = [MediaType::octet_stream(), MediaType::any()];
    let json = [MediaType::json()];

    let strings = Arc::new(StringProvider);
    registry.add_message_body_reader(ProviderFactory::new(
        descriptor::<StringProvider>(&text),
        ObjectFactory::singleton(Arc::clone(&strings) as Arc<dyn MessageBodyReader>),
    ));
    registry.add_message_body_writer(ProviderFactory::new(
        descriptor::<StringProvider>(&text),
        ObjectFactory::singleton(strings as Arc<dyn MessageBodyWriter>),
    ));

    let bytes = Arc::new(BytesProvider);
    registry.add_message_body_reader(ProviderFactory::new(
        descriptor::<BytesProvider>(&binary),
        ObjectFactory::singleton(Arc::clone(&bytes) as Arc<dyn MessageBodyReader>),
    ));
    registry.add_message_body_writer(ProviderFactory::new(
        descriptor::<BytesProvider>(&binary),
        ObjectFactory::singleton(bytes as Arc<dyn MessageBodyWriter>),
    ));

    let values = Arc::new(JsonValueProvider);
    registry.add_message_body_reader(ProviderFactory::new(
        descriptor::<JsonValueProvider>(&json),
        ObjectFactory::singleton(Arc::clone(&values) as Arc<dyn MessageBodyReader>),
    ));
    registry.add_message_body_writer(ProviderFactory::new(
        descriptor::<JsonValueProvider>(&json),
        ObjectFactory::singleton(values as Arc<dyn MessageBodyWriter>),
    ));
}
