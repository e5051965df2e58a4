//! Selection among representation variants.
//!
//! A resource that can answer in several media types, languages or
//! encodings lists them as [`Variant`]s and lets [`select_variant`] choose
//! using the request's `Accept*` headers. Filtering runs per axis in the
//! order media type, language, charset, encoding. At each stage the variants
//! compatible with an accepted value are kept, ordered by the client's
//! preference, followed by the variants that leave that axis unset.
//!
//! # Examples
//!
//! ```
//! use tessera_core::{HttpRequest, MediaType, Variant, select_variant};
//!
//! let variants = Variant::media_types(&[MediaType::json(), MediaType::xml()])
//!     .languages(&["en", "fr"])
//!     .build();
//!
//! let request = HttpRequest::get("/greeting")
//!     .with_header("Accept", "application/xml")
//!     .with_header("Accept-Language", "fr");
//!
//! let chosen = select_variant(&request, &variants).unwrap().unwrap();
//! assert_eq!(chosen.media_type, Some(MediaType::xml()));
//! assert_eq!(chosen.language.as_ref().unwrap().to_string(), "fr");
//! ```

use crate::content_negotiation::{AcceptLanguage, AcceptMediaType, AcceptToken, LanguageTag};
use crate::http::HttpRequest;
use crate::media_type::MediaType;
use crate::Error;
use http::header::{ACCEPT_CHARSET, ACCEPT_ENCODING, ACCEPT_LANGUAGE};

/// One representation a resource can produce. Unset axes match anything.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Variant {
    pub media_type: Option<MediaType>,
    pub language: Option<LanguageTag>,
    pub encoding: Option<String>,
}

impl Variant {
    pub fn new(
        media_type: Option<MediaType>,
        language: Option<LanguageTag>,
        encoding: Option<String>,
    ) -> Self {
        Self {
            media_type,
            language,
            encoding: encoding.map(|e| e.to_lowercase()),
        }
    }

    /// Start a [`VariantListBuilder`] with the given media types.
    pub fn media_types(types: &[MediaType]) -> VariantListBuilder {
        VariantListBuilder::new().media_types(types)
    }

    fn charset(&self) -> Option<&str> {
        self.media_type.as_ref().and_then(MediaType::charset)
    }
}

/// Builds the cartesian product of the configured axes.
#[derive(Debug, Clone, Default)]
pub struct VariantListBuilder {
    media_types: Vec<MediaType>,
    languages: Vec<LanguageTag>,
    encodings: Vec<String>,
}

impl VariantListBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn media_types(mut self, types: &[MediaType]) -> Self {
        self.media_types.extend_from_slice(types);
        self
    }

    /// Tags that fail to parse are skipped.
    pub fn languages(mut self, tags: &[&str]) -> Self {
        self.languages
            .extend(tags.iter().filter_map(|t| LanguageTag::parse(t).ok()));
        self
    }

    pub fn encodings(mut self, encodings: &[&str]) -> Self {
        self.encodings
            .extend(encodings.iter().map(|e| e.to_lowercase()));
        self
    }

    pub fn build(self) -> Vec<Variant> {
        fn axis<T: Clone>(values: &[T]) -> Vec<Option<T>> {
            if values.is_empty() {
                vec![None]
            } else {
                values.iter().cloned().map(Some).collect()
            }
        }

        let mut variants = Vec::new();
        for media_type in axis(&self.media_types) {
            for language in axis(&self.languages) {
                for encoding in axis(&self.encodings) {
                    variants.push(Variant::new(media_type.clone(), language.clone(), encoding));
                }
            }
        }
        variants
    }
}

/// Parsed `Accept*` headers of one request.
#[derive(Debug, Clone)]
pub struct AcceptHeaders {
    pub media_types: Vec<AcceptMediaType>,
    pub languages: Vec<AcceptLanguage>,
    pub charsets: Vec<AcceptToken>,
    pub encodings: Vec<AcceptToken>,
}

impl AcceptHeaders {
    pub fn from_request(request: &HttpRequest) -> Result<Self, Error> {
        Ok(Self {
            media_types: request.accept_media_types()?,
            languages: AcceptLanguage::parse_list(
                request.header_joined(ACCEPT_LANGUAGE.as_str()).as_deref(),
            )?,
            charsets: AcceptToken::parse_list(
                request.header_joined(ACCEPT_CHARSET.as_str()).as_deref(),
            )?,
            encodings: AcceptToken::parse_list(
                request.header_joined(ACCEPT_ENCODING.as_str()).as_deref(),
            )?,
        })
    }
}

fn filter_axis<'a, A, V: ?Sized + 'a>(
    accept: &[A],
    variants: Vec<&'a Variant>,
    value: impl Fn(&'a Variant) -> Option<&'a V>,
    compatible: impl Fn(&A, &V) -> bool,
) -> Vec<&'a Variant> {
    let mut kept: Vec<&'a Variant> = Vec::with_capacity(variants.len());
    for entry in accept {
        for &variant in &variants {
            if let Some(v) = value(variant)
                && compatible(entry, v)
                && !kept.iter().any(|k| std::ptr::eq(*k, variant))
            {
                kept.push(variant);
            }
        }
    }
    // axis-agnostic variants always survive, after the explicit ones
    kept.extend(variants.iter().copied().filter(|v| value(*v).is_none()));
    kept
}

/// Filter and order `variants` by the given headers; the first entry is the
/// best match. An empty result means nothing is acceptable.
pub fn filter_variants<'a>(accept: &AcceptHeaders, variants: &'a [Variant]) -> Vec<&'a Variant> {
    let list: Vec<&Variant> = variants.iter().collect();
    let list = filter_axis(
        &accept.media_types,
        list,
        |v| v.media_type.as_ref(),
        |a, m| a.media_type.is_compatible(m),
    );
    let list = filter_axis(
        &accept.languages,
        list,
        |v| v.language.as_ref(),
        |a, l| a.is_compatible(l),
    );
    let list = filter_axis(&accept.charsets, list, Variant::charset, |a, c| {
        a.is_compatible(c)
    });
    filter_axis(
        &accept.encodings,
        list,
        |v| v.encoding.as_deref(),
        |a, e| a.is_compatible(e),
    )
}

/// Best variant for `request`, `None` when no variant is acceptable.
///
/// Malformed `Accept*` headers are reported as [`Error::BadRequest`].
pub fn select_variant<'a>(
    request: &HttpRequest,
    variants: &'a [Variant],
) -> Result<Option<&'a Variant>, Error> {
    let accept = AcceptHeaders::from_request(request)?;
    Ok(filter_variants(&accept, variants).into_iter().next())
}
