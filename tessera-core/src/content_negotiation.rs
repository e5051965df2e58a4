//! Parsing of `Accept*` request headers.
//!
//! Each header becomes a list of entries sorted by quality value, highest
//! first. Entries with equal quality keep their declaration order. A missing
//! or empty header, or a lone `*`/`*/*`, accepts everything.
//!
//! # Supported Headers
//!
//! - `Accept` - [`AcceptMediaType`]
//! - `Accept-Language` - [`AcceptLanguage`]
//! - `Accept-Charset` and `Accept-Encoding` - [`AcceptToken`]
//!
//! # Examples
//!
//! ```
//! use tessera_core::{AcceptMediaType, MediaType};
//!
//! let accept = AcceptMediaType::parse_list(Some("application/json;q=0.5, application/xml")).unwrap();
//! assert_eq!(accept[0].media_type.mime_type(), "application/xml");
//! assert_eq!(accept[1].quality, 0.5);
//!
//! let produces = vec![MediaType::json(), MediaType::xml()];
//! let chosen = tessera_core::content_negotiation::acceptable_media_type(&accept, &produces);
//! assert_eq!(chosen, Some(MediaType::xml()));
//! ```

use crate::Error;
use crate::media_type::{MediaType, WILDCARD};
use std::fmt;

// ============================================================================
// Quality values
// ============================================================================

pub const DEFAULT_QUALITY: f32 = 1.0;

/// Parse a `q` parameter: at most five characters, between 0 and 1.
pub fn parse_quality(value: &str) -> Result<f32, Error> {
    let value = value.trim();
    if value.is_empty() || value.len() > 5 {
        return Err(Error::BadRequest(format!("invalid quality value '{}'", value)));
    }
    let quality: f32 = value
        .parse()
        .map_err(|_| Error::BadRequest(format!("invalid quality value '{}'", value)))?;
    if !(0.0..=1.0).contains(&quality) {
        return Err(Error::BadRequest(format!(
            "quality value '{}' is out of range",
            value
        )));
    }
    Ok(quality)
}

/// Split `value;q=0.5;other=x` into the value, its quality and the
/// remaining parameters.
fn split_quality(part: &str) -> Result<(String, f32), Error> {
    let mut quality = DEFAULT_QUALITY;
    let mut kept = Vec::new();
    for (i, piece) in part.split(';').enumerate() {
        if i > 0
            && let Some((key, value)) = piece.split_once('=')
            && key.trim().eq_ignore_ascii_case("q")
        {
            quality = parse_quality(value)?;
            continue;
        }
        kept.push(piece);
    }
    Ok((kept.join(";"), quality))
}

fn sort_by_quality<T>(entries: &mut [T], quality: impl Fn(&T) -> f32) {
    // stable: equal quality keeps declaration order
    entries.sort_by(|a, b| quality(b).total_cmp(&quality(a)));
}

fn is_accept_all(header: Option<&str>, wildcard: &str) -> bool {
    match header.map(str::trim) {
        None => true,
        Some(h) => h.is_empty() || h == wildcard,
    }
}

// ============================================================================
// Accept
// ============================================================================

/// One entry of an `Accept` header.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptMediaType {
    pub media_type: MediaType,
    pub quality: f32,
}

impl AcceptMediaType {
    pub fn new(media_type: MediaType, quality: f32) -> Self {
        Self {
            media_type,
            quality,
        }
    }

    /// `*/*;q=1`
    pub fn any() -> Self {
        Self::new(MediaType::any(), DEFAULT_QUALITY)
    }

    pub fn parse(part: &str) -> Result<Self, Error> {
        let (media_part, quality) = split_quality(part)?;
        let media_type = MediaType::parse(&media_part)
            .map_err(|_| Error::BadRequest(format!("invalid Accept entry '{}'", part.trim())))?;
        Ok(Self::new(media_type, quality))
    }

    /// Parse a whole `Accept` header into a quality-sorted list.
    pub fn parse_list(header: Option<&str>) -> Result<Vec<Self>, Error> {
        if is_accept_all(header, "*/*") {
            return Ok(vec![Self::any()]);
        }
        let mut list = header
            .unwrap_or_default()
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(Self::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if list.is_empty() {
            return Ok(vec![Self::any()]);
        }
        sort_by_quality(&mut list, |a| a.quality);
        Ok(list)
    }
}

impl fmt::Display for AcceptMediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};q={}", self.media_type, self.quality)
    }
}

/// Quality of the first `Accept` entry that is either a full wildcard or
/// compatible with one of the produced types; `0.0` when none is.
pub fn process_quality(accept: &[AcceptMediaType], produces: &[MediaType]) -> f32 {
    for entry in accept {
        if entry.media_type.is_wildcard_type() {
            return entry.quality;
        }
        if produces.iter().any(|p| p.is_compatible(&entry.media_type)) {
            return entry.quality;
        }
    }
    0.0
}

/// Pick the concrete type to announce for a response.
///
/// With nothing produced the client's first preference is returned. A
/// wildcard `Accept` entry takes the first produced type; otherwise the
/// first produced type compatible with an entry and free of wildcards.
pub fn acceptable_media_type(
    accept: &[AcceptMediaType],
    produces: &[MediaType],
) -> Option<MediaType> {
    if produces.is_empty() {
        return accept.first().map(|a| a.media_type.clone());
    }
    for entry in accept {
        if entry.media_type.is_wildcard_type() {
            return produces.first().cloned();
        }
        if let Some(found) = produces.iter().find(|p| {
            p.is_compatible(&entry.media_type) && !p.is_wildcard_type() && !p.is_wildcard_subtype()
        }) {
            return Some(found.clone());
        }
    }
    None
}

// ============================================================================
// Accept-Language
// ============================================================================

/// Language tag such as `en` or `en-gb`, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LanguageTag {
    pub primary: String,
    pub sub: String,
}

impl LanguageTag {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into().to_lowercase(),
            sub: String::new(),
        }
    }

    pub fn with_sub(primary: impl Into<String>, sub: impl Into<String>) -> Self {
        Self {
            primary: primary.into().to_lowercase(),
            sub: sub.into().to_lowercase(),
        }
    }

    pub fn any() -> Self {
        Self::new(WILDCARD)
    }

    pub fn parse(s: &str) -> Result<Self, Error> {
        let s = s.trim();
        let valid = |p: &str| !p.is_empty() && p.chars().all(|c| c.is_ascii_alphanumeric() || c == '*');
        match s.split_once('-') {
            Some((primary, sub)) if valid(primary) && sub.split('-').all(valid) => {
                Ok(Self::with_sub(primary, sub))
            }
            None if valid(s) => Ok(Self::new(s)),
            _ => Err(Error::BadRequest(format!("invalid language tag '{}'", s))),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.primary == WILDCARD
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sub.is_empty() {
            f.write_str(&self.primary)
        } else {
            write!(f, "{}-{}", self.primary, self.sub)
        }
    }
}

/// One entry of an `Accept-Language` header.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptLanguage {
    pub language: LanguageTag,
    pub quality: f32,
}

impl AcceptLanguage {
    pub fn new(language: LanguageTag, quality: f32) -> Self {
        Self { language, quality }
    }

    pub fn any() -> Self {
        Self::new(LanguageTag::any(), DEFAULT_QUALITY)
    }

    pub fn parse(part: &str) -> Result<Self, Error> {
        let (tag, quality) = split_quality(part)?;
        Ok(Self::new(LanguageTag::parse(&tag)?, quality))
    }

    pub fn parse_list(header: Option<&str>) -> Result<Vec<Self>, Error> {
        if is_accept_all(header, WILDCARD) {
            return Ok(vec![Self::any()]);
        }
        let mut list = header
            .unwrap_or_default()
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(Self::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if list.is_empty() {
            return Ok(vec![Self::any()]);
        }
        sort_by_quality(&mut list, |a| a.quality);
        Ok(list)
    }

    /// `*` matches every tag, `en` matches `en-us`, otherwise tags must be
    /// equal.
    pub fn is_compatible(&self, language: &LanguageTag) -> bool {
        if self.language.is_wildcard() {
            return true;
        }
        if self.language.primary != language.primary {
            return false;
        }
        self.language.sub.is_empty() || self.language.sub == language.sub
    }
}

// ============================================================================
// Accept-Charset / Accept-Encoding
// ============================================================================

/// One entry of an `Accept-Charset` or `Accept-Encoding` header.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptToken {
    pub token: String,
    pub quality: f32,
}

impl AcceptToken {
    pub fn new(token: impl Into<String>, quality: f32) -> Self {
        Self {
            token: token.into().to_lowercase(),
            quality,
        }
    }

    pub fn any() -> Self {
        Self::new(WILDCARD, DEFAULT_QUALITY)
    }

    pub fn parse(part: &str) -> Result<Self, Error> {
        let (token, quality) = split_quality(part)?;
        let token = token.trim();
        if token.is_empty() || token.contains(|c: char| c.is_whitespace() || c == ';') {
            return Err(Error::BadRequest(format!("invalid token '{}'", part.trim())));
        }
        Ok(Self::new(token, quality))
    }

    pub fn parse_list(header: Option<&str>) -> Result<Vec<Self>, Error> {
        if is_accept_all(header, WILDCARD) {
            return Ok(vec![Self::any()]);
        }
        let mut list = header
            .unwrap_or_default()
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(Self::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if list.is_empty() {
            return Ok(vec![Self::any()]);
        }
        sort_by_quality(&mut list, |a| a.quality);
        Ok(list)
    }

    pub fn is_compatible(&self, token: &str) -> bool {
        self.token == WILDCARD || self.token.eq_ignore_ascii_case(token)
    }
}
