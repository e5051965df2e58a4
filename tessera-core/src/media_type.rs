//! Media types and their compatibility rules.
//!
//! Besides plain wildcards (`*/*`, `text/*`) the rules understand structured
//! syntax suffixes: `application/*+xml` covers `application/atom+xml`, and
//! `application/atom+*` covers `application/atom+json`.
//!
//! # Examples
//!
//! ```
//! use tessera_core::MediaType;
//!
//! let atom: MediaType = "application/atom+xml".parse().unwrap();
//! let xml_family = MediaType::new("application", "*+xml");
//!
//! assert!(xml_family.matches(&atom));
//! assert!(atom.is_compatible(&MediaType::new("application", "xml")));
//!
//! let range: Vec<String> = atom.range().map(|m| m.mime_type()).collect();
//! assert_eq!(
//!     range,
//!     ["application/atom+xml", "application/*+xml", "application/*", "*/*"]
//! );
//! ```

use crate::Error;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const WILDCARD: &str = "*";

/// A media type (MIME type) with optional parameters.
///
/// Type, subtype and parameter names are stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    pub type_: String,
    pub subtype: String,
    pub params: HashMap<String, String>,
}

impl MediaType {
    pub fn new(type_: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            type_: type_.into().to_lowercase(),
            subtype: subtype.into().to_lowercase(),
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into().to_lowercase(), value.into());
        self
    }

    /// `*/*`
    pub fn any() -> Self {
        Self::new(WILDCARD, WILDCARD)
    }

    pub fn plain_text() -> Self {
        Self::new("text", "plain")
    }

    pub fn html() -> Self {
        Self::new("text", "html")
    }

    pub fn json() -> Self {
        Self::new("application", "json")
    }

    pub fn xml() -> Self {
        Self::new("application", "xml")
    }

    pub fn octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    /// Parse a media type such as `text/html; charset=utf-8`.
    ///
    /// A bare `*` is accepted as `*/*`. A quality parameter, if present, is
    /// kept as an ordinary parameter; use
    /// [`AcceptMediaType`](crate::AcceptMediaType) for `Accept` entries.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let mut parts = s.split(';');
        let essence = parts.next().unwrap_or_default().trim();
        if essence.is_empty() {
            return Err(Error::InvalidMediaType(s.to_string()));
        }

        let (type_, subtype) = if essence == WILDCARD {
            (WILDCARD, WILDCARD)
        } else {
            let (t, st) = essence
                .split_once('/')
                .ok_or_else(|| Error::InvalidMediaType(s.to_string()))?;
            (t.trim(), st.trim())
        };
        if !is_token(type_) || !is_token(subtype) {
            return Err(Error::InvalidMediaType(s.to_string()));
        }

        let mut media_type = Self::new(type_, subtype);
        for param in parts {
            let param = param.trim();
            if param.is_empty() {
                continue;
            }
            let (key, value) = param
                .split_once('=')
                .ok_or_else(|| Error::InvalidMediaType(s.to_string()))?;
            let key = key.trim();
            if !is_token(key) {
                return Err(Error::InvalidMediaType(s.to_string()));
            }
            media_type
                .params
                .insert(key.to_lowercase(), value.trim().trim_matches('"').to_string());
        }

        Ok(media_type)
    }

    pub fn is_wildcard_type(&self) -> bool {
        self.type_ == WILDCARD
    }

    pub fn is_wildcard_subtype(&self) -> bool {
        self.subtype == WILDCARD
    }

    /// `type/subtype` without parameters
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.type_, self.subtype)
    }

    pub fn charset(&self) -> Option<&str> {
        self.params.get("charset").map(String::as_str)
    }

    /// Full header value; parameters are emitted in name order.
    pub fn to_header_value(&self) -> String {
        let mut params: Vec<_> = self.params.iter().collect();
        params.sort();

        let mut result = self.mime_type();
        for (key, value) in params {
            result.push_str(&format!(";{}={}", key, value));
        }
        result
    }

    /// Same type and subtype, ignoring parameters.
    pub fn same_essence(&self, other: &MediaType) -> bool {
        self.type_ == other.type_ && self.subtype == other.subtype
    }

    /// Symmetric compatibility check.
    ///
    /// Either side may carry wildcards. A structured subtype is compatible
    /// with a plain one when the plain subtype equals its prefix or suffix:
    /// `xml` and `atom+xml` are compatible, so are `atom+*` and `atom+json`.
    pub fn is_compatible(&self, other: &MediaType) -> bool {
        if self.is_wildcard_type() || other.is_wildcard_type() {
            return true;
        }
        if self.type_ != other.type_ {
            return false;
        }
        if self.is_wildcard_subtype() || other.is_wildcard_subtype() || self.subtype == other.subtype {
            return true;
        }

        match (split_extension(&self.subtype), split_extension(&other.subtype)) {
            (None, Some((prefix, suffix))) => self.subtype == prefix || self.subtype == suffix,
            (Some((prefix, suffix)), None) => other.subtype == prefix || other.subtype == suffix,
            (Some((p1, s1)), Some((p2, s2))) => {
                (p1 == p2 && (s1 == WILDCARD || s2 == WILDCARD))
                    || (s1 == s2 && (p1 == WILDCARD || p2 == WILDCARD))
            }
            (None, None) => false,
        }
    }

    /// Whether `self`, used as a pattern, covers `candidate`.
    ///
    /// Unlike [`is_compatible`](Self::is_compatible) only wildcards on the
    /// pattern side count: `text/*` matches `text/plain`, not the reverse.
    pub fn matches(&self, candidate: &MediaType) -> bool {
        if self.is_wildcard_type() {
            return true;
        }
        if self.type_ != candidate.type_ {
            return false;
        }
        if self.is_wildcard_subtype() || self.subtype == candidate.subtype {
            return true;
        }

        let Some((prefix, suffix)) = split_extension(&self.subtype) else {
            return false;
        };
        match split_extension(&candidate.subtype) {
            None => candidate.subtype == prefix || candidate.subtype == suffix,
            Some((candidate_prefix, candidate_suffix)) => {
                (prefix == candidate_prefix && suffix == WILDCARD)
                    || (suffix == candidate_suffix && prefix == WILDCARD)
            }
        }
    }

    /// Specificity order: concrete types first, then structured subtypes,
    /// `*+x`, `x+*`, subtype wildcards and finally type wildcards.
    ///
    /// Returns `Less` when `self` is more specific than `other`.
    pub fn compare_specificity(&self, other: &MediaType) -> Ordering {
        fn rank(first: bool, second: bool) -> Option<Ordering> {
            match (first, second) {
                (true, false) => Some(Ordering::Greater),
                (false, true) => Some(Ordering::Less),
                _ => None,
            }
        }

        let s1 = self.subtype.as_str();
        let s2 = other.subtype.as_str();
        rank(self.is_wildcard_type(), other.is_wildcard_type())
            .or_else(|| rank(self.is_wildcard_subtype(), other.is_wildcard_subtype()))
            .or_else(|| rank(split_extension(s1).is_some(), split_extension(s2).is_some()))
            .or_else(|| rank(is_prefix_wildcard(s1), is_prefix_wildcard(s2)))
            .or_else(|| rank(is_suffix_wildcard(s1), is_suffix_wildcard(s2)))
            .unwrap_or(Ordering::Equal)
    }

    /// Lookup chain from this type towards `*/*`.
    ///
    /// `application/xml` yields `application/xml`, `application/*+xml`,
    /// `application/*`, `*/*`. Parameters are dropped.
    pub fn range(&self) -> MediaTypeRange {
        MediaTypeRange {
            next: Some(Self::new(self.type_.as_str(), self.subtype.as_str())),
        }
    }
}

impl Default for MediaType {
    fn default() -> Self {
        Self::any()
    }
}

impl FromStr for MediaType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_header_value())
    }
}

/// Iterator returned by [`MediaType::range`].
#[derive(Debug, Clone)]
pub struct MediaTypeRange {
    next: Option<MediaType>,
}

impl Iterator for MediaTypeRange {
    type Item = MediaType;

    fn next(&mut self) -> Option<MediaType> {
        let current = self.next.take()?;
        self.next = if !current.is_wildcard_type() && !current.is_wildcard_subtype() {
            match split_extension(&current.subtype) {
                Some((WILDCARD, _)) => Some(MediaType::new(current.type_.as_str(), WILDCARD)),
                Some((_, suffix)) => Some(MediaType::new(
                    current.type_.as_str(),
                    format!("*+{}", suffix),
                )),
                None => Some(MediaType::new(
                    current.type_.as_str(),
                    format!("*+{}", current.subtype),
                )),
            }
        } else if !current.is_wildcard_type() {
            Some(MediaType::any())
        } else {
            None
        };
        Some(current)
    }
}

/// Sort a declared consumes/produces list by specificity; an empty list
/// becomes `[*/*]`.
pub fn sorted_media_types(mut types: Vec<MediaType>) -> Vec<MediaType> {
    if types.is_empty() {
        return vec![MediaType::any()];
    }
    types.sort_by(|a, b| a.compare_specificity(b));
    types
}

/// Parse and sort a list of media type strings.
pub fn parse_media_types(values: &[&str]) -> Result<Vec<MediaType>, Error> {
    let types = values
        .iter()
        .map(|v| MediaType::parse(v))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(sorted_media_types(types))
}

/// Split `prefix+suffix`, both parts non-empty and the prefix without `+`.
fn split_extension(subtype: &str) -> Option<(&str, &str)> {
    let (prefix, suffix) = subtype.split_once('+')?;
    if prefix.is_empty() || suffix.is_empty() {
        return None;
    }
    Some((prefix, suffix))
}

fn is_prefix_wildcard(subtype: &str) -> bool {
    subtype.len() > 2 && subtype.starts_with("*+")
}

fn is_suffix_wildcard(subtype: &str) -> bool {
    matches!(split_extension(subtype), Some((_, WILDCARD)))
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| {
            c.is_ascii_graphic() && !matches!(c, '(' | ')' | '<' | '>' | '@' | ',' | ';' | ':' | '\\' | '"' | '/' | '[' | ']' | '?' | '=' | '{' | '}')
        })
}
