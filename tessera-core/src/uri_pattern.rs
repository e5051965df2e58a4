//! URI templates compiled into anchored regular expressions.
//!
//! A template such as `/books/{id}/{rest: .+}` becomes a regex with one
//! group per variable plus a trailing `(/.*)?` group that captures whatever
//! the template did not consume. That tail drives sub-resource dispatch: it
//! is `None` when the path was consumed entirely, `"/"` for a trailing slash,
//! and the remaining path otherwise.
//!
//! # Examples
//!
//! ```
//! use tessera_core::UriPattern;
//!
//! let pattern = UriPattern::new("/books/{id}").unwrap();
//!
//! let m = pattern.match_uri("/books/42/chapters/1").unwrap();
//! assert_eq!(m.values(), ["42"]);
//! assert_eq!(m.tail(), Some("/chapters/1"));
//!
//! let m = pattern.match_uri("/books/42").unwrap();
//! assert!(m.is_terminal());
//! assert!(pattern.match_uri("/authors/1").is_none());
//! ```

use crate::Error;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

const DEFAULT_VARIABLE_REGEX: &str = "[^/]+?";
const TAIL_REGEX: &str = "(/.*)?";

/// A compiled URI template.
///
/// Patterns are ordered by specificity: more literal characters first, then
/// more variables, then by regex text. The empty template sorts last. Two
/// patterns are equal when their compiled regexes are.
#[derive(Clone)]
pub struct UriPattern {
    template: String,
    regex_source: String,
    regex: Regex,
    parameter_names: Vec<String>,
    group_indexes: Vec<usize>,
    tail_index: usize,
    literal_chars: usize,
}

impl UriPattern {
    /// Compile `template`, prefixing `/` when missing.
    pub fn new(template: &str) -> Result<Self, Error> {
        let template = if !template.is_empty() && !template.starts_with('/') {
            format!("/{}", template)
        } else {
            template.to_string()
        };

        let parsed = TemplateParser::parse(&template)?;

        let mut regex_source = parsed.regex;
        if regex_source.ends_with('/') {
            regex_source.pop();
        }
        regex_source.push_str(TAIL_REGEX);

        let regex = Regex::new(&format!("^(?:{})$", regex_source))
            .map_err(|e| Error::InvalidUriTemplate(format!("{}: {}", template, e)))?;

        let mut group_indexes = Vec::with_capacity(parsed.names.len());
        let mut next = 1;
        for groups in &parsed.group_counts {
            group_indexes.push(next);
            next += groups + 1;
        }

        Ok(Self {
            template: parsed.template,
            regex_source,
            regex,
            parameter_names: parsed.names,
            group_indexes,
            tail_index: next,
            literal_chars: parsed.literal_chars,
        })
    }

    /// Normalized template text.
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn regex(&self) -> &str {
        &self.regex_source
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    pub fn literal_chars(&self) -> usize {
        self.literal_chars
    }

    pub fn is_empty(&self) -> bool {
        self.template.is_empty()
    }

    /// Match an encoded request path. An empty path never matches.
    pub fn match_uri(&self, uri: &str) -> Option<UriMatch> {
        if uri.is_empty() {
            return None;
        }
        let caps = self.regex.captures(uri)?;
        let values = self
            .group_indexes
            .iter()
            .map(|&i| caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect();
        let tail = caps.get(self.tail_index).map(|m| m.as_str().to_string());
        Some(UriMatch { values, tail })
    }

    /// Substitute variables with percent-encoded values.
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use tessera_core::UriPattern;
    ///
    /// let pattern = UriPattern::new("/users/{name}/files/{file: .+}").unwrap();
    /// let values = HashMap::from([("name", "ann lee"), ("file", "a.txt")]);
    /// assert_eq!(pattern.expand(&values).unwrap(), "/users/ann%20lee/files/a.txt");
    /// ```
    pub fn expand<K, V>(&self, values: &HashMap<K, V>) -> Result<String, Error>
    where
        K: std::borrow::Borrow<str> + Eq + Hash,
        V: AsRef<str>,
    {
        let mut uri = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();
        while let Some(open) = rest.find('{') {
            uri.push_str(&rest[..open]);
            let close = matching_brace(rest, open).ok_or_else(|| {
                Error::InvalidUriTemplate(format!("unbalanced braces in {}", self.template))
            })?;
            let inner = &rest[open + 1..close];
            let name = inner.split(':').next().unwrap_or_default().trim();
            let value = values.get(name).ok_or_else(|| {
                Error::InvalidUriTemplate(format!(
                    "no value for template variable '{}' in {}",
                    name, self.template
                ))
            })?;
            uri.push_str(&urlencoding::encode(value.as_ref()));
            rest = &rest[close + 1..];
        }
        uri.push_str(rest);
        Ok(uri)
    }
}

impl PartialEq for UriPattern {
    fn eq(&self, other: &Self) -> bool {
        self.regex_source == other.regex_source
    }
}

impl Eq for UriPattern {}

impl Hash for UriPattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.regex_source.hash(state);
    }
}

impl Ord for UriPattern {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }
        other
            .literal_chars
            .cmp(&self.literal_chars)
            .then_with(|| other.parameter_names.len().cmp(&self.parameter_names.len()))
            .then_with(|| self.regex_source.cmp(&other.regex_source))
    }
}

impl PartialOrd for UriPattern {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for UriPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UriPattern")
            .field("template", &self.template)
            .field("regex", &self.regex_source)
            .finish()
    }
}

impl fmt::Display for UriPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

/// Result of a successful [`UriPattern::match_uri`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriMatch {
    values: Vec<String>,
    tail: Option<String>,
}

impl UriMatch {
    /// Raw (still percent-encoded) variable values in declaration order.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Variable values with percent-escapes decoded.
    pub fn decoded_values(&self) -> Vec<String> {
        self.values.iter().map(|v| decode(v)).collect()
    }

    /// Unmatched remainder of the path, starting with `/`.
    pub fn tail(&self) -> Option<&str> {
        self.tail.as_deref()
    }

    /// Whether the template consumed the whole path (ignoring a trailing
    /// slash).
    pub fn is_terminal(&self) -> bool {
        matches!(self.tail.as_deref(), None | Some("/"))
    }

    /// The part of `path` consumed by the template.
    pub fn matched<'p>(&self, path: &'p str) -> &'p str {
        match &self.tail {
            Some(tail) if path.ends_with(tail.as_str()) => &path[..path.len() - tail.len()],
            _ => path,
        }
    }
}

/// Percent-decode, keeping the input unchanged when it is not valid UTF-8.
pub fn decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

/// Percent-encode characters not allowed in a path, keeping `%XX` escapes.
pub fn encode_path_literal(literal: &str) -> String {
    let bytes = literal.as_bytes();
    let mut out = String::with_capacity(literal.len());
    for (i, ch) in literal.char_indices() {
        let allowed = ch.is_ascii_alphanumeric()
            || matches!(
                ch,
                '-' | '.' | '_' | '~' | '!' | '$' | '&' | '\'' | '(' | ')' | '*' | '+' | ','
                    | ';' | '=' | ':' | '@' | '/'
            );
        let escape = ch == '%'
            && bytes.len() > i + 2
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit();
        if allowed || escape {
            out.push(ch);
        } else {
            let mut buf = [0u8; 4];
            out.push_str(&urlencoding::encode(ch.encode_utf8(&mut buf)));
        }
    }
    out
}

/// Index of the brace closing the one at `open`.
///
/// Escaped characters and braces inside a `[...]` class do not count.
fn matching_brace(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_class = false;
    let mut escaped = false;
    for (i, ch) in s[open..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '{' if !in_class => depth += 1,
            '}' if !in_class => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

// ============================================================================
// Template parsing
// ============================================================================

struct TemplateParser {
    regex: String,
    template: String,
    names: Vec<String>,
    group_counts: Vec<usize>,
    literal_chars: usize,
}

impl TemplateParser {
    fn parse(template: &str) -> Result<Self, Error> {
        let mut parser = Self {
            regex: String::new(),
            template: String::new(),
            names: Vec::new(),
            group_counts: Vec::new(),
            literal_chars: 0,
        };

        let mut rest = template;
        while let Some(open) = rest.find('{') {
            parser.add_literal(&rest[..open]);
            let close = matching_brace(rest, open).ok_or_else(|| {
                Error::InvalidUriTemplate(format!("unbalanced braces in {}", template))
            })?;
            parser.add_variable(&rest[open + 1..close], template)?;
            rest = &rest[close + 1..];
        }
        parser.add_literal(rest);

        Ok(parser)
    }

    fn add_literal(&mut self, literal: &str) {
        self.literal_chars += literal.chars().count();
        let encoded = encode_path_literal(literal);
        self.regex.push_str(&regex::escape(&encoded));
        self.template.push_str(&encoded);
    }

    fn add_variable(&mut self, body: &str, template: &str) -> Result<(), Error> {
        let mut name = String::new();
        let mut custom = None;
        for (i, ch) in body.char_indices() {
            if ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                name.push(ch);
            } else if ch == ':' {
                custom = Some(body[i + 1..].trim());
                break;
            } else if !ch.is_whitespace() {
                return Err(Error::InvalidUriTemplate(format!(
                    "wrong character '{}' in variable '{}' of {}",
                    ch, body, template
                )));
            }
        }

        if name.is_empty() {
            return Err(Error::InvalidUriTemplate(format!(
                "empty variable name in {}",
                template
            )));
        }
        if self.names.contains(&name) {
            return Err(Error::InvalidUriTemplate(format!(
                "variable '{}' declared twice in {}",
                name, template
            )));
        }

        let variable_regex = match custom {
            Some(r) if !r.is_empty() => {
                self.template.push_str(&format!("{{{}:{}}}", name, r));
                r
            }
            _ => {
                self.template.push_str(&format!("{{{}}}", name));
                DEFAULT_VARIABLE_REGEX
            }
        };

        let compiled = Regex::new(variable_regex).map_err(|e| {
            Error::InvalidUriTemplate(format!("bad regex for '{}' in {}: {}", name, template, e))
        })?;
        self.group_counts.push(compiled.captures_len() - 1);
        self.regex.push('(');
        self.regex.push_str(variable_regex);
        self.regex.push(')');
        self.names.push(name);
        Ok(())
    }
}
