//! Path pattern compilation.
//!
//! Compiles Express-style path specifications into anchored regular
//! expressions:
//!
//! | syntax            | meaning                                         |
//! |-------------------|-------------------------------------------------|
//! | `/users`          | literal segment                                 |
//! | `/:id`            | named capture of one segment                    |
//! | `/:id?`           | optional capture, separator included            |
//! | `/:id(\d+)`       | named capture with a custom expression          |
//! | `/:path*`         | named capture plus the remaining segments       |
//! | `.:format`        | capture after a literal dot                     |
//! | `*`               | positional capture of anything                  |
//! | `(a|b)`           | positional raw group                            |
//!
//! Matching is case-insensitive unless requested otherwise, and one trailing
//! slash is optional unless `strict` is set. Prefix patterns (`end = false`)
//! only match at a segment boundary.

use pathway_core::{ConfigError, Params, PathMatchError};
use percent_encoding::percent_decode_str;
use regex::Regex;
use std::fmt;

/// A path specification as accepted by registration methods.
#[derive(Debug, Clone)]
pub enum PathSpec {
    /// An Express-style path string.
    Str(String),
    /// A raw regular expression, used as is.
    Regex(Regex),
    /// Alternatives tried in order.
    Many(Vec<PathSpec>),
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSpec::Str(s) => f.write_str(s),
            PathSpec::Regex(re) => f.write_str(re.as_str()),
            PathSpec::Many(specs) => {
                for (i, spec) in specs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{spec}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for PathSpec {
    fn from(s: &str) -> Self {
        PathSpec::Str(s.to_owned())
    }
}

impl From<String> for PathSpec {
    fn from(s: String) -> Self {
        PathSpec::Str(s)
    }
}

impl From<&String> for PathSpec {
    fn from(s: &String) -> Self {
        PathSpec::Str(s.clone())
    }
}

impl From<Regex> for PathSpec {
    fn from(re: Regex) -> Self {
        PathSpec::Regex(re)
    }
}

impl<T: Into<PathSpec>> From<Vec<T>> for PathSpec {
    fn from(specs: Vec<T>) -> Self {
        PathSpec::Many(specs.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<PathSpec>, const N: usize> From<[T; N]> for PathSpec {
    fn from(specs: [T; N]) -> Self {
        PathSpec::Many(specs.into_iter().map(Into::into).collect())
    }
}

/// Compilation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternOptions {
    /// Match letter case exactly.
    pub case_sensitive: bool,
    /// Treat a trailing slash as significant.
    pub strict: bool,
    /// Require the whole path to match (route) instead of a prefix (mount).
    pub end: bool,
}

impl Default for PatternOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            strict: false,
            end: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Key {
    Named(String),
    Positional(usize),
    /// Marks where a prefix match ends.
    Boundary,
}

/// Result of a successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    /// The matched prefix (the whole path for routes).
    pub path: String,
    /// Decoded captures.
    pub params: Params,
}

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    regex: Regex,
    keys: Vec<Key>,
    fast_slash: bool,
    fast_star: bool,
}

impl PathPattern {
    /// Compile a specification. Compilation is pure and deterministic.
    pub fn compile(spec: &PathSpec, options: PatternOptions) -> Result<Self, ConfigError> {
        let mut compiler = Compiler {
            options,
            keys: Vec::new(),
            positional: 0,
        };
        let source = compiler.source(spec);
        let source = match spec {
            PathSpec::Regex(_) => source,
            _ if options.case_sensitive => source,
            _ => format!("(?i){source}"),
        };
        let regex = Regex::new(&source).map_err(|err| ConfigError::InvalidPattern {
            pattern: spec.to_string(),
            reason: err.to_string(),
        })?;

        let mut keys = compiler.keys;
        let groups = regex.captures_len().saturating_sub(1);
        keys.truncate(groups);
        while keys.len() < groups {
            keys.push(Key::Positional(compiler.positional));
            compiler.positional += 1;
        }

        let literal = match spec {
            PathSpec::Str(s) => Some(s.as_str()),
            _ => None,
        };
        Ok(Self {
            regex,
            keys,
            fast_slash: literal == Some("/") && !options.end,
            fast_star: literal == Some("*"),
        })
    }

    /// Names of the named captures, in pattern order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().filter_map(|key| match key {
            Key::Named(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// The compiled expression.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Test `path`, returning the matched prefix and decoded captures.
    ///
    /// Fails when a captured value holds malformed percent-encoding.
    pub fn matches(&self, path: &str) -> Result<Option<PathMatch>, PathMatchError> {
        if self.fast_slash {
            return Ok(Some(PathMatch {
                path: String::new(),
                params: Params::new(),
            }));
        }
        if self.fast_star {
            let mut params = Params::new();
            params.insert_index(0, decode_param(path)?);
            return Ok(Some(PathMatch {
                path: path.to_owned(),
                params,
            }));
        }

        let Some(caps) = self.regex.captures(path) else {
            return Ok(None);
        };
        let Some(whole) = caps.get(0) else {
            return Ok(None);
        };
        let mut end = whole.end();
        let mut params = Params::new();
        for (key, group) in self.keys.iter().zip(caps.iter().skip(1)) {
            let Some(group) = group else { continue };
            match key {
                Key::Boundary => end = group.start(),
                Key::Named(name) => params.insert(name.clone(), decode_param(group.as_str())?),
                Key::Positional(index) => {
                    params.insert_index(*index, decode_param(group.as_str())?)
                }
            }
        }
        Ok(Some(PathMatch {
            path: path[whole.start()..end].to_owned(),
            params,
        }))
    }
}

/// Percent-decode a captured value.
///
/// Unlike lenient decoders, a `%` not followed by two hex digits is an error,
/// as is a decoded byte sequence that is not UTF-8. `+` is left alone.
pub fn decode_param(value: &str) -> Result<String, PathMatchError> {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return Err(PathMatchError::new(value));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    percent_decode_str(value)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| PathMatchError::new(value))
}

struct Compiler {
    options: PatternOptions,
    keys: Vec<Key>,
    positional: usize,
}

struct Param {
    len: usize,
    name: String,
    slash: bool,
    format: bool,
    capture: Option<String>,
    star: bool,
    optional: bool,
}

impl Compiler {
    fn push_positional(&mut self) {
        self.keys.push(Key::Positional(self.positional));
        self.positional += 1;
    }

    fn source(&mut self, spec: &PathSpec) -> String {
        match spec {
            PathSpec::Str(path) => self.path_source(path),
            PathSpec::Regex(re) => {
                for name in re.capture_names().skip(1) {
                    match name {
                        Some(name) => self.keys.push(Key::Named(name.to_owned())),
                        None => self.push_positional(),
                    }
                }
                re.as_str().to_owned()
            }
            PathSpec::Many(specs) => {
                let parts: Vec<String> = specs.iter().map(|spec| self.source(spec)).collect();
                format!("(?:{})", parts.join("|"))
            }
        }
    }

    fn path_source(&mut self, path: &str) -> String {
        let chars: Vec<char> = path.chars().collect();
        let mut out = String::from("^");
        let mut i = 0;
        while i < chars.len() {
            if let Some(param) = parse_param(&chars, i) {
                i += param.len;
                self.render_param(param, &mut out);
                continue;
            }
            match chars[i] {
                '/' => out.push('/'),
                '*' => {
                    out.push_str("(.*)");
                    self.push_positional();
                }
                '(' if chars.get(i + 1) == Some(&'?') => out.push('('),
                '(' if i > 0 && chars[i - 1] == '/' => out.push_str("(?:"),
                '(' => {
                    out.push('(');
                    self.push_positional();
                }
                c @ (')' | '?' | '+') => out.push(c),
                '\\' => {
                    if let Some(next) = chars.get(i + 1) {
                        out.push_str(&regex::escape(&next.to_string()));
                        i += 1;
                    }
                }
                c => out.push_str(&regex::escape(&c.to_string())),
            }
            i += 1;
        }

        if !self.options.strict {
            out.push_str(if path.ends_with('/') { "?" } else { "/?" });
        }
        if self.options.end {
            out.push('$');
        } else if !(self.options.strict && path.ends_with('/')) {
            out.push_str("(/|$)");
            self.keys.push(Key::Boundary);
        }
        out
    }

    fn render_param(&mut self, param: Param, out: &mut String) {
        let slash = if param.slash { "/" } else { "" };
        let format = if param.format { r"\." } else { "" };

        self.keys.push(Key::Named(param.name));
        let capture = match param.capture {
            Some(capture) => {
                for _ in 0..inner_groups(&capture) {
                    self.push_positional();
                }
                capture
            }
            None => format!("([^/{format}]+?)"),
        };

        if !param.optional {
            out.push_str(slash);
        }
        out.push_str("(?:");
        out.push_str(format);
        if param.optional {
            out.push_str(slash);
        }
        out.push_str(&capture);
        if param.star {
            out.push_str(&format!("((?:[/{format}].+?)?)"));
            self.push_positional();
        }
        out.push(')');
        if param.optional {
            out.push('?');
        }
    }
}

/// Parse `[/][.]:name[(capture)][*][?]` starting at `start`.
fn parse_param(chars: &[char], start: usize) -> Option<Param> {
    let mut j = start;
    let slash = chars.get(j) == Some(&'/');
    if slash {
        j += 1;
    }
    let format = chars.get(j) == Some(&'.');
    if format {
        j += 1;
    }
    if chars.get(j) != Some(&':') {
        return None;
    }
    j += 1;

    let name_start = j;
    while chars
        .get(j)
        .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_')
    {
        j += 1;
    }
    if j == name_start {
        return None;
    }
    let name: String = chars[name_start..j].iter().collect();

    let mut capture = None;
    if chars.get(j) == Some(&'(') {
        if let Some(close) = chars[j..].iter().position(|c| *c == ')') {
            capture = Some(chars[j..=j + close].iter().collect());
            j += close + 1;
        }
    }
    let star = chars.get(j) == Some(&'*');
    if star {
        j += 1;
    }
    let optional = chars.get(j) == Some(&'?');
    if optional {
        j += 1;
    }

    Some(Param {
        len: j - start,
        name,
        slash,
        format,
        capture,
        star,
        optional,
    })
}

/// Capturing groups nested inside a custom capture expression.
fn inner_groups(capture: &str) -> usize {
    let chars: Vec<char> = capture.chars().collect();
    (1..chars.len().saturating_sub(1))
        .filter(|&i| chars[i] == '(' && chars[i - 1] != '\\' && chars.get(i + 1) != Some(&'?'))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(spec: impl Into<PathSpec>) -> PathPattern {
        PathPattern::compile(&spec.into(), PatternOptions::default()).unwrap()
    }

    fn prefix(spec: &str) -> PathPattern {
        PathPattern::compile(
            &spec.into(),
            PatternOptions {
                end: false,
                ..PatternOptions::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn named_segments() {
        let pattern = route("/user/:id");
        let m = pattern.matches("/user/42").unwrap().unwrap();
        assert_eq!(m.params.get("id"), Some("42"));
        assert_eq!(m.path, "/user/42");
        assert!(pattern.matches("/user/42/extra").unwrap().is_none());
        assert!(pattern.matches("/USER/42/").unwrap().is_some());
        assert_eq!(pattern.param_names().collect::<Vec<_>>(), ["id"]);
    }

    #[test]
    fn case_sensitivity_is_opt_in() {
        let pattern = PathPattern::compile(
            &"/Users".into(),
            PatternOptions {
                case_sensitive: true,
                ..PatternOptions::default()
            },
        )
        .unwrap();
        assert!(pattern.matches("/Users").unwrap().is_some());
        assert!(pattern.matches("/users").unwrap().is_none());
    }

    #[test]
    fn optional_segments() {
        let pattern = route("/user/:id?");
        assert!(pattern.matches("/user").unwrap().is_some());
        let m = pattern.matches("/user/7").unwrap().unwrap();
        assert_eq!(m.params.get("id"), Some("7"));
    }

    #[test]
    fn strict_trailing_slash() {
        let strict = PathPattern::compile(
            &"/users".into(),
            PatternOptions {
                strict: true,
                ..PatternOptions::default()
            },
        )
        .unwrap();
        assert!(strict.matches("/users").unwrap().is_some());
        assert!(strict.matches("/users/").unwrap().is_none());
        assert!(route("/users").matches("/users/").unwrap().is_some());
    }

    #[test]
    fn formats_and_literal_dots() {
        let pattern = route("/file/:name.:ext");
        let m = pattern.matches("/file/report.pdf").unwrap().unwrap();
        assert_eq!(m.params.get("name"), Some("report"));
        assert_eq!(m.params.get("ext"), Some("pdf"));

        let literal = route("/a.b");
        assert!(literal.matches("/a.b").unwrap().is_some());
        assert!(literal.matches("/axb").unwrap().is_none());
    }

    #[test]
    fn custom_captures() {
        let pattern = route(r"/item/:id(\d+)");
        assert!(pattern.matches("/item/12").unwrap().is_some());
        assert!(pattern.matches("/item/abc").unwrap().is_none());
    }

    #[test]
    fn wildcards_are_positional() {
        let m = route("/files/*").matches("/files/a/b.txt").unwrap().unwrap();
        assert_eq!(m.params.index(0), Some("a/b.txt"));

        let star = route("*").matches("/anything").unwrap().unwrap();
        assert_eq!(star.params.index(0), Some("/anything"));
    }

    #[test]
    fn prefixes_stop_at_segment_boundaries() {
        let pattern = prefix("/api");
        assert_eq!(pattern.matches("/api/users").unwrap().unwrap().path, "/api");
        assert_eq!(pattern.matches("/api").unwrap().unwrap().path, "/api");
        assert_eq!(pattern.matches("/api/").unwrap().unwrap().path, "/api/");
        assert!(pattern.matches("/apiary").unwrap().is_none());

        let root = prefix("/");
        assert_eq!(root.matches("/anything").unwrap().unwrap().path, "");
    }

    #[test]
    fn prefix_params() {
        let m = prefix("/users/:uid").matches("/users/9/posts").unwrap().unwrap();
        assert_eq!(m.path, "/users/9");
        assert_eq!(m.params.get("uid"), Some("9"));
    }

    #[test]
    fn decoding() {
        let pattern = route("/user/:name");
        let m = pattern.matches("/user/j%20s").unwrap().unwrap();
        assert_eq!(m.params.get("name"), Some("j s"));

        let err = pattern.matches("/user/%zz").unwrap_err();
        assert_eq!(err.value, "%zz");
        assert!(decode_param("%E0%A4%A").is_err());
        assert_eq!(decode_param("a+b").unwrap(), "a+b");
    }

    #[test]
    fn alternatives_and_raw_expressions() {
        let many = route(["/a", "/b/:id"]);
        assert!(many.matches("/a").unwrap().is_some());
        let m = many.matches("/b/3").unwrap().unwrap();
        assert_eq!(m.params.get("id"), Some("3"));

        let raw = route(Regex::new(r"^/v(?P<version>\d+)/(\w+)$").unwrap());
        let m = raw.matches("/v2/status").unwrap().unwrap();
        assert_eq!(m.params.get("version"), Some("2"));
        assert_eq!(m.params.index(0), Some("status"));
    }

    #[test]
    fn invalid_patterns_are_reported() {
        let err = PathPattern::compile(&"/:id([)".into(), PatternOptions::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }
}
