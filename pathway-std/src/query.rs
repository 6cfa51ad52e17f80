//! Query string parsing.
//!
//! Selected through the application's `query parser` setting:
//!
//! - `"extended"` - bracket nesting (`user[name]=tj`, `tags[]=a`)
//! - `"simple"` or `true` - flat keys, repeated keys collect into arrays
//! - `false` - no parsing, the query is always `{}`
//! - a custom function

use pathway_core::{ConfigError, Handler, IntoHandlers, Middleware, Next, Request, Response};
use serde_json::{Map, Value};
use std::{fmt, sync::Arc};
use url::form_urlencoded;

/// A user-supplied query parser.
pub type QueryFn = Arc<dyn Fn(&str) -> Value + Send + Sync + 'static>;

/// How raw query strings become structured values.
#[derive(Clone)]
pub enum QueryParser {
    /// Flat keys.
    Simple,
    /// Bracket-nested keys.
    Extended,
    /// Always an empty object.
    Disabled,
    /// A custom function receiving the raw query string.
    Custom(QueryFn),
}

impl fmt::Debug for QueryParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryParser::Simple => f.write_str("Simple"),
            QueryParser::Extended => f.write_str("Extended"),
            QueryParser::Disabled => f.write_str("Disabled"),
            QueryParser::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl QueryParser {
    /// Interpret a `query parser` setting value.
    pub fn from_setting(value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::Null => Ok(QueryParser::Extended),
            Value::Bool(true) => Ok(QueryParser::Simple),
            Value::Bool(false) => Ok(QueryParser::Disabled),
            Value::String(s) if s == "simple" => Ok(QueryParser::Simple),
            Value::String(s) if s == "extended" => Ok(QueryParser::Extended),
            other => Err(ConfigError::UnknownSettingValue {
                setting: "query parser".to_owned(),
                value: match other {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
            }),
        }
    }

    /// Parse a raw query string (without `?`).
    pub fn parse(&self, raw: &str) -> Value {
        match self {
            QueryParser::Simple => parse_simple(raw),
            QueryParser::Extended => parse_extended(raw),
            QueryParser::Disabled => Value::Object(Map::new()),
            QueryParser::Custom(f) => f(raw),
        }
    }
}

fn push_leaf(slot: &mut Value, value: String) {
    match slot {
        Value::Null => *slot = Value::String(value),
        Value::Array(items) => items.push(Value::String(value)),
        other => {
            let previous = other.take();
            *other = Value::Array(vec![previous, Value::String(value)]);
        }
    }
}

/// Parse flat `key=value` pairs.
pub fn parse_simple(raw: &str) -> Value {
    let mut root = Map::new();
    for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
        push_leaf(
            root.entry(key.into_owned()).or_insert(Value::Null),
            value.into_owned(),
        );
    }
    Value::Object(root)
}

/// Parse bracket-nested pairs.
pub fn parse_extended(raw: &str) -> Value {
    let mut root = Value::Object(Map::new());
    for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
        assign(&mut root, &split_key(&key), value.into_owned());
    }
    root
}

/// Bracket segments parsed per key. Anything deeper stays a literal segment.
const MAX_DEPTH: usize = 5;

fn split_key(key: &str) -> Vec<String> {
    let open = match key.find('[') {
        Some(open) if open > 0 => open,
        _ => return vec![key.to_owned()],
    };
    let mut segments = vec![key[..open].to_owned()];
    let mut rest = &key[open..];
    while let Some(inner) = rest.strip_prefix('[') {
        if segments.len() > MAX_DEPTH {
            break;
        }
        let Some(close) = inner.find(']') else { break };
        segments.push(inner[..close].to_owned());
        rest = &inner[close + 1..];
    }
    if !rest.is_empty() {
        segments.push(rest.to_owned());
    }
    segments
}

fn assign(slot: &mut Value, path: &[String], value: String) {
    let Some((head, rest)) = path.split_first() else {
        push_leaf(slot, value);
        return;
    };

    if head.is_empty() {
        match &mut *slot {
            Value::Array(_) => {}
            Value::Null => *slot = Value::Array(Vec::new()),
            other => {
                let previous = other.take();
                *other = Value::Array(vec![previous]);
            }
        }
        if let Value::Array(items) = slot {
            let mut child = Value::Null;
            assign(&mut child, rest, value);
            items.push(child);
        }
        return;
    }

    if slot.is_null() {
        *slot = Value::Object(Map::new());
    }
    // Conflicting shapes (`a=1&a[b]=2`) keep the first assignment.
    if let Value::Object(map) = slot {
        assign(map.entry(head.clone()).or_insert(Value::Null), rest, value);
    }
}

/// Middleware populating [`Request::query`] when it has not been parsed yet.
#[derive(Debug, Clone)]
pub struct QueryMiddleware {
    parser: QueryParser,
}

impl QueryMiddleware {
    /// Create the middleware for a parser.
    pub fn new(parser: QueryParser) -> Self {
        Self { parser }
    }
}

impl Middleware for QueryMiddleware {
    async fn handle(&self, req: Request, _res: Response) -> Next {
        if req.query().is_null() {
            let raw = req.query_string().unwrap_or_default();
            req.set_query(self.parser.parse(&raw));
        }
        Next::Continue
    }
}

impl IntoHandlers for QueryMiddleware {
    fn into_handlers(self) -> Vec<Handler> {
        vec![Handler::new(self)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extended_nests_brackets() {
        assert_eq!(parse_extended("user[name]=tj"), json!({"user": {"name": "tj"}}));
        assert_eq!(
            parse_extended("tags[]=a&tags[]=b&x=1&x=2"),
            json!({"tags": ["a", "b"], "x": ["1", "2"]})
        );
        assert_eq!(
            parse_extended("a[b][c]=d&a[b][e]=f"),
            json!({"a": {"b": {"c": "d", "e": "f"}}})
        );
        assert_eq!(parse_extended(""), json!({}));
        assert_eq!(parse_extended("a=1&a[]=2"), json!({"a": ["1", "2"]}));
    }

    #[test]
    fn extended_depth_is_capped() {
        assert_eq!(
            split_key("a[b][c][d][e][f][g][h]"),
            ["a", "b", "c", "d", "e", "f", "[g][h]"]
        );
        assert_eq!(
            parse_extended("a[1][2][3][4][5][6]=x"),
            json!({"a": {"1": {"2": {"3": {"4": {"5": {"[6]": "x"}}}}}}})
        );

        let deep = format!("a{}=1", "[b]".repeat(20_000));
        let parsed = parse_extended(&deep);
        let mut depth = 0;
        let mut node = &parsed["a"];
        while let Some(next) = node.as_object().and_then(|map| map.values().next()) {
            depth += 1;
            node = next;
        }
        assert_eq!(depth, MAX_DEPTH + 1);
        assert_eq!(node, &json!("1"));
    }

    #[test]
    fn simple_keeps_keys_flat() {
        assert_eq!(parse_simple("user[name]=tj"), json!({"user[name]": "tj"}));
        assert_eq!(parse_simple("q=a+b&q=c"), json!({"q": ["a b", "c"]}));
    }

    #[test]
    fn settings() {
        assert!(matches!(
            QueryParser::from_setting(&json!(true)),
            Ok(QueryParser::Simple)
        ));
        assert!(matches!(
            QueryParser::from_setting(&json!(false)),
            Ok(QueryParser::Disabled)
        ));
        let err = QueryParser::from_setting(&json!("bogus")).unwrap_err();
        assert_eq!(err.to_string(), "unknown value for query parser setting: bogus");
    }

    #[test]
    fn custom_functions_see_the_raw_string() {
        let parser = QueryParser::Custom(Arc::new(|raw: &str| json!({ "length": raw.len() })));
        assert_eq!(parser.parse("user[name]=tj"), json!({"length": 13}));
    }

    #[tokio::test]
    async fn middleware_parses_once() {
        let req = Request::new("GET", "/?a=1").unwrap();
        let res = Response::for_request(&req);
        let middleware = QueryMiddleware::new(QueryParser::Extended);
        middleware.handle(req.clone(), res.clone()).await;
        assert_eq!(req.query(), json!({"a": "1"}));

        req.set_query(json!({"preset": true}));
        middleware.handle(req.clone(), res).await;
        assert_eq!(req.query(), json!({"preset": true}));
    }
}
