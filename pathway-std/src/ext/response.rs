use crate::mime;
use cookie::Cookie;
use http::StatusCode;
use pathway_core::{HandlerError, Response, ResponseError};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::Serialize;
use serde_json::{Map, Value, ser::PrettyFormatter};

/// Characters escaped in `Location` values. Existing `%XX` escapes survive.
const LOCATION: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// A response payload for [`ResponseExt::send`].
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// No payload.
    Empty,
    /// Text, sent as `text/html` unless a type was set.
    Text(String),
    /// Raw bytes, sent as `application/octet-stream` unless a type was set.
    Bytes(Vec<u8>),
    /// A JSON document, see [`ResponseExt::json`].
    Json(Value),
}

impl From<&str> for Body {
    fn from(value: &str) -> Self {
        Body::Text(value.to_owned())
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Body::Text(value)
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Body::Bytes(value)
    }
}

impl From<&[u8]> for Body {
    fn from(value: &[u8]) -> Self {
        Body::Bytes(value.to_vec())
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Json(value)
    }
}

impl From<()> for Body {
    fn from(_: ()) -> Self {
        Body::Empty
    }
}

/// Response helpers.
///
/// Everything that touches headers fails with
/// [`ResponseError::AlreadyFinalized`] once the response has finished.
pub trait ResponseExt {
    /// Set a header. A `Content-Type` without a charset gets the default
    /// charset of its MIME type.
    fn set(&self, field: &str, value: impl Into<String>) -> Result<(), ResponseError>;

    /// Set a header to several values.
    fn set_values(&self, field: &str, values: Vec<String>) -> Result<(), ResponseError>;

    /// First value of a response header.
    fn get(&self, field: &str) -> Option<String>;

    /// Set `Content-Type` from a MIME type or an extension shorthand.
    fn content_type(&self, token: &str) -> Result<(), ResponseError>;

    /// Send a body and finish the response.
    fn send(&self, body: impl Into<Body>) -> Result<(), ResponseError>;

    /// Send `value` as JSON, indented by the `json spaces` setting.
    fn json(&self, value: &Value) -> Result<(), ResponseError>;

    /// Set the status and send its reason phrase as the body.
    fn send_status(&self, status: u16) -> Result<(), ResponseError>;

    /// Append `Link` header entries from `(rel, url)` pairs.
    fn links(&self, links: &[(&str, &str)]) -> Result<(), ResponseError>;

    /// Set `Location`. `"back"` resolves to the referrer or `/`.
    fn location(&self, url: &str) -> Result<(), ResponseError>;

    /// Redirect with `302 Found`.
    fn redirect(&self, url: &str) -> Result<(), ResponseError> {
        self.redirect_with(302, url)
    }

    /// Redirect with a given status.
    fn redirect_with(&self, status: u16, url: &str) -> Result<(), ResponseError>;

    /// Add a field to the `Vary` header.
    fn vary(&self, field: &str) -> Result<(), ResponseError>;

    /// Append an unsigned `Set-Cookie`. The path defaults to `/`.
    fn cookie(&self, cookie: impl Into<Cookie<'static>>) -> Result<(), ResponseError>;

    /// Expire a cookie set with the default path.
    fn clear_cookie(&self, name: &str) -> Result<(), ResponseError>;

    /// Render a view through the current application and send it.
    fn render(&self, view: &str, locals: Map<String, Value>) -> Result<(), HandlerError>;

    /// Render a view to a string with app, response and call locals merged.
    fn render_to_string(
        &self,
        view: &str,
        locals: Map<String, Value>,
    ) -> Result<String, HandlerError>;
}

fn reason(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .map_or_else(|| status.to_string(), str::to_owned)
}

fn json_spaces(res: &Response) -> usize {
    res.app()
        .and_then(|app| app.setting("json spaces"))
        .and_then(|value| match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
        .map_or(0, |n| n.min(10) as usize)
}

fn to_json(value: &Value, spaces: usize) -> Result<String, ResponseError> {
    if spaces == 0 {
        return Ok(serde_json::to_string(value)?);
    }
    let indent = vec![b' '; spaces];
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(&indent));
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

impl ResponseExt for Response {
    fn set(&self, field: &str, value: impl Into<String>) -> Result<(), ResponseError> {
        let mut value = value.into();
        if field.eq_ignore_ascii_case("content-type")
            && !value.to_ascii_lowercase().contains("charset=")
        {
            if let Some(charset) = mime::charset(&value) {
                value = format!("{value}; charset={}", charset.to_ascii_lowercase());
            }
        }
        self.set_header(field, value)
    }

    fn set_values(&self, field: &str, values: Vec<String>) -> Result<(), ResponseError> {
        self.set_header_values(field, values)
    }

    fn get(&self, field: &str) -> Option<String> {
        self.header(field)
    }

    fn content_type(&self, token: &str) -> Result<(), ResponseError> {
        self.set("Content-Type", mime::content_type(token))
    }

    fn send(&self, body: impl Into<Body>) -> Result<(), ResponseError> {
        let bytes = match body.into() {
            Body::Json(value) => return self.json(&value),
            Body::Empty => None,
            Body::Text(text) => {
                let content_type = match self.header("content-type") {
                    Some(content_type) => content_type,
                    None => mime::content_type("html").to_owned(),
                };
                self.set_header("Content-Type", mime::set_charset(&content_type, "utf-8"))?;
                Some(text.into_bytes())
            }
            Body::Bytes(bytes) => {
                if self.header("content-type").is_none() {
                    self.content_type("bin")?;
                }
                Some(bytes)
            }
        };

        if let Some(bytes) = &bytes {
            self.set_header("Content-Length", bytes.len().to_string())?;
        }

        match self.status() {
            204 | 304 => {
                for field in ["Content-Type", "Content-Length", "Transfer-Encoding"] {
                    self.remove_header(field)?;
                }
                self.end()
            }
            _ => self.end_with(bytes.unwrap_or_default()),
        }
    }

    fn json(&self, value: &Value) -> Result<(), ResponseError> {
        let body = to_json(value, json_spaces(self))?;
        if self.header("content-type").is_none() {
            self.set_header("Content-Type", "application/json")?;
        }
        self.send(Body::Text(body))
    }

    fn send_status(&self, status: u16) -> Result<(), ResponseError> {
        self.set_status(status)?;
        self.content_type("txt")?;
        self.send(reason(status))
    }

    fn links(&self, links: &[(&str, &str)]) -> Result<(), ResponseError> {
        let mut entries: Vec<String> = self.header("link").into_iter().collect();
        entries.extend(
            links
                .iter()
                .map(|(rel, url)| format!("<{url}>; rel=\"{rel}\"")),
        );
        self.set_header("Link", entries.join(", "))
    }

    fn location(&self, url: &str) -> Result<(), ResponseError> {
        let target = if url == "back" {
            self.request()
                .and_then(|req| req.header("referrer").or_else(|| req.header("referer")))
                .unwrap_or_else(|| "/".to_owned())
        } else {
            url.to_owned()
        };
        self.set_header("Location", utf8_percent_encode(&target, LOCATION).to_string())
    }

    fn redirect_with(&self, status: u16, url: &str) -> Result<(), ResponseError> {
        self.location(url)?;
        let address = self.header("location").unwrap_or_default();
        self.set_status(status)?;
        self.content_type("txt")?;
        self.send(format!("{}. Redirecting to {address}", reason(status)))
    }

    fn vary(&self, field: &str) -> Result<(), ResponseError> {
        let current = self.header("vary").unwrap_or_default();
        let mut fields: Vec<&str> = current
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect();
        if fields.contains(&"*") {
            return Ok(());
        }
        if field.trim() == "*" {
            return self.set_header("Vary", "*");
        }
        for candidate in field.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            if !fields.iter().any(|f| f.eq_ignore_ascii_case(candidate)) {
                fields.push(candidate);
            }
        }
        self.set_header("Vary", fields.join(", "))
    }

    fn cookie(&self, cookie: impl Into<Cookie<'static>>) -> Result<(), ResponseError> {
        let mut cookie = cookie.into();
        if cookie.path().is_none() {
            cookie.set_path("/");
        }
        self.append_header("Set-Cookie", cookie.encoded().to_string())
    }

    fn clear_cookie(&self, name: &str) -> Result<(), ResponseError> {
        let mut cookie = Cookie::new(name.to_owned(), "");
        cookie.set_path("/");
        cookie.make_removal();
        self.cookie(cookie)
    }

    fn render(&self, view: &str, locals: Map<String, Value>) -> Result<(), HandlerError> {
        let html = self.render_to_string(view, locals)?;
        self.send(html)?;
        Ok(())
    }

    fn render_to_string(
        &self,
        view: &str,
        locals: Map<String, Value>,
    ) -> Result<String, HandlerError> {
        let app = self.app().ok_or(ResponseError::NoApplication)?;
        let mut merged = app.locals();
        merged.extend(self.locals());
        merged.extend(locals);
        Ok(app.render(view, merged)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathway_core::Request;
    use serde_json::json;

    fn pair(method: &str) -> (Request, Response) {
        let req = Request::builder(method, "/")
            .header("Referer", "/previous page")
            .build()
            .unwrap();
        let res = Response::for_request(&req);
        (req, res)
    }

    #[test]
    fn set_adds_charset() {
        let res = Response::new();
        res.set("Content-Type", "text/plain").unwrap();
        assert_eq!(res.get("content-type").as_deref(), Some("text/plain; charset=utf-8"));
        res.set("Content-Type", "image/png").unwrap();
        assert_eq!(res.get("content-type").as_deref(), Some("image/png"));
        res.content_type("json").unwrap();
        assert_eq!(
            res.get("content-type").as_deref(),
            Some("application/json; charset=utf-8")
        );
    }

    #[test]
    fn send_text_defaults_to_html() {
        let res = Response::new();
        res.send("héllo").unwrap();
        assert_eq!(res.get("content-type").as_deref(), Some("text/html; charset=utf-8"));
        assert_eq!(res.get("content-length").as_deref(), Some("6"));
        assert_eq!(res.text().as_deref(), Some("héllo"));
        assert!(res.send("again").is_err());
    }

    #[test]
    fn send_bytes_and_json() {
        let res = Response::new();
        res.send(vec![1u8, 2, 3]).unwrap();
        assert_eq!(
            res.get("content-type").as_deref(),
            Some("application/octet-stream")
        );
        assert_eq!(res.body(), vec![1, 2, 3]);

        let res = Response::new();
        res.send(json!({"id": 1})).unwrap();
        assert_eq!(
            res.get("content-type").as_deref(),
            Some("application/json; charset=utf-8")
        );
        assert_eq!(res.data(), Some(json!({"id": 1})));
    }

    #[test]
    fn json_indentation() {
        assert_eq!(to_json(&json!({"a": 1}), 0).unwrap(), "{\"a\":1}");
        assert_eq!(to_json(&json!({"a": 1}), 2).unwrap(), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn no_content_strips_entity_headers() {
        let res = Response::new();
        res.set_status(204).unwrap();
        res.send("ignored").unwrap();
        assert!(res.get("content-type").is_none());
        assert!(res.get("content-length").is_none());
        assert_eq!(res.text().as_deref(), Some(""));
    }

    #[test]
    fn head_keeps_length_without_body() {
        let (_req, res) = pair("HEAD");
        res.send("hello").unwrap();
        assert_eq!(res.get("content-length").as_deref(), Some("5"));
        assert!(res.body().is_empty());
    }

    #[test]
    fn status_bodies() {
        let res = Response::new();
        res.send_status(404).unwrap();
        assert_eq!(res.status(), 404);
        assert_eq!(res.text().as_deref(), Some("Not Found"));
        assert_eq!(res.get("content-type").as_deref(), Some("text/plain; charset=utf-8"));

        let res = Response::new();
        res.send_status(599).unwrap();
        assert_eq!(res.text().as_deref(), Some("599"));
    }

    #[test]
    fn redirects() {
        let (_req, res) = pair("GET");
        res.redirect("back").unwrap();
        assert_eq!(res.status(), 302);
        assert_eq!(res.get("location").as_deref(), Some("/previous%20page"));
        assert_eq!(
            res.text().as_deref(),
            Some("Found. Redirecting to /previous%20page")
        );

        let res = Response::new();
        res.redirect_with(301, "/caf%C3%A9?q=<x>").unwrap();
        assert_eq!(res.get("location").as_deref(), Some("/caf%C3%A9?q=%3Cx%3E"));
        assert_eq!(res.status(), 301);
    }

    #[test]
    fn vary_and_links() {
        let res = Response::new();
        res.vary("Accept").unwrap();
        res.vary("accept, Origin").unwrap();
        assert_eq!(res.get("vary").as_deref(), Some("Accept, Origin"));
        res.vary("*").unwrap();
        assert_eq!(res.get("vary").as_deref(), Some("*"));

        res.links(&[("next", "/p/2")]).unwrap();
        res.links(&[("last", "/p/5")]).unwrap();
        assert_eq!(
            res.get("link").as_deref(),
            Some("</p/2>; rel=\"next\", </p/5>; rel=\"last\"")
        );
    }

    #[test]
    fn cookies() {
        let res = Response::new();
        res.cookie(("name", "tobi")).unwrap();
        res.clear_cookie("session").unwrap();
        let cookies = res.headers().get_all("set-cookie").to_vec();
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].starts_with("name=tobi"));
        assert!(cookies[0].contains("Path=/"));
        assert!(cookies[1].starts_with("session=;"));
        assert!(cookies[1].contains("Max-Age=0"));
    }

    #[test]
    fn render_requires_an_application() {
        let res = Response::new();
        let err = res.render("index", Map::new()).unwrap_err();
        assert!(err.downcast_ref::<ResponseError>().is_some());
        assert!(!res.is_finished());
    }
}
