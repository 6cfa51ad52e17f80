//! The default responder for exhausted dispatches.
//!
//! Without an error the transaction gets a `404 Cannot METHOD /url`. With one,
//! it gets the error's status (or 500) and, outside production, the error
//! message. Bodies are HTML-escaped.

use http::StatusCode;
use pathway_core::{HandlerError, Request, Response, ResponseError};
use std::sync::Arc;
use tracing::debug;

/// Callback receiving unhandled errors.
pub type OnError = Arc<dyn Fn(&HandlerError, &Request, &Response) + Send + Sync + 'static>;

/// Options for [`final_handler`].
#[derive(Clone, Default)]
pub struct FinalOptions {
    /// Environment name. `"production"` hides error details.
    pub env: String,
    /// Invoked for every unhandled error before responding.
    pub on_error: Option<OnError>,
}

/// Respond to a transaction no handler completed.
pub fn final_handler(
    err: Option<&HandlerError>,
    req: &Request,
    res: &Response,
    options: &FinalOptions,
) {
    if err.is_none() && res.headers_sent() {
        debug!("cannot 404 after headers sent");
        return;
    }

    let (status, body) = match err {
        Some(err) => {
            let status = match err.status() {
                Some(status @ 400..=599) => status,
                _ if res.status() >= 400 => res.status(),
                _ => 500,
            };
            let message = if options.env == "production" {
                reason(status).to_owned()
            } else {
                err.to_string()
            };
            let body = format!(
                "{}\n",
                escape(&message).replace('\n', "<br>").replace("  ", " &nbsp;")
            );
            (status, body)
        }
        None => (
            404,
            format!(
                "Cannot {} {}\n",
                escape(req.method().as_str()),
                escape(&req.original_url())
            ),
        ),
    };

    if let (Some(err), Some(on_error)) = (err, &options.on_error) {
        on_error(err, req, res);
    }

    if res.headers_sent() {
        res.destroy();
        return;
    }

    if let Err(err) = send(req, res, status, &body) {
        debug!(%err, "final handler could not respond");
    }
}

fn send(req: &Request, res: &Response, status: u16, body: &str) -> Result<(), ResponseError> {
    res.set_status(status)?;
    res.set_header("X-Content-Type-Options", "nosniff")?;
    res.set_header("Content-Type", "text/html; charset=utf-8")?;
    res.set_header("Content-Length", body.len().to_string())?;
    if req.method() == http::Method::HEAD {
        res.end()
    } else {
        res.end_with(body)
    }
}

fn escape(text: &str) -> String {
    html_escape::encode_quoted_attribute(text).into_owned()
}

fn reason(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown Error")
}
