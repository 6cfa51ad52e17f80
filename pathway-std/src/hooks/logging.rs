//! Request logging.

use pathway_core::{Handler, IntoHandlers, Middleware, Next, Request, Response};
use std::time::Instant;
use tracing::info;

/// Logs each transaction once its response reaches a terminal state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Logger;

impl Middleware for Logger {
    async fn handle(&self, req: Request, res: Response) -> Next {
        let started = Instant::now();
        let method = req.method();
        let url = req.original_url();
        let weak = res.downgrade();
        res.on_finish(move |completion| {
            let status = weak.upgrade().map_or(0, |res| res.status());
            info!(
                %method,
                %url,
                status,
                elapsed_ms = started.elapsed().as_millis() as u64,
                ?completion,
                "transaction finished"
            );
        });
        Next::Continue
    }
}

impl IntoHandlers for Logger {
    fn into_handlers(self) -> Vec<Handler> {
        vec![Handler::new(self)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through() {
        let req = Request::new("GET", "/logged").unwrap();
        let res = Response::for_request(&req);
        let next = Logger.handle(req, res.clone()).await;
        assert!(matches!(next, Next::Continue));
        res.end().unwrap();
    }
}
