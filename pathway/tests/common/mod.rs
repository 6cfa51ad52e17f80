#![allow(dead_code)]

use pathway::{Application, Request, Response};
use std::sync::{Arc, Mutex};

// ============================================================================
// Transactions
// ============================================================================

pub fn transaction(method: &str, url: &str) -> (Request, Response) {
    let req = Request::new(method, url).unwrap();
    let res = Response::for_request(&req);
    (req, res)
}

/// Run `method url` through `app` end to end.
pub async fn request(app: &Application, method: &str, url: &str) -> Response {
    let (req, res) = transaction(method, url);
    app.handle(&req, &res).await.unwrap();
    res
}

// ============================================================================
// Applications
// ============================================================================

/// An application whose unhandled errors are not logged.
pub fn quiet_app() -> Application {
    let mut app = Application::new();
    app.set("env", "test");
    app
}

// ============================================================================
// Recording
// ============================================================================

#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}
