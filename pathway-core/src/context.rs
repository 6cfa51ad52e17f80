//! The application seam.
//!
//! Requests and responses keep a handle to the application currently
//! handling them. The application type itself lives in the facade crate; the
//! core only sees it through [`AppContext`].

use crate::{error::BoxError, request::Request, response::Response};
use serde_json::{Map, Value};
use std::{any::Any, sync::Arc};

/// A request extension registered on an application.
pub type RequestExtension =
    Arc<dyn Fn(&Request, &[Value]) -> Result<Value, BoxError> + Send + Sync + 'static>;

/// A response extension registered on an application.
pub type ResponseExtension =
    Arc<dyn Fn(&Response, &[Value]) -> Result<Value, BoxError> + Send + Sync + 'static>;

/// What handlers can see of the application dispatching them.
pub trait AppContext: Send + Sync + 'static {
    /// Value of a setting, resolved through parents and defaults.
    fn setting(&self, name: &str) -> Option<Value>;

    /// Whether a setting holds a truthy value.
    fn enabled(&self, name: &str) -> bool {
        self.setting(name).as_ref().is_some_and(truthy)
    }

    /// Application-wide template locals.
    fn locals(&self) -> Map<String, Value>;

    /// Look up a request extension by name.
    fn request_extension(&self, name: &str) -> Option<RequestExtension>;

    /// Look up a response extension by name.
    fn response_extension(&self, name: &str) -> Option<ResponseExtension>;

    /// Render a named view with fully merged locals.
    fn render(&self, name: &str, locals: Map<String, Value>) -> Result<String, BoxError>;

    /// Upcast for downcasting to the concrete application type.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// JavaScript-like truthiness of a setting value.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::truthy;
    use serde_json::json;

    #[test]
    fn truthiness() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!("production")));
        assert!(truthy(&json!({})));
    }
}
