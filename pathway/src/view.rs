//! # Views
//!
//! Rendering goes through two narrow contracts:
//!
//! - [`ViewEngine`]: turns template text and locals into output
//! - [`TemplateSource`]: maps a resolved identifier (`views/index.html`) to
//!   template text
//!
//! Engines are registered per file extension with
//! [`Application::engine`](crate::Application::engine). A view name without an
//! extension takes the `view engine` setting as its extension, and is looked up
//! under every root listed in the `views` setting, first hit wins.

use pathway_core::BoxError;
use serde_json::{Map, Value};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;

/// Renders template text with locals.
pub trait ViewEngine: Send + Sync + 'static {
    /// Render `template` with `locals`.
    fn render(&self, template: &str, locals: &Map<String, Value>) -> Result<String, BoxError>;
}

impl<F> ViewEngine for F
where
    F: Fn(&str, &Map<String, Value>) -> Result<String, BoxError> + Send + Sync + 'static,
{
    fn render(&self, template: &str, locals: &Map<String, Value>) -> Result<String, BoxError> {
        self(template, locals)
    }
}

/// Supplies template text by identifier.
pub trait TemplateSource: Send + Sync + 'static {
    /// Template text for `identifier`, if known.
    fn template(&self, identifier: &str) -> Option<String>;
}

/// An in-memory [`TemplateSource`].
#[derive(Debug, Clone, Default)]
pub struct MemoryTemplates {
    templates: HashMap<String, String>,
}

impl MemoryTemplates {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template under `identifier`.
    pub fn insert(&mut self, identifier: impl Into<String>, text: impl Into<String>) -> &mut Self {
        self.templates.insert(identifier.into(), text.into());
        self
    }

    /// Builder form of [`MemoryTemplates::insert`].
    pub fn with(mut self, identifier: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(identifier, text);
        self
    }
}

impl TemplateSource for MemoryTemplates {
    fn template(&self, identifier: &str) -> Option<String> {
        self.templates.get(identifier).cloned()
    }
}

/// View resolution and rendering failures.
#[derive(Error, Debug)]
pub enum ViewError {
    /// Neither the name nor the `view engine` setting gave an extension.
    #[error("no default engine was specified and no extension was provided")]
    NoDefaultEngine,

    /// No engine registered for the extension.
    #[error("no engine has been configured for the extension '{0}'")]
    NoEngine(String),

    /// No root contained the view.
    #[error("failed to lookup view \"{name}\" in views {roots}")]
    NotFound {
        /// The requested name.
        name: String,
        /// The roots searched.
        roots: String,
    },

    /// The engine failed.
    #[error(transparent)]
    Render(BoxError),
}

/// A resolved view.
pub(crate) struct View {
    pub(crate) identifier: String,
    pub(crate) template: String,
    pub(crate) engine: Arc<dyn ViewEngine>,
}

impl View {
    pub(crate) fn resolve(
        name: &str,
        default_engine: Option<&str>,
        roots: &[String],
        engine_for: impl Fn(&str) -> Option<Arc<dyn ViewEngine>>,
        source: &dyn TemplateSource,
    ) -> Result<Self, ViewError> {
        let (file, ext) = match extname(name) {
            Some(ext) => (name.to_owned(), ext.to_owned()),
            None => {
                let engine = default_engine.ok_or(ViewError::NoDefaultEngine)?;
                let ext = if engine.starts_with('.') {
                    engine.to_owned()
                } else {
                    format!(".{engine}")
                };
                (format!("{name}{ext}"), ext)
            }
        };
        let engine = engine_for(&ext).ok_or_else(|| ViewError::NoEngine(ext.clone()))?;

        for root in roots {
            let identifier = join(root, &file);
            if let Some(template) = source.template(&identifier) {
                return Ok(View {
                    identifier,
                    template,
                    engine,
                });
            }
        }
        Err(ViewError::NotFound {
            name: file,
            roots: match roots {
                [single] => format!("directory \"{single}\""),
                _ => format!("directories \"{}\"", roots.join("\", \"")),
            },
        })
    }

    pub(crate) fn render(&self, locals: &Map<String, Value>) -> Result<String, ViewError> {
        self.engine
            .render(&self.template, locals)
            .map_err(ViewError::Render)
    }
}

/// Extension of the last path segment, including the dot.
fn extname(name: &str) -> Option<&str> {
    let file = name.rsplit('/').next().unwrap_or(name);
    match file.rfind('.') {
        Some(0) | None => None,
        Some(dot) => Some(&file[dot..]),
    }
}

/// Join a view name onto a root, resolving `.` and `..` segments. Names
/// starting with `/` ignore the root.
fn join(root: &str, name: &str) -> String {
    let joined = if name.starts_with('/') {
        name.to_owned()
    } else {
        format!("{root}/{name}")
    };
    let absolute = joined.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let path = segments.join("/");
    if absolute { format!("/{path}") } else { path }
}

/// Read the `views` setting as a list of roots.
pub(crate) fn roots(setting: Option<Value>) -> Vec<String> {
    match setting {
        Some(Value::String(root)) => vec![root],
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(root) => Some(root),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upper() -> Arc<dyn ViewEngine> {
        Arc::new(|template: &str, locals: &Map<String, Value>| -> Result<String, BoxError> {
            let name = locals.get("name").and_then(Value::as_str).unwrap_or("?");
            Ok(template.replace("{name}", name).to_uppercase())
        })
    }

    #[test]
    fn names_and_paths() {
        assert_eq!(extname("index.html"), Some(".html"));
        assert_eq!(extname("users/list"), None);
        assert_eq!(extname(".hidden"), None);
        assert_eq!(join("views", "users/../index.html"), "views/index.html");
        assert_eq!(join("./views/", "./a.html"), "views/a.html");
        assert_eq!(join("views", "/abs/a.html"), "/abs/a.html");
    }

    #[test]
    fn resolves_through_roots() {
        let source = MemoryTemplates::new().with("shared/user.tpl", "hi {name}");
        let roots = vec!["views".to_owned(), "shared".to_owned()];
        let view = View::resolve(
            "user",
            Some("tpl"),
            &roots,
            |ext| (ext == ".tpl").then(upper),
            &source,
        )
        .unwrap();
        assert_eq!(view.identifier, "shared/user.tpl");
        let locals = json!({"name": "tobi"}).as_object().cloned().unwrap();
        assert_eq!(view.render(&locals).unwrap(), "HI TOBI");
    }

    #[test]
    fn resolution_errors() {
        let source = MemoryTemplates::new();
        let roots = vec!["views".to_owned()];
        let err = View::resolve("user", None, &roots, |_| Some(upper()), &source)
            .err()
            .unwrap();
        assert!(matches!(err, ViewError::NoDefaultEngine));

        let err = View::resolve("user.ejs", None, &roots, |_| None, &source)
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "no engine has been configured for the extension '.ejs'"
        );

        let err = View::resolve("user.tpl", None, &roots, |_| Some(upper()), &source)
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "failed to lookup view \"user.tpl\" in views directory \"views\""
        );
    }
}
