//! A single entry of a router's stack.

use crate::pattern::{PathMatch, PathPattern, PathSpec, PatternOptions};
use pathway_core::{ConfigError, Handler, PathMatchError};

/// What a layer dispatches to once matched.
pub(crate) enum Target {
    /// A middleware or mounted router/application.
    Handler(Handler),
    /// Index of a route owned by the router.
    Route(usize),
}

/// A compiled matcher bound to its target. Immutable once registered.
pub(crate) struct Layer {
    pattern: PathPattern,
    target: Target,
}

impl Layer {
    pub(crate) fn new(
        spec: &PathSpec,
        options: PatternOptions,
        target: Target,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            pattern: PathPattern::compile(spec, options)?,
            target,
        })
    }

    pub(crate) fn matches(&self, path: &str) -> Result<Option<PathMatch>, PathMatchError> {
        self.pattern.matches(path)
    }

    pub(crate) fn param_names(&self) -> impl Iterator<Item = &str> {
        self.pattern.param_names()
    }

    pub(crate) fn target(&self) -> &Target {
        &self.target
    }

    /// Whether this layer only takes part while an error is pending.
    pub(crate) fn handles_errors(&self) -> bool {
        match &self.target {
            Target::Handler(handler) => handler.is_error_handler(),
            Target::Route(_) => false,
        }
    }
}
