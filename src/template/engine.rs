//! Handlebars-backed template engine.

use std::fs;
use std::path::{Path, PathBuf};

use handlebars::Handlebars;
use thiserror::Error;

use crate::template::context::TemplateContext;
use crate::template::helpers;

/// Error from template compilation or rendering.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to compile template {name:?}: {source}")]
    Compile {
        name: String,
        #[source]
        source: Box<handlebars::TemplateError>,
    },

    #[error("failed to read template file {path:?}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render template {name:?}: {source}")]
    Render {
        name: String,
        #[source]
        source: Box<handlebars::RenderError>,
    },
}

/// Holds every compiled template for one configuration generation.
///
/// Output is written verbatim: responses are not necessarily HTML, so no
/// escaping is applied.
#[derive(Debug)]
pub struct Engine {
    registry: Handlebars<'static>,
}

impl Engine {
    /// Creates an engine with the full helper set registered.
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        helpers::register_all(&mut registry);
        Self { registry }
    }

    /// Compiles and registers an inline template under `name`.
    pub fn compile_inline(&mut self, name: &str, content: &str) -> Result<(), TemplateError> {
        self.registry
            .register_template_string(name, content)
            .map_err(|source| TemplateError::Compile {
                name: name.to_string(),
                source: Box::new(source),
            })
    }

    /// Reads a template file and registers its contents under `name`.
    pub fn compile_file(&mut self, name: &str, path: &Path) -> Result<(), TemplateError> {
        let content = fs::read_to_string(path).map_err(|source| TemplateError::File {
            path: path.to_path_buf(),
            source,
        })?;
        self.compile_inline(name, &content)
    }

    /// Renders a registered template against the request context.
    pub fn render(&self, name: &str, context: &TemplateContext) -> Result<String, TemplateError> {
        self.registry
            .render(name, context)
            .map_err(|source| TemplateError::Render {
                name: name.to_string(),
                source: Box::new(source),
            })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.registry.has_template(name)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
