//! Install template rendering.
//!
//! Rendering and execution are two separate stages: this module only turns a
//! named template plus parameters into script text. The installer is the only
//! component that runs it.

mod catalog;
mod render;

pub use catalog::{RenderedScript, TemplateCatalog};
pub use render::{TemplateError, TemplateParams, params, placeholders, render_template};
