//! Prompt selection and rendering.
//!
//! - [`templates`] - built-in templates, overrides and placeholder substitution
//! - [`renderer`] - fills a template from loop state for one turn

pub mod renderer;
pub mod templates;

pub use renderer::{render_hints, PromptContext, PromptRenderer};
pub use templates::{Placeholder, PromptTemplates, Template};
