//! Prompt rendering.
//!
//! The renderer is pure: the same [`PromptContext`] and turn kind always
//! produce the same text. Clearing consumed pending hints is the driver's
//! job once the turn has finished.

use std::collections::HashMap;
use std::path::Path;

use super::templates::{Placeholder, PromptTemplates};
use crate::r#loop::marker::{ABORT_MARKER, COMPLETE_MARKER};
use crate::r#loop::state::{LoopState, TurnKind};

/// Everything a template can reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext<'a> {
    pub loop_name: &'a str,
    pub iteration: u32,
    pub max_iterations_suffix: String,
    pub task_file: &'a Path,
    /// `None` when the task file does not exist yet.
    pub task_content: Option<&'a str>,
    pub sticky_hints: &'a [String],
    pub pending_hints: &'a [String],
    pub session_rotations: u32,
}

impl<'a> PromptContext<'a> {
    /// Build a context from loop state and the task file text.
    #[must_use]
    pub fn from_state(state: &'a LoopState, task_content: Option<&'a str>) -> Self {
        Self {
            loop_name: &state.name,
            iteration: state.iteration,
            max_iterations_suffix: state.max_iterations_suffix(),
            task_file: &state.task_file,
            task_content,
            sticky_hints: &state.sticky_hints,
            pending_hints: &state.pending_hints,
            session_rotations: state.session_rotations,
        }
    }
}

/// Render the hint block: sticky hints first, then this-turn-only hints.
///
/// Returns an empty string when there are no hints so templates collapse.
#[must_use]
pub fn render_hints(sticky: &[String], pending: &[String]) -> String {
    if sticky.is_empty() && pending.is_empty() {
        return String::new();
    }

    let mut block = String::from("\n## Operator Hints\n\n");
    for hint in sticky {
        block.push_str(&format!("- {}\n", hint.trim()));
    }
    for hint in pending {
        block.push_str(&format!("- (this iteration) {}\n", hint.trim()));
    }
    block
}

/// Fills templates for each turn kind.
#[derive(Debug, Clone, Default)]
pub struct PromptRenderer {
    templates: PromptTemplates,
}

impl PromptRenderer {
    #[must_use]
    pub fn new(templates: PromptTemplates) -> Self {
        Self { templates }
    }

    #[must_use]
    pub fn templates(&self) -> &PromptTemplates {
        &self.templates
    }

    /// Render the prompt for `kind`.
    #[must_use]
    pub fn render(&self, kind: TurnKind, ctx: &PromptContext<'_>) -> String {
        let task_file = ctx.task_file.display().to_string();
        let task_content = match ctx.task_content {
            Some(text) if !text.trim().is_empty() => text.trim_end().to_string(),
            Some(_) => "(the task file is empty)".to_string(),
            None => format!("(the task file {task_file} does not exist yet; create it)"),
        };

        let values: HashMap<Placeholder, String> = [
            (Placeholder::LoopName, ctx.loop_name.to_string()),
            (Placeholder::Iteration, ctx.iteration.to_string()),
            (Placeholder::MaxIterations, ctx.max_iterations_suffix.clone()),
            (Placeholder::TaskFile, task_file),
            (Placeholder::TaskContent, task_content),
            (
                Placeholder::Hints,
                render_hints(ctx.sticky_hints, ctx.pending_hints),
            ),
            (Placeholder::Rotations, ctx.session_rotations.to_string()),
            (Placeholder::CompleteMarker, COMPLETE_MARKER.to_string()),
            (Placeholder::AbortMarker, ABORT_MARKER.to_string()),
        ]
        .into_iter()
        .collect();

        self.templates.get(kind).fill(&values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::templates::Template;
    use crate::r#loop::marker::{classify, Classification};
    use crate::r#loop::state::NewLoop;

    fn state() -> LoopState {
        let mut s = LoopState::new(
            NewLoop::new("auth", "TASKS.md").with_max_iterations(10),
            0,
        );
        s.iteration = 3;
        s
    }

    #[test]
    fn test_render_hints_empty() {
        assert_eq!(render_hints(&[], &[]), "");
    }

    #[test]
    fn test_render_hints_order() {
        let block = render_hints(&["sticky".to_string()], &["once".to_string()]);
        let sticky_at = block.find("- sticky").unwrap();
        let once_at = block.find("- (this iteration) once").unwrap();
        assert!(sticky_at < once_at);
    }

    #[test]
    fn test_build_prompt_placeholders_filled() {
        let s = state();
        let ctx = PromptContext::from_state(&s, Some("- [ ] login\n"));
        let prompt = PromptRenderer::default().render(TurnKind::Build, &ctx);

        assert!(prompt.contains("Loop auth: build iteration 3 of 10"));
        assert!(prompt.contains("`TASKS.md`"));
        assert!(prompt.contains("- [ ] login"));
        assert!(prompt.contains(COMPLETE_MARKER));
        assert!(prompt.contains(ABORT_MARKER));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_unbounded_loop_has_no_suffix() {
        let mut s = state();
        s.max_iterations = 0;
        let ctx = PromptContext::from_state(&s, Some(""));
        let prompt = PromptRenderer::default().render(TurnKind::Plan, &ctx);
        assert!(prompt.contains("planning iteration 3\n"));
    }

    #[test]
    fn test_missing_task_file_mentioned() {
        let s = state();
        let ctx = PromptContext::from_state(&s, None);
        let prompt = PromptRenderer::default().render(TurnKind::Build, &ctx);
        assert!(prompt.contains("does not exist yet"));
    }

    #[test]
    fn test_hints_injected() {
        let mut s = state();
        s.sticky_hints.push("run cargo fmt".into());
        s.pending_hints.push("look at src/auth.rs".into());
        let ctx = PromptContext::from_state(&s, Some("- [ ] a"));
        let prompt = PromptRenderer::default().render(TurnKind::Checkpoint, &ctx);
        assert!(prompt.contains("- run cargo fmt"));
        assert!(prompt.contains("- (this iteration) look at src/auth.rs"));
    }

    #[test]
    fn test_rotation_prompt_mentions_counters() {
        let mut s = state();
        s.session_rotations = 2;
        let ctx = PromptContext::from_state(&s, Some("- [ ] a"));
        let prompt = PromptRenderer::default().render(TurnKind::Rotation, &ctx);
        assert!(prompt.contains("rotation 2"));
        assert!(prompt.contains("iteration 3 of 10"));
    }

    #[test]
    fn test_render_is_idempotent() {
        let mut s = state();
        s.sticky_hints.push("a".into());
        s.pending_hints.push("b".into());
        let renderer = PromptRenderer::default();
        let ctx = PromptContext::from_state(&s, Some("- [x] one\n- [ ] two"));
        for kind in [TurnKind::Build, TurnKind::Plan, TurnKind::Checkpoint, TurnKind::Rotation] {
            assert_eq!(renderer.render(kind, &ctx), renderer.render(kind, &ctx));
        }
    }

    #[test]
    fn test_echoed_build_prompt_is_not_terminal() {
        // An agent that parrots the prompt shows both markers.
        let s = state();
        let ctx = PromptContext::from_state(&s, Some("- [ ] a"));
        let prompt = PromptRenderer::default().render(TurnKind::Build, &ctx);
        assert_eq!(classify(&prompt), Classification::Conflict);
    }

    #[test]
    fn test_custom_template() {
        let mut templates = PromptTemplates::with_defaults();
        templates.set(
            TurnKind::Build,
            Template::new("{{LOOP_NAME}}#{{ITERATION}}{{MAX_ITERATIONS}}"),
        );
        let s = state();
        let ctx = PromptContext::from_state(&s, None);
        assert_eq!(
            PromptRenderer::new(templates).render(TurnKind::Build, &ctx),
            "auth#3 of 10"
        );
    }
}
