//! Prompt templates and placeholder substitution.
//!
//! Four templates exist, one per [`TurnKind`]. The built-in text can be
//! replaced per kind by files in a templates directory
//! (`build.md`, `plan.md`, `checkpoint.md`, `rotation.md`).
//!
//! # Example
//!
//! ```
//! use ralph_loop::prompt::templates::{Placeholder, PromptTemplates};
//! use ralph_loop::r#loop::state::TurnKind;
//!
//! let templates = PromptTemplates::with_defaults();
//! assert!(templates.get(TurnKind::Build).has_placeholder(Placeholder::TaskContent));
//! ```

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::error::Result;
use crate::r#loop::state::TurnKind;

/// Placeholders every template may use.
///
/// # Example
///
/// ```
/// use ralph_loop::prompt::templates::Placeholder;
///
/// assert_eq!(Placeholder::LoopName.tag(), "{{LOOP_NAME}}");
/// assert_eq!(Placeholder::from_name("HINTS"), Some(Placeholder::Hints));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    LoopName,
    Iteration,
    /// `" of N"` for bounded loops, empty otherwise.
    MaxIterations,
    TaskFile,
    TaskContent,
    /// Rendered sticky + pending hint block; empty when there are none.
    Hints,
    Rotations,
    CompleteMarker,
    AbortMarker,
}

impl Placeholder {
    /// Name between the braces.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Placeholder::LoopName => "LOOP_NAME",
            Placeholder::Iteration => "ITERATION",
            Placeholder::MaxIterations => "MAX_ITERATIONS",
            Placeholder::TaskFile => "TASK_FILE",
            Placeholder::TaskContent => "TASK_CONTENT",
            Placeholder::Hints => "HINTS",
            Placeholder::Rotations => "ROTATIONS",
            Placeholder::CompleteMarker => "COMPLETE_MARKER",
            Placeholder::AbortMarker => "ABORT_MARKER",
        }
    }

    /// Full tag as written in a template.
    #[must_use]
    pub fn tag(&self) -> String {
        format!("{{{{{}}}}}", self.name())
    }

    #[must_use]
    pub fn all() -> &'static [Placeholder] {
        &[
            Placeholder::LoopName,
            Placeholder::Iteration,
            Placeholder::MaxIterations,
            Placeholder::TaskFile,
            Placeholder::TaskContent,
            Placeholder::Hints,
            Placeholder::Rotations,
            Placeholder::CompleteMarker,
            Placeholder::AbortMarker,
        ]
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Placeholder> {
        Self::all().iter().copied().find(|p| p.name() == name)
    }
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([A-Z_]+)\}\}").expect("placeholder pattern is valid"))
}

/// A template body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    content: String,
}

impl Template {
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn has_placeholder(&self, placeholder: Placeholder) -> bool {
        self.content.contains(&placeholder.tag())
    }

    /// Tags that look like placeholders but are not recognised.
    #[must_use]
    pub fn unknown_tags(&self) -> Vec<String> {
        tag_re()
            .captures_iter(&self.content)
            .filter(|caps| Placeholder::from_name(&caps[1]).is_none())
            .map(|caps| caps[0].to_string())
            .collect()
    }

    /// Replace every known tag in a single pass.
    ///
    /// Substituted values are not rescanned, so task content containing
    /// `{{HINTS}}` is left as written. Unknown tags are kept verbatim.
    #[must_use]
    pub fn fill(&self, values: &HashMap<Placeholder, String>) -> String {
        tag_re()
            .replace_all(&self.content, |caps: &Captures| {
                Placeholder::from_name(&caps[1])
                    .and_then(|p| values.get(&p))
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// Template set keyed by turn kind.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    templates: HashMap<TurnKind, Template>,
}

impl PromptTemplates {
    /// Built-in templates for all four turn kinds.
    #[must_use]
    pub fn with_defaults() -> Self {
        let templates = [
            (TurnKind::Build, DEFAULT_BUILD_TEMPLATE),
            (TurnKind::Plan, DEFAULT_PLAN_TEMPLATE),
            (TurnKind::Checkpoint, DEFAULT_CHECKPOINT_TEMPLATE),
            (TurnKind::Rotation, DEFAULT_ROTATION_TEMPLATE),
        ]
        .into_iter()
        .map(|(kind, text)| (kind, Template::new(text)))
        .collect();
        Self { templates }
    }

    /// Defaults, with any `<kind>.md` files in `dir` taking precedence.
    ///
    /// A missing directory is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if an override file exists but cannot be read.
    pub fn load_or_defaults(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut templates = Self::with_defaults();
        if !dir.exists() {
            return Ok(templates);
        }

        for kind in [
            TurnKind::Build,
            TurnKind::Plan,
            TurnKind::Checkpoint,
            TurnKind::Rotation,
        ] {
            let path = dir.join(format!("{kind}.md"));
            if !path.exists() {
                continue;
            }
            let template = Template::new(std::fs::read_to_string(&path)?);
            for tag in template.unknown_tags() {
                warn!("Template {} uses unknown placeholder {}", path.display(), tag);
            }
            debug!("Using {} template from {}", kind, path.display());
            templates.set(kind, template);
        }

        Ok(templates)
    }

    pub fn set(&mut self, kind: TurnKind, template: Template) {
        self.templates.insert(kind, template);
    }

    /// Template for a kind. Every kind is always present.
    #[must_use]
    pub fn get(&self, kind: TurnKind) -> &Template {
        // with_defaults populates every kind and set only replaces
        &self.templates[&kind]
    }
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Build iteration: implement one unchecked item.
pub const DEFAULT_BUILD_TEMPLATE: &str = r#"# Loop {{LOOP_NAME}}: build iteration {{ITERATION}}{{MAX_ITERATIONS}}

You are working through the task file `{{TASK_FILE}}`. Its current contents:

<task_file>
{{TASK_CONTENT}}
</task_file>
{{HINTS}}
## This Iteration

1. Pick the single most important unchecked item (`- [ ]`) in the task file.
2. Implement it completely. No placeholders, no stubs.
3. Validate the change: build it, run the relevant tests, fix what fails.
4. Update `{{TASK_FILE}}`: check off what is done (`- [x]`), add newly
   discovered work as unchecked items, and note anything the next
   iteration must know.

## Ending the Turn

When every item is done and validated, print this line on its own:

{{COMPLETE_MARKER}}

If the task cannot be continued at all (missing access, contradictory
requirements), explain why and print this line on its own:

{{ABORT_MARKER}}

Otherwise simply end the turn; the next iteration continues from the
task file. Never print a marker line just to quote it.
"#;

/// Plan iteration: gap analysis, no code changes.
pub const DEFAULT_PLAN_TEMPLATE: &str = r#"# Loop {{LOOP_NAME}}: planning iteration {{ITERATION}}{{MAX_ITERATIONS}}

You are planning the work tracked in `{{TASK_FILE}}`. Its current contents:

<task_file>
{{TASK_CONTENT}}
</task_file>
{{HINTS}}
## This Iteration

1. Study the existing codebase and compare it against the task file.
2. Identify gaps: missing features, incomplete items, untested paths.
3. Update `{{TASK_FILE}}` only: add, split, reorder or clarify checklist
   items (`- [ ]`) so each one is small and verifiable.

Do NOT modify any source code, tests or configuration in this mode.

## Ending the Turn

When the plan is complete and needs no further refinement, print this
line on its own:

{{COMPLETE_MARKER}}

If planning cannot continue, explain why and print this line on its own:

{{ABORT_MARKER}}

Otherwise simply end the turn. Never print a marker line just to quote it.
"#;

/// Checkpoint: structured reflection written into the task file.
pub const DEFAULT_CHECKPOINT_TEMPLATE: &str = r#"# Loop {{LOOP_NAME}}: checkpoint at iteration {{ITERATION}}{{MAX_ITERATIONS}}

Pause normal work. Reflect on the loop so far using `{{TASK_FILE}}`:

<task_file>
{{TASK_CONTENT}}
</task_file>
{{HINTS}}
Append a section to `{{TASK_FILE}}` headed
`## Checkpoint (iteration {{ITERATION}})` containing:

- **Completed**: items finished since the previous checkpoint.
- **Failed approaches**: what was tried and did not work, and why.
- **Key decisions**: choices made and their reasons.
- **Current state**: what works now and what is broken.
- **Next steps**: the ordered items to tackle next.

Keep existing checklist items intact. Write the section, then end the turn.
"#;

/// First turn after a session rotation.
pub const DEFAULT_ROTATION_TEMPLATE: &str = r#"# Loop {{LOOP_NAME}}: fresh session at iteration {{ITERATION}}{{MAX_ITERATIONS}}

This is a new agent session (rotation {{ROTATIONS}}). You have no memory
of earlier iterations; everything you need is in `{{TASK_FILE}}`:

<task_file>
{{TASK_CONTENT}}
</task_file>
{{HINTS}}
## Reorient, Then Work

1. Read the task file above, including any checkpoint sections.
2. Inspect the current state of the code before changing anything.
3. Continue with the most important unchecked item (`- [ ]`), validate
   it, and update `{{TASK_FILE}}`.

When every item is done and validated, print this line on its own:

{{COMPLETE_MARKER}}

If the task cannot be continued at all, explain why and print this line
on its own:

{{ABORT_MARKER}}

Otherwise simply end the turn. Never print a marker line just to quote it.
"#;
