use crate::generation::{strip_code_fences, GenerationError, GenerationKind, TextModel};
use crate::logging::{LogLevel, LogRecord, LogSink};
use crate::project::Project;
use crate::prompts::PromptRegistry;
use serde::{Deserialize, Serialize};

fn default_estimated_pages() -> u32 {
    8
}

/// One chapter stub of the outline. `generated` tracks whether manuscript
/// text exists for it yet; the text itself lives in the workflow session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutlineChapter {
    pub title: String,
    pub description: String,
    #[serde(default = "default_estimated_pages")]
    pub estimated_pages: u32,
    #[serde(default)]
    pub generated: bool,
}

impl OutlineChapter {
    pub fn new(title: impl Into<String>, description: impl Into<String>, pages: u32) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            estimated_pages: pages.max(1),
            generated: false,
        }
    }
}

/// Book structure produced by the planner: title, ordered chapter stubs in
/// manuscript order, and the cover-image prompt.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Outline {
    pub title: String,
    pub chapters: Vec<OutlineChapter>,
    pub cover_prompt: String,
}

impl Outline {
    pub fn new(title: impl Into<String>, cover_prompt: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            chapters: Vec::new(),
            cover_prompt: cover_prompt.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn push_chapter(&mut self, chapter: OutlineChapter) {
        self.chapters.push(chapter);
    }

    pub fn generated_count(&self) -> usize {
        self.chapters.iter().filter(|c| c.generated).count()
    }

    pub fn all_generated(&self) -> bool {
        !self.chapters.is_empty() && self.chapters.iter().all(|c| c.generated)
    }

    /// Numbered table of contents injected into chapter prompts for context.
    pub fn table_of_contents(&self) -> String {
        self.chapters
            .iter()
            .enumerate()
            .map(|(i, chapter)| format!("{}. {}: {}", i + 1, chapter.title, chapter.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Deserialize)]
struct RawOutline {
    #[serde(default)]
    title: String,
    #[serde(default)]
    chapters: Vec<RawChapter>,
    #[serde(default)]
    cover_prompt: String,
}

#[derive(Debug, Deserialize)]
struct RawChapter {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_estimated_pages")]
    estimated_pages: u32,
}

/// Plans a fresh outline from the project brief. Each call produces a new,
/// independent outline; nothing is merged with a prior one.
pub struct OutlinePlanner<'a> {
    prompts: &'a PromptRegistry,
    sink: &'a dyn LogSink,
}

impl<'a> OutlinePlanner<'a> {
    pub fn new(prompts: &'a PromptRegistry, sink: &'a dyn LogSink) -> Self {
        Self { prompts, sink }
    }

    pub fn plan<M: TextModel>(
        &self,
        model: &M,
        project: &Project,
    ) -> Result<Outline, GenerationError> {
        const KIND: GenerationKind = GenerationKind::Outline;

        let prompt = self
            .prompts
            .format_with(
                "plan_outline",
                [
                    ("description", project.description.trim().to_string()),
                    ("audience", project.target_audience.label().to_string()),
                    (
                        "output_language",
                        project.output_language.instruction().to_string(),
                    ),
                    ("style", project.writing_style.label().to_string()),
                    ("style_tone", project.writing_style.tone().to_string()),
                    ("code_language", project.code_language.clone()),
                    ("chapter_count", project.chapter_count.to_string()),
                    ("materials", project.materials.clone()),
                    ("reference_links", project.reference_links_joined()),
                ],
            )
            .map_err(|source| GenerationError::Prompt { kind: KIND, source })?;

        self.log(LogLevel::Info, "planning book outline");
        let response = model
            .invoke(&prompt)
            .map_err(|source| GenerationError::Model { kind: KIND, source })?;

        let payload = strip_code_fences(&response);
        if payload.is_empty() {
            return Err(GenerationError::EmptyResponse { kind: KIND });
        }

        let raw: RawOutline = serde_json::from_str(&payload)
            .map_err(|source| GenerationError::Parse { kind: KIND, source })?;
        let outline = validate_outline(raw)?;

        self.log(
            LogLevel::Info,
            format!(
                "outline planned: `{}` with {} chapters",
                outline.title,
                outline.len()
            ),
        );
        Ok(outline)
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.sink.log(LogRecord::new(level, message.into()));
    }
}

/// Presence checks at the service boundary: a payload missing any required
/// field is rejected instead of propagating empty structures forward.
fn validate_outline(raw: RawOutline) -> Result<Outline, GenerationError> {
    const KIND: GenerationKind = GenerationKind::Outline;

    let invalid = |reason: &str| GenerationError::InvalidPayload {
        kind: KIND,
        reason: reason.to_string(),
    };

    if raw.title.trim().is_empty() {
        return Err(invalid("missing book title"));
    }
    if raw.chapters.is_empty() {
        return Err(invalid("chapter list is empty"));
    }
    if raw.cover_prompt.trim().is_empty() {
        return Err(invalid("missing cover prompt"));
    }

    let mut outline = Outline::new(raw.title.trim(), raw.cover_prompt.trim());
    for (index, chapter) in raw.chapters.into_iter().enumerate() {
        if chapter.title.trim().is_empty() {
            return Err(invalid(&format!("chapter {} has no title", index + 1)));
        }
        outline.push_chapter(OutlineChapter::new(
            chapter.title.trim(),
            chapter.description.trim(),
            chapter.estimated_pages,
        ));
    }
    Ok(outline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::ModelError;
    use crate::logging::VecLogSink;

    struct FixedModel(String);

    impl TextModel for FixedModel {
        fn invoke(&self, _prompt: &str) -> Result<String, ModelError> {
            Ok(self.0.clone())
        }
    }

    fn plan(payload: &str) -> Result<Outline, GenerationError> {
        let prompts = PromptRegistry::new().expect("registry");
        let sink = VecLogSink::new();
        let planner = OutlinePlanner::new(&prompts, &sink);
        let project = Project::new("an embedded systems primer");
        planner.plan(&FixedModel(payload.to_string()), &project)
    }

    #[test]
    fn parses_fenced_json_payload() {
        let payload = r#"```json
{"title": "Embedded Primer", "chapters": [
  {"title": "GPIO", "description": "pins", "estimated_pages": 6},
  {"title": "Timers", "description": "ticks"}
], "cover_prompt": "a microcontroller"}
```"#;
        let outline = plan(payload).expect("valid payload");
        assert_eq!(outline.title, "Embedded Primer");
        assert_eq!(outline.len(), 2);
        assert_eq!(outline.chapters[0].estimated_pages, 6);
        // Missing page estimate falls back to the default.
        assert_eq!(outline.chapters[1].estimated_pages, 8);
        assert!(!outline.chapters[0].generated);
    }

    #[test]
    fn rejects_missing_cover_prompt() {
        let payload = r#"{"title": "T", "chapters": [{"title": "A", "description": ""}], "cover_prompt": ""}"#;
        assert!(matches!(
            plan(payload),
            Err(GenerationError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn rejects_empty_chapter_list() {
        let payload = r#"{"title": "T", "chapters": [], "cover_prompt": "x"}"#;
        assert!(matches!(
            plan(payload),
            Err(GenerationError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn rejects_non_json_payload() {
        assert!(matches!(plan("not json"), Err(GenerationError::Parse { .. })));
    }

    #[test]
    fn zero_page_estimates_are_clamped() {
        let payload = r#"{"title": "T", "chapters": [{"title": "A", "description": "", "estimated_pages": 0}], "cover_prompt": "x"}"#;
        let outline = plan(payload).unwrap();
        assert_eq!(outline.chapters[0].estimated_pages, 1);
    }

    #[test]
    fn table_of_contents_is_numbered() {
        let mut outline = Outline::new("T", "c");
        outline.push_chapter(OutlineChapter::new("One", "first", 3));
        outline.push_chapter(OutlineChapter::new("Two", "second", 4));
        assert_eq!(outline.table_of_contents(), "1. One: first\n2. Two: second");
    }
}
