use crate::generation::{GenerationError, GenerationKind, TextModel};
use crate::logging::{LogLevel, LogRecord, LogSink};
use crate::outline::Outline;
use crate::project::Project;
use crate::prompts::PromptRegistry;

/// Separator placed between chapters when texts are joined into one
/// manuscript. Changing it breaks previously exported documents.
pub const MANUSCRIPT_SEPARATOR: &str = "\n\n---\n\n";

/// Writes the manuscript text of a single chapter. The writer is stateless;
/// the workflow session owns ordering, credit checks and storage of results.
pub struct ChapterWriter<'a> {
    prompts: &'a PromptRegistry,
    sink: &'a dyn LogSink,
}

impl<'a> ChapterWriter<'a> {
    pub fn new(prompts: &'a PromptRegistry, sink: &'a dyn LogSink) -> Self {
        Self { prompts, sink }
    }

    pub fn write<M: TextModel>(
        &self,
        model: &M,
        project: &Project,
        outline: &Outline,
        index: usize,
    ) -> Result<String, GenerationError> {
        let kind = GenerationKind::Chapter { index };
        let chapter = outline.chapters.get(index).ok_or_else(|| {
            GenerationError::InvalidPayload {
                kind,
                reason: format!(
                    "chapter index {} is out of range for {} chapters",
                    index,
                    outline.len()
                ),
            }
        })?;

        let prompt = self
            .prompts
            .format_with(
                "write_chapter",
                [
                    ("title", outline.title.clone()),
                    ("chapter_number", (index + 1).to_string()),
                    ("chapter_title", chapter.title.clone()),
                    ("chapter_description", chapter.description.clone()),
                    ("estimated_pages", chapter.estimated_pages.to_string()),
                    ("audience", project.target_audience.label().to_string()),
                    ("style", project.writing_style.label().to_string()),
                    ("style_tone", project.writing_style.tone().to_string()),
                    ("code_language", project.code_language.clone()),
                    (
                        "output_language",
                        project.output_language.instruction().to_string(),
                    ),
                    ("materials", project.materials.clone()),
                    ("outline_toc", outline.table_of_contents()),
                ],
            )
            .map_err(|source| GenerationError::Prompt { kind, source })?;

        self.sink.log(LogRecord::new(
            LogLevel::Info,
            format!("writing chapter {} of {}: {}", index + 1, outline.len(), chapter.title),
        ));

        let text = model
            .invoke(&prompt)
            .map_err(|source| GenerationError::Model { kind, source })?;
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(GenerationError::EmptyResponse { kind });
        }
        Ok(text)
    }
}

/// Joins generated chapter texts in outline order. Ungenerated chapters are
/// skipped, so a partially written book still assembles cleanly.
pub fn assemble_manuscript(texts: &[Option<String>]) -> String {
    texts
        .iter()
        .filter_map(|text| text.as_deref())
        .collect::<Vec<_>>()
        .join(MANUSCRIPT_SEPARATOR)
}
