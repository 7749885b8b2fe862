use crate::chapter::{assemble_manuscript, ChapterWriter};
use crate::cover::{CoverArtist, CoverImage};
use crate::generation::{GenerationError, ImageModel, TextModel};
use crate::ledger::{CreditLedger, LedgerError};
use crate::logging::{LogLevel, LogRecord, LogSink};
use crate::outline::{Outline, OutlineChapter, OutlinePlanner};
use crate::project::{Project, ProjectError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Where a book sits in its generation lifecycle. Pending stages exist only
/// while a call is in flight; a persisted pending stage means the process died
/// mid-generation and is normalized away on load.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Idle,
    OutlinePending,
    OutlineReady,
    ChapterPending(usize),
    ManuscriptAssembling,
    CoverPending,
    Completed,
    Error,
}

impl WorkflowStage {
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::OutlinePending
                | Self::ChapterPending(_)
                | Self::ManuscriptAssembling
                | Self::CoverPending
        )
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::OutlinePending => f.write_str("planning outline"),
            Self::OutlineReady => f.write_str("outline ready"),
            Self::ChapterPending(index) => write!(f, "writing chapter {}", index + 1),
            Self::ManuscriptAssembling => f.write_str("assembling manuscript"),
            Self::CoverPending => f.write_str("rendering cover"),
            Self::Completed => f.write_str("completed"),
            Self::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("invalid project: {0}")]
    Validation(#[from] ProjectError),
    #[error("insufficient balance: the operation costs {required} credits but only {available} are available")]
    InsufficientBalance { required: u64, available: u64 },
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("chapter index {index} is out of range for {len} chapters")]
    ChapterIndex { index: usize, len: usize },
    #[error("chapter {} is already being generated", index + 1)]
    ChapterBusy { index: usize },
    #[error("cannot {action} while the book is in the `{stage}` stage")]
    InvalidStage {
        action: &'static str,
        stage: WorkflowStage,
    },
}

impl From<LedgerError> for WorkflowError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::InsufficientBalance {
                required,
                available,
            } => Self::InsufficientBalance {
                required,
                available,
            },
        }
    }
}

/// One book being authored: project settings, outline, per-chapter texts, the
/// cover, and the credit ledger that meters every generation call. All
/// transitions between stages go through the methods here.
#[derive(Debug)]
pub struct WorkflowSession {
    pub project: Project,
    stage: WorkflowStage,
    outline: Option<Outline>,
    texts: Vec<Option<String>>,
    cover: Option<CoverImage>,
    ledger: CreditLedger,
    in_flight: Vec<bool>,
    last_error: Option<String>,
}

impl WorkflowSession {
    pub fn new(project: Project, ledger: CreditLedger) -> Self {
        Self {
            project,
            stage: WorkflowStage::Idle,
            outline: None,
            texts: Vec::new(),
            cover: None,
            ledger,
            in_flight: Vec::new(),
            last_error: None,
        }
    }

    /// Restores a session from persisted parts, normalizing any stage that
    /// cannot survive a restart.
    pub fn restore(
        project: Project,
        ledger: CreditLedger,
        outline: Option<Outline>,
        texts: Vec<Option<String>>,
        cover: Option<CoverImage>,
        stage: WorkflowStage,
    ) -> Self {
        let chapter_count = outline.as_ref().map(Outline::len).unwrap_or(0);
        let mut texts = texts;
        texts.resize(chapter_count, None);
        let stage = if stage.is_pending() || (stage != WorkflowStage::Idle && outline.is_none()) {
            if outline.is_some() {
                WorkflowStage::OutlineReady
            } else {
                WorkflowStage::Idle
            }
        } else {
            stage
        };
        Self {
            project,
            stage,
            outline,
            texts,
            cover,
            ledger,
            in_flight: vec![false; chapter_count],
            last_error: None,
        }
    }

    pub fn stage(&self) -> WorkflowStage {
        self.stage
    }

    pub fn outline(&self) -> Option<&Outline> {
        self.outline.as_ref()
    }

    pub fn cover(&self) -> Option<&CoverImage> {
        self.cover.as_ref()
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut CreditLedger {
        &mut self.ledger
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn chapter_text(&self, index: usize) -> Option<&str> {
        self.texts.get(index).and_then(|text| text.as_deref())
    }

    pub fn chapter_texts(&self) -> &[Option<String>] {
        &self.texts
    }

    /// Generated chapters joined in outline order.
    pub fn manuscript(&self) -> String {
        assemble_manuscript(&self.texts)
    }

    // ---- outline ----------------------------------------------------------

    /// Plans a new outline, replacing any existing one. The outline fee is
    /// charged only after the model call succeeds; re-planning charges the
    /// full fee again.
    pub fn plan_outline<M: TextModel>(
        &mut self,
        planner: &OutlinePlanner<'_>,
        model: &M,
    ) -> Result<(), WorkflowError> {
        match self.stage {
            WorkflowStage::Idle | WorkflowStage::OutlineReady | WorkflowStage::Error => {}
            stage => {
                return Err(WorkflowError::InvalidStage {
                    action: "plan the outline",
                    stage,
                })
            }
        }
        self.project.validate()?;

        let cost = self.ledger.outline_cost();
        self.ensure_affordable(cost)?;

        self.stage = WorkflowStage::OutlinePending;
        match planner.plan(model, &self.project) {
            Ok(outline) => {
                self.ledger.charge(cost)?;
                self.texts = vec![None; outline.len()];
                self.in_flight = vec![false; outline.len()];
                self.cover = None;
                self.outline = Some(outline);
                self.last_error = None;
                self.stage = WorkflowStage::OutlineReady;
                Ok(())
            }
            Err(error) => {
                self.last_error = Some(error.to_string());
                self.stage = WorkflowStage::Error;
                Err(error.into())
            }
        }
    }

    // ---- chapters ---------------------------------------------------------

    /// Writes (or rewrites) one chapter. Rewriting an already generated
    /// chapter charges its full cost again and replaces the stored text. A
    /// failure leaves the rest of the book intact and returns the session to
    /// the outline-ready stage.
    pub fn write_chapter<M: TextModel>(
        &mut self,
        writer: &ChapterWriter<'_>,
        model: &M,
        index: usize,
    ) -> Result<(), WorkflowError> {
        if self.stage != WorkflowStage::OutlineReady {
            return Err(WorkflowError::InvalidStage {
                action: "write a chapter",
                stage: self.stage,
            });
        }
        let cost = {
            let outline = self.outline_checked("write a chapter")?;
            let chapter = outline
                .chapters
                .get(index)
                .ok_or(WorkflowError::ChapterIndex {
                    index,
                    len: outline.len(),
                })?;
            self.ledger.chapter_cost(chapter)
        };
        if self.in_flight.get(index).copied().unwrap_or(false) {
            return Err(WorkflowError::ChapterBusy { index });
        }
        self.ensure_affordable(cost)?;

        self.in_flight[index] = true;
        self.stage = WorkflowStage::ChapterPending(index);
        let outline = self.outline.as_ref().ok_or(WorkflowError::InvalidStage {
            action: "write a chapter",
            stage: self.stage,
        })?;
        let result = writer.write(model, &self.project, outline, index);
        self.in_flight[index] = false;
        self.stage = WorkflowStage::OutlineReady;

        match result {
            Ok(text) => {
                self.ledger.charge(cost)?;
                self.texts[index] = Some(text);
                if let Some(outline) = self.outline.as_mut() {
                    outline.chapters[index].generated = true;
                }
                self.last_error = None;
                Ok(())
            }
            Err(error) => {
                self.last_error = Some(error.to_string());
                Err(error.into())
            }
        }
    }

    /// Runs the whole remaining pipeline: every ungenerated chapter in order,
    /// manuscript assembly, then the cover. The affordability pre-flight
    /// covers the chapters only; an unaffordable or failing cover is skipped
    /// with a warning instead of blocking completion. `checkpoint` runs after
    /// every persisted-state change so callers can save progress.
    pub fn generate_remaining<M, F>(
        &mut self,
        writer: &ChapterWriter<'_>,
        model: &M,
        cover: Option<(&CoverArtist<'_>, &dyn ImageModel)>,
        sink: &dyn LogSink,
        mut checkpoint: F,
    ) -> Result<(), WorkflowError>
    where
        M: TextModel,
        F: FnMut(&WorkflowSession),
    {
        if self.stage != WorkflowStage::OutlineReady {
            return Err(WorkflowError::InvalidStage {
                action: "generate the book",
                stage: self.stage,
            });
        }
        let (chapter_costs, remaining) = {
            let outline = self.outline_checked("generate the book")?;
            let costs: Vec<u64> = outline
                .chapters
                .iter()
                .map(|chapter| self.ledger.chapter_cost(chapter))
                .collect();
            let remaining: u64 = outline
                .chapters
                .iter()
                .zip(&costs)
                .filter(|(chapter, _)| !chapter.generated)
                .map(|(_, cost)| *cost)
                .sum();
            (costs, remaining)
        };
        self.ensure_affordable(remaining)?;

        for index in 0..chapter_costs.len() {
            let already = self
                .outline
                .as_ref()
                .map(|outline| outline.chapters[index].generated)
                .unwrap_or(false);
            if already {
                continue;
            }

            self.stage = WorkflowStage::ChapterPending(index);
            let outline = self.outline.as_ref().ok_or(WorkflowError::InvalidStage {
                action: "generate the book",
                stage: self.stage,
            })?;
            match writer.write(model, &self.project, outline, index) {
                Ok(text) => {
                    self.ledger.charge(chapter_costs[index])?;
                    self.texts[index] = Some(text);
                    if let Some(outline) = self.outline.as_mut() {
                        outline.chapters[index].generated = true;
                    }
                    checkpoint(self);
                }
                Err(error) => {
                    self.last_error = Some(error.to_string());
                    self.stage = WorkflowStage::Error;
                    checkpoint(self);
                    return Err(error.into());
                }
            }
        }

        self.stage = WorkflowStage::ManuscriptAssembling;
        // Assembly is a pure join; the manuscript is derived on demand from
        // the chapter texts, so there is nothing to store here.

        if self.cover.is_none() {
            if let Some((artist, image_model)) = cover {
                self.stage = WorkflowStage::CoverPending;
                self.render_cover_soft(artist, image_model, sink);
                checkpoint(self);
            }
        }

        self.stage = WorkflowStage::Completed;
        self.last_error = None;
        checkpoint(self);
        Ok(())
    }

    // ---- cover ------------------------------------------------------------

    /// Renders the cover on explicit request. Unlike the bulk run this
    /// propagates failures, but a failed cover never poisons the stage.
    pub fn render_cover<M: ImageModel + ?Sized>(
        &mut self,
        artist: &CoverArtist<'_>,
        model: &M,
    ) -> Result<(), WorkflowError> {
        let stage = self.stage;
        if !matches!(stage, WorkflowStage::OutlineReady | WorkflowStage::Completed) {
            return Err(WorkflowError::InvalidStage {
                action: "render the cover",
                stage,
            });
        }
        let prompt = self.outline_checked("render the cover")?.cover_prompt.clone();
        let cost = self.ledger.cover_cost();
        self.ensure_affordable(cost)?;

        self.stage = WorkflowStage::CoverPending;
        let result = artist.render(model, &prompt);
        self.stage = stage;

        let image = result?;
        self.ledger.charge(cost)?;
        self.cover = Some(image);
        Ok(())
    }

    /// Replaces the cover with user-supplied artwork. Free of charge.
    pub fn upload_cover(&mut self, bytes: &[u8]) {
        self.cover = Some(CoverImage::uploaded(bytes));
    }

    fn render_cover_soft(
        &mut self,
        artist: &CoverArtist<'_>,
        model: &dyn ImageModel,
        sink: &dyn LogSink,
    ) {
        let Some(prompt) = self.outline.as_ref().map(|o| o.cover_prompt.clone()) else {
            return;
        };
        let cost = self.ledger.cover_cost();
        if !self.ledger.can_afford(cost) {
            sink.log(LogRecord::warn(format!(
                "skipping cover: it costs {cost} credits but only {} are available",
                self.ledger.balance()
            )));
            return;
        }
        match artist.render(model, &prompt) {
            Ok(image) => {
                if self.ledger.charge(cost).is_ok() {
                    self.cover = Some(image);
                }
            }
            Err(error) => {
                sink.log(LogRecord::new(
                    LogLevel::Warn,
                    format!("cover rendering failed, continuing without one: {error}"),
                ));
            }
        }
    }

    // ---- outline edits ----------------------------------------------------

    pub fn set_outline_title(&mut self, title: impl Into<String>) -> Result<(), WorkflowError> {
        let outline = self.editable_outline("rename the book")?;
        outline.title = title.into();
        Ok(())
    }

    pub fn add_chapter(&mut self, chapter: OutlineChapter) -> Result<(), WorkflowError> {
        self.editable_outline("add a chapter")?.push_chapter(chapter);
        self.texts.push(None);
        self.in_flight.push(false);
        Ok(())
    }

    /// Removes a chapter along with any text already generated for it. The
    /// credits spent on that text are not refunded.
    pub fn remove_chapter(&mut self, index: usize) -> Result<OutlineChapter, WorkflowError> {
        self.check_chapter_index("remove a chapter", index)?;
        let outline = self.editable_outline("remove a chapter")?;
        let removed = outline.chapters.remove(index);
        self.texts.remove(index);
        self.in_flight.remove(index);
        Ok(removed)
    }

    /// Moves a chapter to a new position, carrying its generated text with it
    /// so the manuscript order follows the outline order.
    pub fn move_chapter(&mut self, from: usize, to: usize) -> Result<(), WorkflowError> {
        self.check_chapter_index("move a chapter", from)?;
        self.check_chapter_index("move a chapter", to)?;
        let outline = self.editable_outline("move a chapter")?;
        let chapter = outline.chapters.remove(from);
        outline.chapters.insert(to, chapter);
        let text = self.texts.remove(from);
        self.texts.insert(to, text);
        let flag = self.in_flight.remove(from);
        self.in_flight.insert(to, flag);
        Ok(())
    }

    /// Edits a chapter stub. Existing generated text is kept; rewrite the
    /// chapter to regenerate it against the new description.
    pub fn update_chapter(
        &mut self,
        index: usize,
        title: Option<String>,
        description: Option<String>,
        estimated_pages: Option<u32>,
    ) -> Result<(), WorkflowError> {
        self.check_chapter_index("edit a chapter", index)?;
        let outline = self.editable_outline("edit a chapter")?;
        let chapter = &mut outline.chapters[index];
        if let Some(title) = title {
            chapter.title = title;
        }
        if let Some(description) = description {
            chapter.description = description;
        }
        if let Some(pages) = estimated_pages {
            chapter.estimated_pages = pages.max(1);
        }
        Ok(())
    }

    // ---- lifecycle --------------------------------------------------------

    /// Clears a stuck or errored stage without touching generated content.
    pub fn recover(&mut self) {
        if self.stage.is_pending() || self.stage == WorkflowStage::Error {
            self.stage = if self.outline.is_some() {
                WorkflowStage::OutlineReady
            } else {
                WorkflowStage::Idle
            };
            for flag in &mut self.in_flight {
                *flag = false;
            }
        }
    }

    /// Reopens a completed book for further edits and rewrites.
    pub fn reopen_outline(&mut self) -> Result<(), WorkflowError> {
        if self.stage != WorkflowStage::Completed {
            return Err(WorkflowError::InvalidStage {
                action: "reopen the book",
                stage: self.stage,
            });
        }
        self.stage = WorkflowStage::OutlineReady;
        Ok(())
    }

    /// Discards the outline, texts and cover, keeping project settings and
    /// the credit balance.
    pub fn reset(&mut self) {
        self.stage = WorkflowStage::Idle;
        self.outline = None;
        self.texts.clear();
        self.cover = None;
        self.in_flight.clear();
        self.last_error = None;
    }

    // ---- helpers ----------------------------------------------------------

    fn ensure_affordable(&self, cost: u64) -> Result<(), WorkflowError> {
        if self.ledger.can_afford(cost) {
            Ok(())
        } else {
            Err(WorkflowError::InsufficientBalance {
                required: cost,
                available: self.ledger.balance(),
            })
        }
    }

    fn outline_checked(&self, action: &'static str) -> Result<&Outline, WorkflowError> {
        self.outline.as_ref().ok_or(WorkflowError::InvalidStage {
            action,
            stage: self.stage,
        })
    }

    fn editable_outline(&mut self, action: &'static str) -> Result<&mut Outline, WorkflowError> {
        if self.stage != WorkflowStage::OutlineReady {
            return Err(WorkflowError::InvalidStage {
                action,
                stage: self.stage,
            });
        }
        let stage = self.stage;
        self.outline
            .as_mut()
            .ok_or(WorkflowError::InvalidStage { action, stage })
    }

    fn check_chapter_index(&self, action: &'static str, index: usize) -> Result<(), WorkflowError> {
        let outline = self.outline_checked(action)?;
        if index >= outline.len() {
            return Err(WorkflowError::ChapterIndex {
                index,
                len: outline.len(),
            });
        }
        if self.in_flight.get(index).copied().unwrap_or(false) {
            return Err(WorkflowError::ChapterBusy { index });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Pricing;

    fn ready_session() -> WorkflowSession {
        let mut outline = Outline::new("Book", "cover art");
        outline.push_chapter(OutlineChapter::new("One", "first", 2));
        outline.push_chapter(OutlineChapter::new("Two", "second", 3));
        WorkflowSession::restore(
            Project::new("topic"),
            CreditLedger::new(10_000, Pricing::default()),
            Some(outline),
            vec![Some("## One".to_string()), None],
            None,
            WorkflowStage::OutlineReady,
        )
    }

    #[test]
    fn restore_normalizes_pending_stages() {
        let session = WorkflowSession::restore(
            Project::new("topic"),
            CreditLedger::new(0, Pricing::default()),
            Some(Outline::new("Book", "c")),
            Vec::new(),
            None,
            WorkflowStage::ChapterPending(3),
        );
        assert_eq!(session.stage(), WorkflowStage::OutlineReady);

        let session = WorkflowSession::restore(
            Project::new("topic"),
            CreditLedger::new(0, Pricing::default()),
            None,
            Vec::new(),
            None,
            WorkflowStage::OutlinePending,
        );
        assert_eq!(session.stage(), WorkflowStage::Idle);
    }

    #[test]
    fn moving_a_chapter_carries_its_text() {
        let mut session = ready_session();
        session.move_chapter(0, 1).unwrap();
        assert_eq!(session.outline().unwrap().chapters[1].title, "One");
        assert_eq!(session.chapter_text(1), Some("## One"));
        assert_eq!(session.chapter_text(0), None);
    }

    #[test]
    fn removing_a_chapter_keeps_texts_aligned() {
        let mut session = ready_session();
        session.remove_chapter(0).unwrap();
        assert_eq!(session.outline().unwrap().len(), 1);
        assert_eq!(session.chapter_texts().len(), 1);
        assert_eq!(session.chapter_text(0), None);
    }

    #[test]
    fn edits_are_blocked_outside_outline_ready() {
        let mut session = WorkflowSession::new(
            Project::new("topic"),
            CreditLedger::new(0, Pricing::default()),
        );
        assert!(matches!(
            session.set_outline_title("New"),
            Err(WorkflowError::InvalidStage { .. })
        ));
    }

    #[test]
    fn recover_returns_to_outline_ready() {
        let mut session = ready_session();
        session.stage = WorkflowStage::Error;
        session.recover();
        assert_eq!(session.stage(), WorkflowStage::OutlineReady);

        session.reset();
        session.stage = WorkflowStage::Error;
        session.recover();
        assert_eq!(session.stage(), WorkflowStage::Idle);
    }

    #[test]
    fn uploading_a_cover_is_free() {
        let mut session = ready_session();
        let before = session.ledger().balance();
        session.upload_cover(&[9, 9, 9]);
        assert!(session.cover().is_some());
        assert_eq!(session.ledger().balance(), before);
    }

    #[test]
    fn manuscript_joins_in_order() {
        let mut session = ready_session();
        session.texts[1] = Some("## Two".to_string());
        assert_eq!(session.manuscript(), "## One\n\n---\n\n## Two");
    }
}
