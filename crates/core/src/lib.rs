//! Core domain of the book generator: project settings, outline planning,
//! chapter writing, cover rendering, the credit ledger that meters it all,
//! and the workflow state machine tying the pieces together. Backends are
//! abstracted behind the [`generation::TextModel`] and
//! [`generation::ImageModel`] traits; HTTP adapters live in a separate crate.

pub mod chapter;
pub mod config;
pub mod cover;
pub mod export;
pub mod generation;
pub mod ledger;
pub mod library;
pub mod logging;
pub mod outline;
pub mod project;
pub mod prompts;
pub mod workflow;

pub use chapter::{assemble_manuscript, ChapterWriter, MANUSCRIPT_SEPARATOR};
pub use config::{Config, ConfigError, ConfigStore, ImageProfile, InterfaceFormat, TextProfile};
pub use cover::{CoverArtist, CoverImage, CoverSource};
pub use export::{export_markdown, export_word, ExportError};
pub use generation::{GenerationError, GenerationKind, ImageModel, ModelError, TextModel};
pub use ledger::{find_pack, CreditLedger, CreditPack, LedgerError, Pricing, CREDIT_PACKS, STARTING_BALANCE};
pub use library::{LibraryEntry, LibraryError, LibraryStore};
pub use logging::{LogLevel, LogRecord, LogSink, NullLogSink, SharedLogSink, StdoutLogSink, VecLogSink};
pub use outline::{Outline, OutlineChapter, OutlinePlanner};
pub use project::{OutputLanguage, Project, ProjectError, TargetAudience, WritingStyle};
pub use prompts::{PromptError, PromptRegistry, PromptTemplate};
pub use workflow::{WorkflowError, WorkflowSession, WorkflowStage};
