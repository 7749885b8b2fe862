use bookforge_adapters::{image_model_from_profile, text_model_from_profile, AdapterError};
use bookforge_core::config::{ConfigError, ConfigStore, ImageProfile, TextProfile};
use bookforge_core::export::{export_markdown, export_word, ExportError};
use bookforge_core::ledger::{find_pack, CreditLedger, CREDIT_PACKS};
use bookforge_core::library::{LibraryEntry, LibraryError, LibraryStore};
use bookforge_core::logging::StdoutLogSink;
use bookforge_core::outline::{OutlineChapter, OutlinePlanner};
use bookforge_core::project::{
    OutputLanguage, Project, ProjectError, TargetAudience, WritingStyle,
};
use bookforge_core::prompts::{PromptError, PromptRegistry};
use bookforge_core::workflow::{WorkflowError, WorkflowSession};
use bookforge_core::{ChapterWriter, CoverArtist};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Library(#[from] LibraryError),
    #[error(transparent)]
    Prompts(#[from] PromptError),
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("no book with id `{0}` in the library; run `bookforge project list`")]
    UnknownBook(String),
    #[error("{0}")]
    Usage(String),
}

#[derive(Parser)]
#[command(
    name = "bookforge",
    version,
    about = "Credit-metered AI book generation: outline, chapters, cover, export"
)]
struct Cli {
    /// Path to the config file; created on first use.
    #[arg(long, global = true, default_value = "bookforge.json")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage book projects in the library.
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Plan and edit a book's outline.
    #[command(subcommand)]
    Outline(OutlineCommand),
    /// Generate chapter manuscripts.
    #[command(subcommand)]
    Chapter(ChapterCommand),
    /// Render or upload cover artwork.
    #[command(subcommand)]
    Cover(CoverCommand),
    /// Inspect and top up the credit balance.
    #[command(subcommand)]
    Credits(CreditsCommand),
    /// Export the finished manuscript.
    #[command(subcommand)]
    Export(ExportCommand),
}

#[derive(Clone, Copy, ValueEnum)]
enum StyleArg {
    TechnicalManual,
    Tutorial,
    PracticalGuide,
    ReferenceManual,
}

impl From<StyleArg> for WritingStyle {
    fn from(value: StyleArg) -> Self {
        match value {
            StyleArg::TechnicalManual => Self::TechnicalManual,
            StyleArg::Tutorial => Self::Tutorial,
            StyleArg::PracticalGuide => Self::PracticalGuide,
            StyleArg::ReferenceManual => Self::ReferenceManual,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum AudienceArg {
    Novice,
    Intermediate,
    Expert,
}

impl From<AudienceArg> for TargetAudience {
    fn from(value: AudienceArg) -> Self {
        match value {
            AudienceArg::Novice => Self::Novice,
            AudienceArg::Intermediate => Self::Intermediate,
            AudienceArg::Expert => Self::Expert,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LanguageArg {
    English,
    Chinese,
}

impl From<LanguageArg> for OutputLanguage {
    fn from(value: LanguageArg) -> Self {
        match value {
            LanguageArg::English => Self::English,
            LanguageArg::Chinese => Self::Chinese,
        }
    }
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// Create a new book project and print its id.
    New {
        /// What the book should be about.
        description: String,
        #[arg(long, default_value_t = 8)]
        chapters: u32,
        #[arg(long, default_value = "Python")]
        code_language: String,
        #[arg(long, value_enum, default_value_t = StyleArg::TechnicalManual)]
        style: StyleArg,
        #[arg(long, value_enum, default_value_t = AudienceArg::Intermediate)]
        audience: AudienceArg,
        #[arg(long, value_enum, default_value_t = LanguageArg::English)]
        language: LanguageArg,
    },
    /// Show a project's settings and progress.
    Show { id: String },
    /// List all books in the library.
    List,
    /// Remove a book from the library.
    Delete { id: String },
    /// Attach a reference file to the project's background materials.
    AddMaterial { id: String, file: PathBuf },
    /// Attach a reference link.
    AddLink { id: String, url: String },
    /// Clear a stuck or errored stage without losing generated content.
    Recover { id: String },
}

#[derive(Subcommand)]
enum OutlineCommand {
    /// Plan the outline (charges the outline fee on success).
    Plan {
        id: String,
        #[arg(long)]
        interface: Option<String>,
    },
    /// Print the outline with per-chapter status and cost.
    Show { id: String },
    /// Rename the book.
    SetTitle { id: String, title: String },
    /// Append a chapter stub.
    AddChapter {
        id: String,
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value_t = 8)]
        pages: u32,
    },
    /// Remove a chapter (1-based position). Spent credits are not refunded.
    RemoveChapter { id: String, position: usize },
    /// Move a chapter to a new position (both 1-based).
    MoveChapter {
        id: String,
        from: usize,
        to: usize,
    },
    /// Edit a chapter stub (1-based position).
    EditChapter {
        id: String,
        position: usize,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        pages: Option<u32>,
    },
    /// Reopen a completed book for further edits and rewrites.
    Reopen { id: String },
}

#[derive(Subcommand)]
enum ChapterCommand {
    /// Write (or rewrite) one chapter (1-based position).
    Write {
        id: String,
        position: usize,
        #[arg(long)]
        interface: Option<String>,
    },
    /// Write every remaining chapter, then the cover.
    WriteAll {
        id: String,
        #[arg(long)]
        interface: Option<String>,
        #[arg(long)]
        image_interface: Option<String>,
        /// Skip cover rendering even when an image interface is configured.
        #[arg(long)]
        skip_cover: bool,
    },
}

#[derive(Subcommand)]
enum CoverCommand {
    /// Render the cover from the outline's cover prompt.
    Render {
        id: String,
        #[arg(long)]
        image_interface: Option<String>,
    },
    /// Use your own artwork instead (free).
    Upload { id: String, file: PathBuf },
}

#[derive(Subcommand)]
enum CreditsCommand {
    /// Show the current balance.
    Balance,
    /// List purchasable credit packs.
    Packs,
    /// Buy a credit pack (payment is simulated).
    TopUp { pack: String },
}

#[derive(Subcommand)]
enum ExportCommand {
    /// Export the manuscript as Markdown.
    Markdown { id: String, output: PathBuf },
    /// Export a Word-compatible document with the cover embedded.
    Word { id: String, output: PathBuf },
}

struct App {
    config: ConfigStore,
    library: LibraryStore,
    prompts: PromptRegistry,
    sink: StdoutLogSink,
}

impl App {
    fn open(config_path: &PathBuf) -> Result<Self, CliError> {
        let mut config = ConfigStore::open(config_path)?;
        if config.config_mut().ensure_recent_defaults() {
            config.save()?;
        }
        let library_path = config.config().resolve_library_path(config.path());
        let library = LibraryStore::open(library_path)?;
        let prompts =
            PromptRegistry::with_custom_directories(config.config().prompt_directories.clone())?;
        Ok(Self {
            config,
            library,
            prompts,
            sink: StdoutLogSink::new(),
        })
    }

    fn ledger(&self) -> CreditLedger {
        CreditLedger::new(self.config.config().balance, self.config.config().pricing)
    }

    fn session(&self, id: &str) -> Result<WorkflowSession, CliError> {
        let entry = self
            .library
            .get(id)
            .cloned()
            .ok_or_else(|| CliError::UnknownBook(id.to_string()))?;
        Ok(entry.into_session(self.ledger()))
    }

    /// Writes the session back to the library and the balance back to the
    /// config; the balance is account-wide, not per book.
    fn persist(&mut self, id: &str, session: &WorkflowSession) -> Result<(), CliError> {
        self.config.config_mut().balance = session.ledger().balance();
        self.config.save()?;
        self.library
            .upsert(LibraryEntry::from_session(id, session))?;
        Ok(())
    }

    fn text_profile(&self, name: Option<&str>) -> Result<&TextProfile, CliError> {
        let config = self.config.config();
        let name = name
            .map(str::to_string)
            .or_else(|| config.recent.last_text_interface.clone())
            .ok_or_else(|| {
                CliError::Usage(
                    "no text interface configured; add one under `text_interfaces` in the config file"
                        .to_string(),
                )
            })?;
        config.text_interfaces.get(&name).ok_or_else(|| {
            CliError::Usage(format!("text interface `{name}` is not in the config file"))
        })
    }

    fn image_profile(&self, name: Option<&str>) -> Result<Option<&ImageProfile>, CliError> {
        let config = self.config.config();
        let Some(name) = name
            .map(str::to_string)
            .or_else(|| config.recent.last_image_interface.clone())
        else {
            return Ok(None);
        };
        config
            .image_interfaces
            .get(&name)
            .map(Some)
            .ok_or_else(|| {
                CliError::Usage(format!(
                    "image interface `{name}` is not in the config file"
                ))
            })
    }

    fn remember_interfaces(
        &mut self,
        text: Option<&str>,
        image: Option<&str>,
    ) -> Result<(), CliError> {
        let mut changed = false;
        if let Some(name) = text {
            self.config.config_mut().recent.last_text_interface = Some(name.to_string());
            changed = true;
        }
        if let Some(name) = image {
            self.config.config_mut().recent.last_image_interface = Some(name.to_string());
            changed = true;
        }
        if changed {
            self.config.save()?;
        }
        Ok(())
    }
}

fn to_index(position: usize) -> Result<usize, CliError> {
    position
        .checked_sub(1)
        .ok_or_else(|| CliError::Usage("chapter positions start at 1".to_string()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            let mut source = std::error::Error::source(&error);
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut app = App::open(&cli.config)?;
    match cli.command {
        Command::Project(command) => handle_project(&mut app, command),
        Command::Outline(command) => handle_outline(&mut app, command),
        Command::Chapter(command) => handle_chapter(&mut app, command),
        Command::Cover(command) => handle_cover(&mut app, command),
        Command::Credits(command) => handle_credits(&mut app, command),
        Command::Export(command) => handle_export(&app, command),
    }
}

fn handle_project(app: &mut App, command: ProjectCommand) -> Result<(), CliError> {
    match command {
        ProjectCommand::New {
            description,
            chapters,
            code_language,
            style,
            audience,
            language,
        } => {
            let mut project = Project::new(description);
            project.chapter_count = chapters;
            project.code_language = code_language;
            project.writing_style = style.into();
            project.target_audience = audience.into();
            project.output_language = language.into();
            project.validate()?;

            let id = LibraryEntry::new_id();
            let session = WorkflowSession::new(project, app.ledger());
            app.persist(&id, &session)?;
            println!("created book {id}");
        }
        ProjectCommand::Show { id } => {
            let session = app.session(&id)?;
            let project = &session.project;
            println!("id:        {id}");
            println!("stage:     {}", session.stage());
            println!("topic:     {}", project.description);
            println!("audience:  {}", project.target_audience);
            println!("style:     {}", project.writing_style);
            println!("code:      {}", project.code_language);
            println!("chapters:  {} planned", project.chapter_count);
            if !project.reference_links.is_empty() {
                println!("links:     {}", project.reference_links_joined());
            }
            if let Some(outline) = session.outline() {
                println!(
                    "outline:   `{}` ({}/{} chapters generated)",
                    outline.title,
                    outline.generated_count(),
                    outline.len()
                );
            }
            if let Some(error) = session.last_error() {
                println!("last error: {error}");
            }
        }
        ProjectCommand::List => {
            let entries = app.library.list();
            if entries.is_empty() {
                println!("the library is empty; run `bookforge project new`");
            }
            for entry in entries {
                println!(
                    "{}  {:<24}  {}  ({})",
                    entry.id,
                    entry.title(),
                    entry.stage,
                    entry.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        ProjectCommand::Delete { id } => {
            app.library.remove(&id)?;
            println!("deleted book {id}");
        }
        ProjectCommand::AddMaterial { id, file } => {
            let mut session = app.session(&id)?;
            session.project.append_material_file(&file)?;
            app.persist(&id, &session)?;
            println!("attached {}", file.display());
        }
        ProjectCommand::AddLink { id, url } => {
            let mut session = app.session(&id)?;
            session.project.add_reference_link(url);
            app.persist(&id, &session)?;
            println!("link added");
        }
        ProjectCommand::Recover { id } => {
            let mut session = app.session(&id)?;
            session.recover();
            app.persist(&id, &session)?;
            println!("book {id} is now in the `{}` stage", session.stage());
        }
    }
    Ok(())
}

fn handle_outline(app: &mut App, command: OutlineCommand) -> Result<(), CliError> {
    match command {
        OutlineCommand::Plan { id, interface } => {
            let mut session = app.session(&id)?;
            let model = text_model_from_profile(app.text_profile(interface.as_deref())?)?;
            let planner = OutlinePlanner::new(&app.prompts, &app.sink);

            let result = session.plan_outline(&planner, &model);
            app.persist(&id, &session)?;
            app.remember_interfaces(interface.as_deref(), None)?;
            result?;

            let outline = session.outline().ok_or_else(|| {
                CliError::Usage("outline planning finished without an outline".to_string())
            })?;
            println!("planned `{}` with {} chapters", outline.title, outline.len());
            println!("balance: {} credits", session.ledger().balance());
        }
        OutlineCommand::Show { id } => {
            let session = app.session(&id)?;
            let Some(outline) = session.outline() else {
                println!("no outline yet; run `bookforge outline plan {id}`");
                return Ok(());
            };
            println!("{} ({})", outline.title, session.stage());
            for (i, chapter) in outline.chapters.iter().enumerate() {
                let mark = if chapter.generated { "x" } else { " " };
                println!(
                    "  [{mark}] {:>2}. {} (~{} pages, {} credits)",
                    i + 1,
                    chapter.title,
                    chapter.estimated_pages,
                    session.ledger().chapter_cost(chapter)
                );
            }
            println!("cover prompt: {}", outline.cover_prompt);
            println!(
                "remaining cost: {} credits, balance: {}",
                session.ledger().remaining_cost(outline),
                session.ledger().balance()
            );
        }
        OutlineCommand::SetTitle { id, title } => {
            let mut session = app.session(&id)?;
            session.set_outline_title(title)?;
            app.persist(&id, &session)?;
            println!("title updated");
        }
        OutlineCommand::AddChapter {
            id,
            title,
            description,
            pages,
        } => {
            let mut session = app.session(&id)?;
            session.add_chapter(OutlineChapter::new(title, description, pages))?;
            app.persist(&id, &session)?;
            println!(
                "chapter added; the outline now has {} chapters",
                session.outline().map(|o| o.len()).unwrap_or(0)
            );
        }
        OutlineCommand::RemoveChapter { id, position } => {
            let mut session = app.session(&id)?;
            let removed = session.remove_chapter(to_index(position)?)?;
            app.persist(&id, &session)?;
            println!("removed chapter `{}`", removed.title);
        }
        OutlineCommand::MoveChapter { id, from, to } => {
            let mut session = app.session(&id)?;
            session.move_chapter(to_index(from)?, to_index(to)?)?;
            app.persist(&id, &session)?;
            println!("chapter moved");
        }
        OutlineCommand::EditChapter {
            id,
            position,
            title,
            description,
            pages,
        } => {
            let mut session = app.session(&id)?;
            session.update_chapter(to_index(position)?, title, description, pages)?;
            app.persist(&id, &session)?;
            println!("chapter updated");
        }
        OutlineCommand::Reopen { id } => {
            let mut session = app.session(&id)?;
            session.reopen_outline()?;
            app.persist(&id, &session)?;
            println!("book {id} reopened for edits");
        }
    }
    Ok(())
}

fn handle_chapter(app: &mut App, command: ChapterCommand) -> Result<(), CliError> {
    match command {
        ChapterCommand::Write {
            id,
            position,
            interface,
        } => {
            let index = to_index(position)?;
            let mut session = app.session(&id)?;
            let model = text_model_from_profile(app.text_profile(interface.as_deref())?)?;
            let writer = ChapterWriter::new(&app.prompts, &app.sink);

            let result = session.write_chapter(&writer, &model, index);
            app.persist(&id, &session)?;
            app.remember_interfaces(interface.as_deref(), None)?;
            result?;
            println!(
                "chapter {position} written; balance: {} credits",
                session.ledger().balance()
            );
        }
        ChapterCommand::WriteAll {
            id,
            interface,
            image_interface,
            skip_cover,
        } => {
            let mut session = app.session(&id)?;
            let model = text_model_from_profile(app.text_profile(interface.as_deref())?)?;
            let image_model = if skip_cover {
                None
            } else {
                match app.image_profile(image_interface.as_deref())? {
                    Some(profile) => Some(image_model_from_profile(profile)?),
                    None => {
                        println!("no image interface configured; the cover will be skipped");
                        None
                    }
                }
            };

            let writer = ChapterWriter::new(&app.prompts, &app.sink);
            let artist = CoverArtist::new(&app.prompts, &app.sink);
            let cover = image_model
                .as_deref()
                .map(|image_model| (&artist, image_model));

            // Each checkpoint lands on disk, so a crash mid-run loses at most
            // the chapter in flight.
            let (config, library) = (&mut app.config, &mut app.library);
            let checkpoint = |session: &WorkflowSession| {
                config.config_mut().balance = session.ledger().balance();
                if let Err(error) = config.save() {
                    eprintln!("warning: failed to save balance: {error}");
                }
                if let Err(error) = library.upsert(LibraryEntry::from_session(id.as_str(), session)) {
                    eprintln!("warning: failed to save progress: {error}");
                }
            };

            let result = session.generate_remaining(&writer, &model, cover, &app.sink, checkpoint);
            app.persist(&id, &session)?;
            app.remember_interfaces(interface.as_deref(), image_interface.as_deref())?;
            result?;
            println!(
                "book `{}` completed; balance: {} credits",
                session.outline().map(|o| o.title.as_str()).unwrap_or(""),
                session.ledger().balance()
            );
        }
    }
    Ok(())
}

fn handle_cover(app: &mut App, command: CoverCommand) -> Result<(), CliError> {
    match command {
        CoverCommand::Render {
            id,
            image_interface,
        } => {
            let mut session = app.session(&id)?;
            let profile = app
                .image_profile(image_interface.as_deref())?
                .ok_or_else(|| {
                    CliError::Usage(
                        "no image interface configured; add one under `image_interfaces` in the config file"
                            .to_string(),
                    )
                })?;
            let model = image_model_from_profile(profile)?;
            let artist = CoverArtist::new(&app.prompts, &app.sink);

            let result = session.render_cover(&artist, model.as_ref());
            app.persist(&id, &session)?;
            app.remember_interfaces(None, image_interface.as_deref())?;
            result?;
            println!(
                "cover rendered; balance: {} credits",
                session.ledger().balance()
            );
        }
        CoverCommand::Upload { id, file } => {
            let mut session = app.session(&id)?;
            let bytes = std::fs::read(&file).map_err(|source| {
                CliError::Usage(format!("cannot read `{}`: {source}", file.display()))
            })?;
            session.upload_cover(&bytes);
            app.persist(&id, &session)?;
            println!("cover replaced with {}", file.display());
        }
    }
    Ok(())
}

fn handle_credits(app: &mut App, command: CreditsCommand) -> Result<(), CliError> {
    match command {
        CreditsCommand::Balance => {
            println!("{} credits", app.config.config().balance);
        }
        CreditsCommand::Packs => {
            for pack in &CREDIT_PACKS {
                let marker = if pack.popular { " (most popular)" } else { "" };
                println!(
                    "{:<10} {:>10} credits  {:>7}{marker}",
                    pack.id, pack.credits, pack.price
                );
                println!("           {}", pack.description);
            }
        }
        CreditsCommand::TopUp { pack } => {
            let pack = find_pack(&pack).ok_or_else(|| {
                CliError::Usage(format!(
                    "unknown pack `{pack}`; run `bookforge credits packs`"
                ))
            })?;
            // Stand-in for a payment provider round trip.
            println!("processing payment for the {} pack...", pack.name);
            std::thread::sleep(Duration::from_millis(1500));

            let config = app.config.config_mut();
            config.balance = config.balance.saturating_add(pack.credits);
            app.config.save()?;
            println!(
                "added {} credits; new balance: {}",
                pack.credits,
                app.config.config().balance
            );
        }
    }
    Ok(())
}

fn handle_export(app: &App, command: ExportCommand) -> Result<(), CliError> {
    match command {
        ExportCommand::Markdown { id, output } => {
            let session = app.session(&id)?;
            let title = session
                .outline()
                .map(|outline| outline.title.clone())
                .unwrap_or_else(|| "(untitled)".to_string());
            export_markdown(&title, &session.manuscript(), &output)?;
            println!("wrote {}", output.display());
        }
        ExportCommand::Word { id, output } => {
            let session = app.session(&id)?;
            let title = session
                .outline()
                .map(|outline| outline.title.clone())
                .unwrap_or_else(|| "(untitled)".to_string());
            export_word(&title, &session.manuscript(), session.cover(), &output)?;
            println!("wrote {}", output.display());
        }
    }
    Ok(())
}
