use bookforge_core::generation::{ImageModel, ModelError, TextModel};
use bookforge_core::ledger::{CreditLedger, Pricing};
use bookforge_core::logging::{LogLevel, VecLogSink};
use bookforge_core::outline::OutlinePlanner;
use bookforge_core::project::Project;
use bookforge_core::prompts::PromptRegistry;
use bookforge_core::workflow::{WorkflowError, WorkflowSession, WorkflowStage};
use bookforge_core::{ChapterWriter, CoverArtist};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Text backend that replays queued responses in order.
struct QueueTextModel {
    responses: Mutex<VecDeque<Result<String, String>>>,
}

impl QueueTextModel {
    fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
        }
    }

    fn push_ok(&self, response: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(response.to_string()));
    }

    fn push_err(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    fn assert_empty(&self) {
        assert!(
            self.responses.lock().unwrap().is_empty(),
            "queued responses were not all consumed"
        );
    }
}

impl TextModel for QueueTextModel {
    fn invoke(&self, _prompt: &str) -> Result<String, ModelError> {
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(ModelError::message(message)),
            None => panic!("text model invoked with no queued response"),
        }
    }
}

struct QueueImageModel {
    responses: Mutex<VecDeque<Result<Vec<u8>, String>>>,
}

impl QueueImageModel {
    fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
        }
    }

    fn push_ok(&self, bytes: &[u8]) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(bytes.to_vec()));
    }

    fn push_err(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }
}

impl ImageModel for QueueImageModel {
    fn render(&self, _prompt: &str) -> Result<Vec<u8>, ModelError> {
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(bytes)) => Ok(bytes),
            Some(Err(message)) => Err(ModelError::message(message)),
            None => panic!("image model invoked with no queued response"),
        }
    }
}

const OUTLINE_JSON: &str = r#"{
  "title": "Practical Observability",
  "chapters": [
    {"title": "Signals", "description": "logs, metrics, traces", "estimated_pages": 3},
    {"title": "Pipelines", "description": "collection and routing", "estimated_pages": 5}
  ],
  "cover_prompt": "a telescope over a city"
}"#;

fn pricing() -> Pricing {
    Pricing {
        outline_cost: 500,
        credits_per_page: 100,
        cover_cost: 250,
    }
}

fn session_with_balance(balance: u64) -> WorkflowSession {
    WorkflowSession::new(
        Project::new("an observability handbook"),
        CreditLedger::new(balance, pricing()),
    )
}

#[test]
fn outline_fee_is_charged_only_on_success() {
    let prompts = PromptRegistry::new().unwrap();
    let sink = VecLogSink::new();
    let planner = OutlinePlanner::new(&prompts, &sink);
    let model = QueueTextModel::new();
    model.push_err("backend unreachable");

    let mut session = session_with_balance(10_000);
    let err = session.plan_outline(&planner, &model).unwrap_err();
    assert!(matches!(err, WorkflowError::Generation(_)));
    assert_eq!(session.ledger().balance(), 10_000);
    assert_eq!(session.stage(), WorkflowStage::Error);
    assert!(session.last_error().is_some());

    // A successful retry after recovery charges exactly once.
    session.recover();
    model.push_ok(OUTLINE_JSON);
    session.plan_outline(&planner, &model).unwrap();
    assert_eq!(session.ledger().balance(), 9_500);
    assert_eq!(session.stage(), WorkflowStage::OutlineReady);
    model.assert_empty();
}

#[test]
fn empty_description_blocks_planning_without_charging() {
    let prompts = PromptRegistry::new().unwrap();
    let sink = VecLogSink::new();
    let planner = OutlinePlanner::new(&prompts, &sink);
    let model = QueueTextModel::new();

    let mut session = WorkflowSession::new(
        Project::new("   "),
        CreditLedger::new(10_000, pricing()),
    );
    let err = session.plan_outline(&planner, &model).unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));
    assert_eq!(session.ledger().balance(), 10_000);
    assert_eq!(session.stage(), WorkflowStage::Idle);
    model.assert_empty();
}

#[test]
fn exact_outline_budget_leaves_chapters_blocked() {
    let prompts = PromptRegistry::new().unwrap();
    let sink = VecLogSink::new();
    let planner = OutlinePlanner::new(&prompts, &sink);
    let writer = ChapterWriter::new(&prompts, &sink);
    let model = QueueTextModel::new();
    model.push_ok(OUTLINE_JSON);

    let mut session = session_with_balance(500);
    session.plan_outline(&planner, &model).unwrap();
    assert_eq!(session.ledger().balance(), 0);

    let err = session.write_chapter(&writer, &model, 0).unwrap_err();
    assert!(matches!(err, WorkflowError::InsufficientBalance { .. }));
    assert_eq!(session.ledger().balance(), 0);
    model.assert_empty();
}

#[test]
fn unaffordable_outline_is_blocked_before_any_call() {
    let prompts = PromptRegistry::new().unwrap();
    let sink = VecLogSink::new();
    let planner = OutlinePlanner::new(&prompts, &sink);
    let model = QueueTextModel::new();

    let mut session = session_with_balance(300);
    let err = session.plan_outline(&planner, &model).unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::InsufficientBalance {
            required: 500,
            available: 300
        }
    ));
    assert_eq!(session.stage(), WorkflowStage::Idle);
    model.assert_empty();
}

#[test]
fn chapters_charge_by_estimated_pages_and_join_in_order() {
    let prompts = PromptRegistry::new().unwrap();
    let sink = VecLogSink::new();
    let planner = OutlinePlanner::new(&prompts, &sink);
    let writer = ChapterWriter::new(&prompts, &sink);
    let model = QueueTextModel::new();
    model.push_ok(OUTLINE_JSON);

    let mut session = session_with_balance(10_000);
    session.plan_outline(&planner, &model).unwrap();
    assert_eq!(session.ledger().balance(), 9_500);

    // Second chapter first, then the first: 5 pages * 100, then 3 * 100.
    model.push_ok("## Pipelines\n\nRouting.");
    session.write_chapter(&writer, &model, 1).unwrap();
    assert_eq!(session.ledger().balance(), 9_000);
    // Only index 1 changed.
    assert_eq!(session.chapter_text(0), None);
    assert!(!session.outline().unwrap().chapters[0].generated);

    model.push_ok("## Signals\n\nThree pillars.");
    session.write_chapter(&writer, &model, 0).unwrap();
    assert_eq!(session.ledger().balance(), 8_700);

    // Manuscript order follows outline order, not generation order.
    assert_eq!(
        session.manuscript(),
        "## Signals\n\nThree pillars.\n\n---\n\n## Pipelines\n\nRouting."
    );
    model.assert_empty();
}

#[test]
fn rewriting_a_chapter_charges_the_full_cost_again() {
    let prompts = PromptRegistry::new().unwrap();
    let sink = VecLogSink::new();
    let planner = OutlinePlanner::new(&prompts, &sink);
    let writer = ChapterWriter::new(&prompts, &sink);
    let model = QueueTextModel::new();
    model.push_ok(OUTLINE_JSON);

    let mut session = session_with_balance(10_000);
    session.plan_outline(&planner, &model).unwrap();

    model.push_ok("first draft");
    session.write_chapter(&writer, &model, 0).unwrap();
    assert_eq!(session.ledger().balance(), 9_200);

    model.push_ok("second draft");
    session.write_chapter(&writer, &model, 0).unwrap();
    assert_eq!(session.ledger().balance(), 8_900);
    assert_eq!(session.chapter_text(0), Some("second draft"));
    model.assert_empty();
}

#[test]
fn chapter_failure_returns_to_outline_ready_without_charging() {
    let prompts = PromptRegistry::new().unwrap();
    let sink = VecLogSink::new();
    let planner = OutlinePlanner::new(&prompts, &sink);
    let writer = ChapterWriter::new(&prompts, &sink);
    let model = QueueTextModel::new();
    model.push_ok(OUTLINE_JSON);

    let mut session = session_with_balance(10_000);
    session.plan_outline(&planner, &model).unwrap();

    model.push_err("rate limited");
    let err = session.write_chapter(&writer, &model, 0).unwrap_err();
    assert!(matches!(err, WorkflowError::Generation(_)));
    assert_eq!(session.stage(), WorkflowStage::OutlineReady);
    assert_eq!(session.ledger().balance(), 9_500);
    assert!(session.outline().is_some());
    assert_eq!(session.chapter_text(0), None);
    model.assert_empty();
}

#[test]
fn bulk_run_generates_everything_and_renders_the_cover() {
    let prompts = PromptRegistry::new().unwrap();
    let sink = VecLogSink::new();
    let planner = OutlinePlanner::new(&prompts, &sink);
    let writer = ChapterWriter::new(&prompts, &sink);
    let artist = CoverArtist::new(&prompts, &sink);
    let model = QueueTextModel::new();
    let image_model = QueueImageModel::new();

    model.push_ok(OUTLINE_JSON);
    model.push_ok("## Signals");
    model.push_ok("## Pipelines");
    image_model.push_ok(&[0x89, 0x50, 0x4e, 0x47]);

    let mut session = session_with_balance(10_000);
    session.plan_outline(&planner, &model).unwrap();

    let mut checkpoints = 0;
    session
        .generate_remaining(
            &writer,
            &model,
            Some((&artist, &image_model)),
            &sink,
            |_session| checkpoints += 1,
        )
        .unwrap();

    assert_eq!(session.stage(), WorkflowStage::Completed);
    // outline 500 + 300 + 500 chapters + 250 cover
    assert_eq!(session.ledger().balance(), 8_450);
    assert!(session.cover().is_some());
    assert!(session.outline().unwrap().all_generated());
    // Two chapter checkpoints, one after the cover, one at completion.
    assert_eq!(checkpoints, 4);
    model.assert_empty();
}

#[test]
fn bulk_preflight_covers_chapters_and_skips_unaffordable_cover() {
    let prompts = PromptRegistry::new().unwrap();
    let sink = VecLogSink::new();
    let planner = OutlinePlanner::new(&prompts, &sink);
    let writer = ChapterWriter::new(&prompts, &sink);
    let artist = CoverArtist::new(&prompts, &sink);
    let model = QueueTextModel::new();
    let image_model = QueueImageModel::new();

    model.push_ok(OUTLINE_JSON);
    model.push_ok("## Signals");
    model.push_ok("## Pipelines");

    // Exactly outline + chapters; nothing left over for the cover.
    let mut session = session_with_balance(1_300);
    session.plan_outline(&planner, &model).unwrap();
    session
        .generate_remaining(
            &writer,
            &model,
            Some((&artist, &image_model)),
            &sink,
            |_| {},
        )
        .unwrap();

    assert_eq!(session.stage(), WorkflowStage::Completed);
    assert_eq!(session.ledger().balance(), 0);
    assert!(session.cover().is_none());
    assert!(sink.contains_level(LogLevel::Warn));
    model.assert_empty();
}

#[test]
fn cover_failure_is_soft_during_bulk_runs() {
    let prompts = PromptRegistry::new().unwrap();
    let sink = VecLogSink::new();
    let planner = OutlinePlanner::new(&prompts, &sink);
    let writer = ChapterWriter::new(&prompts, &sink);
    let artist = CoverArtist::new(&prompts, &sink);
    let model = QueueTextModel::new();
    let image_model = QueueImageModel::new();

    model.push_ok(OUTLINE_JSON);
    model.push_ok("## Signals");
    model.push_ok("## Pipelines");
    image_model.push_err("image backend down");

    let mut session = session_with_balance(10_000);
    session.plan_outline(&planner, &model).unwrap();
    session
        .generate_remaining(
            &writer,
            &model,
            Some((&artist, &image_model)),
            &sink,
            |_| {},
        )
        .unwrap();

    assert_eq!(session.stage(), WorkflowStage::Completed);
    assert!(session.cover().is_none());
    // The failed cover is not charged.
    assert_eq!(session.ledger().balance(), 8_700);
    assert!(sink.contains_level(LogLevel::Warn));
}

#[test]
fn bulk_failure_marks_the_session_errored_but_keeps_progress() {
    let prompts = PromptRegistry::new().unwrap();
    let sink = VecLogSink::new();
    let planner = OutlinePlanner::new(&prompts, &sink);
    let writer = ChapterWriter::new(&prompts, &sink);
    let model = QueueTextModel::new();

    model.push_ok(OUTLINE_JSON);
    model.push_ok("## Signals");
    model.push_err("backend gave up");

    let mut session = session_with_balance(10_000);
    session.plan_outline(&planner, &model).unwrap();
    let err = session
        .generate_remaining(&writer, &model, None, &sink, |_| {})
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Generation(_)));
    assert_eq!(session.stage(), WorkflowStage::Error);
    // The chapter that succeeded stays paid for and kept.
    assert_eq!(session.ledger().balance(), 9_200);
    assert_eq!(session.chapter_text(0), Some("## Signals"));

    // Recovery resumes from where the run stopped.
    session.recover();
    assert_eq!(session.stage(), WorkflowStage::OutlineReady);
    model.push_ok("## Pipelines");
    session
        .generate_remaining(&writer, &model, None, &sink, |_| {})
        .unwrap();
    assert_eq!(session.stage(), WorkflowStage::Completed);
    assert_eq!(session.ledger().balance(), 8_700);
    model.assert_empty();
}

#[test]
fn bulk_run_is_blocked_when_chapters_are_unaffordable() {
    let prompts = PromptRegistry::new().unwrap();
    let sink = VecLogSink::new();
    let planner = OutlinePlanner::new(&prompts, &sink);
    let writer = ChapterWriter::new(&prompts, &sink);
    let model = QueueTextModel::new();
    model.push_ok(OUTLINE_JSON);

    // Enough for the outline and the first chapter only.
    let mut session = session_with_balance(900);
    session.plan_outline(&planner, &model).unwrap();

    let err = session
        .generate_remaining(&writer, &model, None, &sink, |_| {})
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::InsufficientBalance {
            required: 800,
            available: 400
        }
    ));
    assert_eq!(session.stage(), WorkflowStage::OutlineReady);
    model.assert_empty();
}

#[test]
fn explicit_cover_render_charges_and_stores_the_image() {
    let prompts = PromptRegistry::new().unwrap();
    let sink = VecLogSink::new();
    let planner = OutlinePlanner::new(&prompts, &sink);
    let artist = CoverArtist::new(&prompts, &sink);
    let model = QueueTextModel::new();
    let image_model = QueueImageModel::new();
    model.push_ok(OUTLINE_JSON);
    image_model.push_ok(&[1, 2, 3]);

    let mut session = session_with_balance(10_000);
    session.plan_outline(&planner, &model).unwrap();
    session.render_cover(&artist, &image_model).unwrap();

    assert_eq!(session.ledger().balance(), 9_250);
    assert!(session.cover().is_some());
    assert_eq!(session.stage(), WorkflowStage::OutlineReady);
}

#[test]
fn top_up_unblocks_a_previously_blocked_operation() {
    let prompts = PromptRegistry::new().unwrap();
    let sink = VecLogSink::new();
    let planner = OutlinePlanner::new(&prompts, &sink);
    let model = QueueTextModel::new();

    let mut session = session_with_balance(100);
    assert!(matches!(
        session.plan_outline(&planner, &model),
        Err(WorkflowError::InsufficientBalance { .. })
    ));

    session.ledger_mut().top_up(1_000);
    model.push_ok(OUTLINE_JSON);
    session.plan_outline(&planner, &model).unwrap();
    assert_eq!(session.ledger().balance(), 600);
    model.assert_empty();
}
