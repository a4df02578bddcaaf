//! Page build scheduling: targets, strategy chain, and the deferred task
//! state machine.
//!
//! A strategy decides whether an affected page is rendered immediately,
//! queued for a background worker, or left stale until the next reader.
//! Strategies are consulted in configured order; the first opinion wins,
//! and the chain must end in a catch-all.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// A page that can be materialized as a static artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildTarget {
    /// Full view of one thread.
    Thread { board: String, thread: DbId },
    /// Paginated board index; pages are 1-based.
    IndexPage { board: String, page: u32 },
    /// One-page overview of every thread on the board.
    Catalog { board: String },
}

impl BuildTarget {
    /// Stable artifact key, also used as the page store path.
    pub fn artifact_key(&self) -> String {
        match self {
            BuildTarget::Thread { board, thread } => format!("{board}/res/{thread}.html"),
            BuildTarget::IndexPage { board, page } if *page <= 1 => {
                format!("{board}/index.html")
            }
            BuildTarget::IndexPage { board, page } => format!("{board}/{page}.html"),
            BuildTarget::Catalog { board } => format!("{board}/catalog.html"),
        }
    }

    pub fn board(&self) -> &str {
        match self {
            BuildTarget::Thread { board, .. }
            | BuildTarget::IndexPage { board, .. }
            | BuildTarget::Catalog { board } => board,
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy chain
// ---------------------------------------------------------------------------

/// What to do with a page-generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildAction {
    /// Render synchronously before returning to the caller.
    Immediate,
    /// Enqueue a task; the caller proceeds, serving a possibly stale
    /// artifact meanwhile.
    Defer,
    /// Mark the artifact stale; the next reader rebuilds it.
    OnAccess,
}

/// Request context the strategies evaluate against.
#[derive(Debug, Clone, Default)]
pub struct BuildEnv {
    /// The exact page the acting submitter is about to be redirected to.
    pub redirect: Option<BuildTarget>,
}

/// One policy in the ordered strategy chain.
pub trait BuildStrategy: Send + Sync {
    /// `None` defers the opinion to the next strategy in the chain.
    fn evaluate(&self, env: &BuildEnv, target: &BuildTarget) -> Option<BuildAction>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Walk the chain and take the first opinion.
///
/// An exhausted chain is a configuration error: the chain must end in a
/// catch-all strategy.
pub fn resolve_action(
    strategies: &[Box<dyn BuildStrategy>],
    env: &BuildEnv,
    target: &BuildTarget,
) -> Result<BuildAction, CoreError> {
    for strategy in strategies {
        if let Some(action) = strategy.evaluate(env, target) {
            return Ok(action);
        }
    }
    Err(CoreError::Config(
        "build strategy chain has no opinion; it must end in a catch-all".to_string(),
    ))
}

/// Baseline strategy: the page the submitter lands on is always rendered
/// immediately. No opinion on anything else.
pub struct SaneStrategy;

impl BuildStrategy for SaneStrategy {
    fn evaluate(&self, env: &BuildEnv, target: &BuildTarget) -> Option<BuildAction> {
        match &env.redirect {
            Some(redirect) if redirect == target => Some(BuildAction::Immediate),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        "sane"
    }
}

/// Catch-all: render everything synchronously.
pub struct ImmediateStrategy;

impl BuildStrategy for ImmediateStrategy {
    fn evaluate(&self, _env: &BuildEnv, _target: &BuildTarget) -> Option<BuildAction> {
        Some(BuildAction::Immediate)
    }

    fn name(&self) -> &'static str {
        "immediate"
    }
}

/// Catch-all: queue everything for the background worker.
pub struct DeferStrategy;

impl BuildStrategy for DeferStrategy {
    fn evaluate(&self, _env: &BuildEnv, _target: &BuildTarget) -> Option<BuildAction> {
        Some(BuildAction::Defer)
    }

    fn name(&self) -> &'static str {
        "defer"
    }
}

/// Catch-all: leave everything stale until read.
pub struct OnAccessStrategy;

impl BuildStrategy for OnAccessStrategy {
    fn evaluate(&self, _env: &BuildEnv, _target: &BuildTarget) -> Option<BuildAction> {
        Some(BuildAction::OnAccess)
    }

    fn name(&self) -> &'static str {
        "on_access"
    }
}

/// Load shedding: index pages past `defer_beyond_page` are queued instead
/// of rendered inline. Cheap front pages stay with later strategies.
pub struct LoadShedStrategy {
    pub defer_beyond_page: u32,
}

impl BuildStrategy for LoadShedStrategy {
    fn evaluate(&self, _env: &BuildEnv, target: &BuildTarget) -> Option<BuildAction> {
        match target {
            BuildTarget::IndexPage { page, .. } if *page > self.defer_beyond_page => {
                Some(BuildAction::Defer)
            }
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        "load_shed"
    }
}

// ---------------------------------------------------------------------------
// Deferred tasks
// ---------------------------------------------------------------------------

/// Status ids for deferred build tasks, matching the `build_task_statuses`
/// seed data.
pub type StatusId = i16;

/// Lifecycle of a deferred build task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending = 1,
    Running = 2,
    Done = 3,
    Failed = 4,
}

impl TaskStatus {
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(TaskStatus::Pending),
            2 => Some(TaskStatus::Running),
            3 => Some(TaskStatus::Done),
            4 => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    /// Valid target statuses reachable from `self`.
    ///
    /// `Done` is terminal. `Failed` may return to `Pending`: failed tasks
    /// are eligible for retry on a later queue drain.
    pub fn valid_transitions(self) -> &'static [TaskStatus] {
        match self {
            TaskStatus::Pending => &[TaskStatus::Running],
            TaskStatus::Running => &[TaskStatus::Done, TaskStatus::Failed],
            TaskStatus::Failed => &[TaskStatus::Pending],
            TaskStatus::Done => &[],
        }
    }

    pub fn can_transition(self, to: TaskStatus) -> bool {
        self.valid_transitions().contains(&to)
    }
}

/// A queued render job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTask {
    pub id: DbId,
    pub target: BuildTarget,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub created: Timestamp,
}
