//! Error types for the stagehand runtime

use stagehand_types::{InstanceId, TaskId};
use thiserror::Error;

use super::config::ConfigError;

/// Top-level runtime error
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Channel errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Mutex misuse
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// Lookup of an unknown name
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// Actor-related errors
    #[error("Actor error: {0}")]
    Actor(#[from] ActorError),

    /// Frame-related errors
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Worker pool task errors
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Operating on a closed channel
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("send on closed channel")]
    Closed,

    /// The channel is bounded and currently full
    #[error("channel is full")]
    Full,
}

/// Script-level mutex misuse
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    /// `release` called by a thread that does not hold the lock
    #[error("lock released by a thread that does not own it")]
    NotOwner,
}

/// An unknown frame, service, context or component name
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("frame '{0}' not found")]
    Frame(String),

    #[error("service '{0}' not found")]
    Service(String),

    #[error("context '{0}' not found")]
    Context(String),

    #[error("component '{component}' not found in frame '{frame}'")]
    Component { frame: String, component: String },
}

/// Actor execution errors
#[derive(Debug, Error)]
pub enum ActorError {
    /// A lifecycle hook or method body failed and no `on_error` hook recovered it
    #[error("{hook} failed on actor {actor}: {source:#}")]
    Hook {
        actor: InstanceId,
        hook: String,
        #[source]
        source: anyhow::Error,
    },

    /// The dispatch table has no entry for the method
    #[error("actor {actor} has no method '{method}'")]
    MethodNotFound { actor: InstanceId, method: String },

    /// `start` called on an actor that was not built as parallel
    #[error("actor {0} is not parallel")]
    NotParallel(InstanceId),

    /// `start` called while the worker thread is alive
    #[error("actor {0} is already running")]
    AlreadyRunning(InstanceId),

    /// The actor crashed earlier and must be restarted
    #[error("actor {0} has crashed")]
    Crashed(InstanceId),

    /// The OS refused to spawn the worker thread
    #[error("failed to spawn worker for actor {actor}: {source}")]
    Spawn {
        actor: InstanceId,
        #[source]
        source: std::io::Error,
    },
}

impl ActorError {
    /// Build a hook execution error
    pub fn hook(actor: &InstanceId, hook: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Hook {
            actor: actor.clone(),
            hook: hook.into(),
            source,
        }
    }
}

/// Frame errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The frame's worker pool was shut down by `unload`
    #[error("worker pool of frame '{0}' is shut down")]
    PoolShutdown(String),

    /// `create_frame` under the reject policy with a name already in use
    #[error("frame '{0}' already exists")]
    DuplicateFrame(String),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),
}

/// Worker pool task errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The task was cancelled before it started
    #[error("{0} was cancelled")]
    Cancelled(TaskId),

    /// The task panicked while running
    #[error("{task} panicked: {message}")]
    Panicked { task: TaskId, message: String },

    /// The worker dropped the task without producing a result
    #[error("{0} was dropped by the worker pool")]
    Failed(TaskId),

    /// `wait` timed out; the task may still complete later
    #[error("timed out waiting for {0}")]
    Timeout(TaskId),
}

/// Result type using RuntimeError
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Result type using ActorError
pub type ActorResult<T> = std::result::Result<T, ActorError>;
