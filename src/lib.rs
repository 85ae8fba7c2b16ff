//! # mirror-leech
//!
//! Task lifecycle core for a chat-driven mirror/leech bot.
//!
//! A task starts from a chat command (a link or an attachment), is resolved
//! into a concrete source, downloaded by one of several backends, optionally
//! extracted and split into parts, and delivered either back to the chat
//! (leech) or to cloud storage (mirror). This crate owns everything in
//! between: admission control, lifecycle state, same-directory batches,
//! post-processing order, completion notices and teardown. Backends,
//! uploaders and the chat client are plugged in through the traits in
//! [`collaborators`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use mirror_leech::{Collaborators, Config, Source, TaskCoordinator, TaskOptions, TaskOrigin};
//!
//! # async fn example(collaborators: Collaborators) -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = TaskCoordinator::new(Config::default(), collaborators).await?;
//!
//! let mut events = coordinator.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//! });
//!
//! let origin = TaskOrigin {
//!     chat_id: -100123,
//!     message_id: 42,
//!     message_link: "https://t.me/c/123/42".to_string(),
//!     tag: "@alice".to_string(),
//!     is_super_chat: true,
//! };
//! let options = TaskOptions {
//!     is_leech: true,
//!     ..Default::default()
//! };
//! coordinator
//!     .submit(Source::link("https://example.com/video.mkv"), options, origin)
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Admission lanes for downloads and uploads
pub mod admission;
/// Interfaces to backends, uploaders, messaging and persistence
pub mod collaborators;
/// Configuration types
pub mod config;
/// Task lifecycle coordinator (decomposed into focused submodules)
pub mod coordinator;
/// Incomplete-task persistence
pub mod db;
/// Error types
pub mod error;
/// Archive extraction
pub mod extraction;
/// Link classification and probing
pub mod links;
/// Media stream metadata and video discovery
pub mod media;
/// Completion notices
pub mod notice;
/// Live task registry
pub mod registry;
/// Same-directory batch grouping
pub mod same_dir;
/// Task records
pub mod task;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use collaborators::{
    ArchiveExtractor, BackendKind, Backends, Collaborators, DownloadJob, DownloadReporter,
    DownloadSignal, DownloadSource, Filtered, IncompleteTaskStore, LinkProber, LinkResolver,
    MediaFilter, MessageRef, Messenger, PassthroughMediaFilter, Resolved, SentRecord,
    TransferBackend, TransferBookkeeping, UploadRequest, Uploader,
};
pub use config::{Config, ConfigUpdate, Limits};
pub use coordinator::TaskCoordinator;
pub use db::{Database, IncompleteTask};
pub use error::{
    BackendError, DatabaseError, Error, FailureRoute, NotifyError, ProcessingError,
    ResolutionError, Result,
};
pub use task::{
    AttachmentRef, DirectDescriptor, DirectFile, Source, Task, TaskOptions, TaskOrigin,
    TaskSnapshot,
};
pub use types::{Button, Direction, Event, SeedPolicy, State, TaskId};

/// Run until a termination signal arrives, then shut the coordinator down.
///
/// On Unix both SIGTERM and SIGINT are honoured; elsewhere Ctrl+C.
///
/// # Example
///
/// ```no_run
/// use mirror_leech::{Collaborators, Config, TaskCoordinator, run_with_shutdown};
///
/// # async fn example(collaborators: Collaborators) -> mirror_leech::Result<()> {
/// let coordinator = TaskCoordinator::new(Config::default(), collaborators).await?;
/// run_with_shutdown(coordinator).await
/// # }
/// ```
pub async fn run_with_shutdown(coordinator: TaskCoordinator) -> Result<()> {
    shutdown_on(coordinator, wait_for_signal()).await
}

/// Shut the coordinator down once `trigger` resolves
pub async fn shutdown_on(
    coordinator: TaskCoordinator,
    trigger: impl std::future::Future<Output = ()>,
) -> Result<()> {
    trigger.await;
    tracing::info!("Shutdown requested");
    coordinator.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments; fall back to ctrl_c.
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                _ = sigint.recv() => tracing::info!("Received SIGINT"),
            }
        }
        (term, int) => {
            if let Err(e) = term.as_ref().and(int.as_ref()) {
                tracing::warn!(error = %e, "Signal handler registration failed, using ctrl_c");
            }
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Received Ctrl+C");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
    } else {
        tracing::info!("Received Ctrl+C");
    }
}
