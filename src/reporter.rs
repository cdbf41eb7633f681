//! Reporter/prompter ports (spec.md §9, "Global UI/reporter"):
//! explicit dependency injection at `Client` construction rather than
//! the original's process-global registry lookup.

use async_trait::async_trait;

/// Priority of a user-facing report, mirroring the original's
/// `HIGH_PRIORITY`/`MEDIUM_PRIORITY`/`LOW_PRIORITY` reporter constants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Surfaces a message to whatever's on the other end of the CLI/UI.
/// No network or filesystem side effects of its own.
pub trait Reporter: Send + Sync {
    fn add_message(&self, message: &str, priority: Priority, on_crash: bool);
}

/// Default `Reporter`: writes through the `log` crate at a level
/// matched to priority, exactly the ambient logging the rest of this
/// crate uses instead of printing directly.
pub struct LogReporter;

impl Reporter for LogReporter {
    fn add_message(&self, message: &str, priority: Priority, on_crash: bool) {
        match priority {
            Priority::High => log::warn!("{message}"),
            Priority::Medium => log::info!("{message}"),
            Priority::Low => log::debug!("{message}"),
        }
        if on_crash {
            log::error!("(would be reported on crash) {message}");
        }
    }
}

/// Interactive yes/no and free-text prompts (ToS agreement, picking
/// among ambiguous installer targets). No default: a core with no
/// prompter configured just can't drive interactive flows.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn yes_no(&self, question: &str) -> bool;
    async fn text(&self, prompt: &str) -> String;
}
