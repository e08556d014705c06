//! Verbosity-gated logging.
//!
//! Solvers receive a [`Reporter`] at construction instead of consulting a
//! process-wide setting. The reporter forwards to the [`log`] facade, so the
//! binary decides where messages end up (via `env_logger`), while the solver
//! decides which of them are emitted at all.

use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// How much a solver reports about its progress.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Verbosity {
    Silent,
    #[default]
    Summarize,
    Verbose,
    DebugVerbose,
}

/// Logging handle carrying the active verbosity level.
#[derive(Debug, Default)]
pub struct Reporter {
    level: Cell<Verbosity>,
}

impl Reporter {
    pub fn new(level: Verbosity) -> Self {
        Self {
            level: Cell::new(level),
        }
    }

    #[inline]
    pub fn level(&self) -> Verbosity {
        self.level.get()
    }

    /// True if messages at `level` are emitted.
    #[inline]
    pub fn enabled(&self, level: Verbosity) -> bool {
        level != Verbosity::Silent && self.level.get() >= level
    }

    /// Switch to `level` until the returned guard is dropped.
    pub fn push(&self, level: Verbosity) -> VerbosityGuard<'_> {
        let previous = self.level.replace(level);
        VerbosityGuard {
            reporter: self,
            previous,
        }
    }

    pub fn summarize(&self, args: std::fmt::Arguments<'_>) {
        if self.enabled(Verbosity::Summarize) {
            log::info!("{args}");
        }
    }

    pub fn verbose(&self, args: std::fmt::Arguments<'_>) {
        if self.enabled(Verbosity::Verbose) {
            log::debug!("{args}");
        }
    }

    pub fn debug(&self, args: std::fmt::Arguments<'_>) {
        if self.enabled(Verbosity::DebugVerbose) {
            log::trace!("{args}");
        }
    }

    /// Warnings are emitted at every level except `Silent`.
    pub fn warn(&self, args: std::fmt::Arguments<'_>) {
        if self.level.get() > Verbosity::Silent {
            log::warn!("{args}");
        }
    }
}

/// Restores the reporter's previous level on drop.
#[must_use = "the previous verbosity is restored as soon as the guard is dropped"]
pub struct VerbosityGuard<'a> {
    reporter: &'a Reporter,
    previous: Verbosity,
}

impl Drop for VerbosityGuard<'_> {
    fn drop(&mut self) {
        self.reporter.level.set(self.previous);
    }
}
