//! Self-update of the desktop app from its GitHub releases.

mod checker;
mod updater;

pub use checker::{ReleaseChecker, UpdateCheck};
pub use updater::{AutoUpdateOutcome, UpdateReport, Updater};
