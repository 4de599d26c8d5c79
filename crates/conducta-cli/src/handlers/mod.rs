//! Command handlers - extracted from main.rs for testability

pub mod check;
pub mod report;
pub mod validate;

pub use check::{execute_check, seed_from_clock};
pub use report::{execute_report, load_report, write_outputs};
pub use validate::{execute_validate, load_spec};

use conducta::Verdict;

/// Exit code when a check ended without a decision
pub const EXIT_INCONCLUSIVE: u8 = 4;

/// Process exit code for an overall verdict
#[must_use]
pub const fn verdict_exit_code(verdict: Verdict) -> u8 {
    match verdict {
        Verdict::Accepted => 0,
        Verdict::Rejected => 1,
        Verdict::Inconclusive => EXIT_INCONCLUSIVE,
    }
}
