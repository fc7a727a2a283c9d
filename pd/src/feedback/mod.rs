//! Feedback - change reports, confirmation, and the update log

mod confirm;
pub mod log;
mod report;

pub use confirm::{AcceptAll, Confirm, EditorConfirm, FnConfirm};
pub use report::{CONFIRM_HEADER, EntryKind, ReportEntry, build_entries, confirm_document, parse_confirmed, render};
