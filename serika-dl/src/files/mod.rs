//! Output Directory inspection and artifact delivery.

mod classify;
pub mod resolver;
pub mod serve;

pub use classify::{FileRole, classify, mime_type};
pub use resolver::{
    DeliverableSummary, Selection, SelectionKind, list_deliverables, select, summarize,
};
pub use serve::{ByteRange, serve_artifact};
