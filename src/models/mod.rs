pub mod event;
pub mod vote;

pub use event::{Event, EventId, EventSummary, ExportSnapshot, NewEvent};
pub use vote::{normalize_email, DeleteEvent, NewVote, VoteReceipt};
