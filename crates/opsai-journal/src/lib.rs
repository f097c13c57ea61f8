mod journal;
mod record;

pub use journal::ChangeJournal;
pub use record::{ChangeRecord, ChangeType};
