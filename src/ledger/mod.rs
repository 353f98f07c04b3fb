mod record;
mod store;

pub use record::AssignmentRecord;
pub use store::{AssignmentLedger, Claim};
