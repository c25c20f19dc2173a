mod store;
mod types;

pub use store::{validate_name, PlaybookStore};
pub use types::{Playbook, PlaybookStep};
