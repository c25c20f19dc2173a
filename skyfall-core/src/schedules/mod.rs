mod driver;
mod store;
mod types;

pub use driver::{FiringHistory, FiringRecord, ScheduleDriver};
pub use store::ScheduleStore;
pub use types::{
    default_schedule_name, NewSchedule, RepeatFrequency, Schedule, TriggerPolicy, DATE_FORMAT,
};
