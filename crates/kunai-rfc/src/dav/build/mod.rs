//! Response body serialization.

pub mod multistatus;
pub mod schedule;

pub use multistatus::serialize_multistatus;
pub use schedule::{ScheduleResponse, serialize_schedule_response};
