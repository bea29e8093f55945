//! Domain services for kunai: directory-sourced authorization, the REPORT
//! engine, recurrence expansion, the conditional write pipeline, iTIP
//! scheduling, and the sync-token codec.

pub mod auth;
pub mod caldav;
pub mod carddav;
pub mod directory;
pub mod error;
pub mod scheduling;
pub mod sync;
