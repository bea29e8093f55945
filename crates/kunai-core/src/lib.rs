//! Shared foundation for the kunai CalDAV/CardDAV server: configuration,
//! constants, the DAV URL router, and the core error type.

pub mod config;
pub mod constants;
pub mod error;
pub mod path;
