//! Small helpers shared across modules.

pub mod filename;
pub mod fs;
pub mod http_client;
