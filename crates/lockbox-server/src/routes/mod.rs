//! HTTP route modules.

pub mod audit;
pub mod favorites;
pub mod folders;
pub mod orgs;
pub mod secrets;
pub mod shared;
