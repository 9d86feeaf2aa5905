//! CLI commands

mod context;
mod serve;
mod sign;
mod status;
pub mod style;

pub use serve::run_serve;
pub use sign::run_sign;
pub use status::run_status;
