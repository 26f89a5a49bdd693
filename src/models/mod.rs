//! Data models

mod instance;
mod load_balancer;

pub use instance::*;
pub use load_balancer::*;
