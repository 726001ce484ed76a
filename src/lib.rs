pub mod config;
pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod quiz;
pub mod session;
