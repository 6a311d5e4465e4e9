//! Data models for chat entities

mod file;
mod message;
mod user;

pub use file::*;
pub use message::*;
pub use user::*;
