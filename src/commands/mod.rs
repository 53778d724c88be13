// src/commands/mod.rs

//! Command handlers for the reqpin CLI

mod compile;
mod sync;

pub use compile::cmd_compile;
pub use sync::cmd_sync;
