//! Workflow state and command handling
//!
//! The workflow layer owns manuscripts, reviews, and users, and handles the
//! commands that modify them. Commands are the only write path.

mod assignment;
mod command;
mod state;

pub use command::Command;
pub use state::{Checkpoint, WorkflowState};
