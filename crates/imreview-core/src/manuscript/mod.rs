//! Manuscript lifecycle
//!
//! A manuscript moves through a status state machine. All status writes go
//! through [`Manuscript::apply`], which validates the transition before it
//! changes anything.

#[allow(clippy::module_inception)]
mod manuscript;
mod status;

pub use manuscript::{
    Manuscript, ManuscriptChanges, ManuscriptMetadata, StatusChange, Transition,
};
pub use status::ManuscriptStatus;
