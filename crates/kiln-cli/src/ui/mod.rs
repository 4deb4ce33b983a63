//! Terminal output.
//!
//! Commands talk to [`Output`], which forwards events to a single actor
//! thread so lines from concurrent builds never interleave.
//!
//! - [`theme`] - Colors and icons
//! - [`actor`] - Message-passing event loop
//! - [`output`] - Public API for commands, implements the core `Reporter`
//! - [`table`] - Plan and package tables

pub mod actor;
pub mod output;
pub mod table;
pub mod theme;

pub use output::Output;
pub use theme::Theme;
