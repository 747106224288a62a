//! Note-taking library with per-note version history.
//!
//! Notes live in an immutable [`NotesState`] evolved by a reducer, and the
//! whole collection is persisted as one JSON snapshot that several sessions
//! can share, each observing the others' writes.

mod backend;
mod cli;
mod codec;
mod config;
mod errors;
mod helper;
mod note;
mod store;
mod sync;
mod types;

// Re-export key components
pub use backend::*;
pub use cli::*;
pub use codec::{decode_notes, encode_notes};
pub use config::*;
pub use errors::*;
pub use helper::*;
pub use note::*;
pub use store::*;
pub use sync::*;
pub use types::*;
