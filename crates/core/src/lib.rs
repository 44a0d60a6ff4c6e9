//! Domain schema for the note generation core — segments, chunks, subjects,
//! relevance labels, candidates, and the finalization outputs.

mod error;
mod schema;

pub use error::NoteError;
pub use schema::*;
