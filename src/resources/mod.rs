//! Concrete resources served over HTTP.

pub mod note;

pub use note::{notes_controller, CreateNote, Note, NoteHooks, UpdateNote};
