//! Registry crate for managing patchbay API command definitions.
//!
//! This crate provides the command table the dispatch engine works from:
//! named operations with their handlers, documented parameters, and the
//! self-describing `docs` / `docs_md` entries generated from the table
//! itself.

mod docs;
pub mod models;

pub use models::{
    Command, CommandSet, CommandSetBuilder, DOCS_COMMAND, DOCS_MD_COMMAND, GET_APIKEY_COMMAND,
    Handler, IMAGE_COMMAND,
};
