//! Transfer file handling for the `rfetch` binary

pub mod settings;
