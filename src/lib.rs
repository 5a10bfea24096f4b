//! Release identification and subscription matching for Librarian
//!
//! Raw releases from PT/BT sites are parsed into structured attributes,
//! resolved against a movie/TV catalog, gated by rule groups, and matched
//! against movie and TV subscriptions.

pub mod app;
pub mod cli;
pub mod config;
pub mod indexer;
pub mod jobs;
pub mod services;
