//! # DrQuery
//!
//! Ask a MySQL database questions in plain language.
//!
//! A question goes through one linear pipeline ([`pipeline::Pipeline::ask`]):
//!
//! 1. [`database`] describes the live schema.
//! 2. [`generator`] asks the model for one SQL statement, following the domain rules of
//!    the active [`template`].
//! 3. [`sanitizer`] applies textual fixes for known model mistakes.
//! 4. [`executor`] runs the statement, repairing and retrying once when the error points
//!    at one of those mistakes.
//! 5. [`parser`] turns the raw rows into a [`parser::RowSet`], sampling very large results.
//! 6. [`router`] picks a table or a prose answer, and [`summarizer`] writes the prose.
//!
//! The model is reached through [`api::Completion`] and the database through
//! [`database::Database`], so both can be swapped. Conversations live in a
//! [`history::Session`], optionally persisted to SQLite by [`session_store`].
//!
//! [`analysis`] holds static, lexical checks on SQL used by `drq analyze` and by the
//! executor's timing log.

use directories::ProjectDirs;
use std::error::Error;

pub mod analysis;
pub mod api;
pub mod commands;
pub mod config;
pub mod database;
pub mod display;
pub mod error;
pub mod executor;
pub mod generator;
pub mod history;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod router;
pub mod sanitizer;
pub mod schema;
pub mod session_store;
pub mod summarizer;
pub mod template;

#[cfg(test)]
pub(crate) mod testing;

/// Return the per-platform configuration directory used by DrQuery.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("com", "drquery", "drq")`, so you get the right place on each OS
/// (e.g., `~/.config/drq` on Linux).
///
/// The directory is **not** created by this function; callers that need it should
/// create it with `fs::create_dir_all`.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be determined.
///
/// # Examples
/// ```rust
/// let cfg = drquery::config_dir().expect("has a config dir");
/// println!("config at {}", cfg.display());
/// ```
pub fn config_dir() -> Result<std::path::PathBuf, Box<dyn Error>> {
    let proj_dirs = ProjectDirs::from("com", "drquery", "drq")
        .ok_or("Unable to determine config directory")?;
    Ok(proj_dirs.config_dir().to_path_buf())
}
