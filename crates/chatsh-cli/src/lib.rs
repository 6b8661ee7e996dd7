//! chatsh command-line front end.

pub mod backend;
pub mod config;
pub mod console;
pub mod logging;
pub mod repl;
pub mod replay;
pub mod system;
