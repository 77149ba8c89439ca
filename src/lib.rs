//! dumpsort - keep a dump directory tidy
//!
//! This library watches a single "dump" directory and moves each new file into
//! the first configured destination whose filename prefix/suffix rule matches.
//! Bursts of filesystem activity are debounced into a single organize pass, and
//! files are moved with a no-clobber link when possible or copied otherwise.

pub mod cli;
pub mod config;
pub mod debounce;
pub mod organizer;
pub mod output;
pub mod relocate;
pub mod rules;
pub mod watcher;

pub use config::{Config, ConfigError};
pub use debounce::Debouncer;
pub use organizer::{OrganizeError, OrganizeOutcome, SkipReason, organize, plan};
pub use relocate::{RelocateError, Relocation, relocate};
pub use rules::DestinationRule;
pub use watcher::{LoopExit, WatchError, WatchLoop, subscribe};
