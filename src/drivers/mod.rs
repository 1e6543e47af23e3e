//! Bundled driver bindings.
//!
//! Only the embedded SQLite binding ships here (behind the `rusqlite`
//! feature) so the workspace runs end-to-end without a server. Network
//! transports implement [`crate::driver::Driver`] out of tree.

#[cfg(feature = "rusqlite")]
mod rusqlite_driver;

#[cfg(feature = "rusqlite")]
pub use rusqlite_driver::RusqliteDriver;
