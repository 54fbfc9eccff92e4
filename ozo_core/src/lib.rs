//! This crate crawls the waste collection service of OZO Ostrava and generates an iCalendar
//! file for every address it serves, plus an index of all generated files.
//!
//! The dates are read from <https://ozoostrava.cz/svoz2.php>.

pub use ical;

pub mod calendar;
pub mod catalog;
pub mod config;
pub mod crawler;
pub mod error;
pub mod hierarchy;
pub mod slug;
pub mod upstream_client;
