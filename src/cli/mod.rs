//! Command implementations and terminal output

pub mod portfolio;
pub mod rates;
pub mod schedule;
pub mod setup;
pub mod ui;
