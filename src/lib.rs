pub mod config;
pub mod db;
pub mod model;
pub mod ops;
pub mod output;
pub mod paths;
pub mod recurrence;
pub mod scheduler;
pub mod transfer;
pub mod tui;
pub mod validate;
