pub mod capability;
pub mod catalog;
pub mod collector;
pub mod diff;
pub mod elevation;
pub mod error;
pub mod executor;
pub mod report;
pub mod report_store;
pub mod source;
