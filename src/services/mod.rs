pub mod agenda;
pub mod cache;
pub mod credentials;
pub mod crm;
pub mod dashboard;
pub mod edits;
pub mod filters;
pub mod finance;
pub mod inventory;
pub mod loader;
pub mod report;
pub mod state;
pub mod watcher;
pub mod writer;
