pub mod catalog;
pub mod config;
pub mod diff;
pub mod error;
pub mod inventory;
pub mod naming;
pub mod retention;
pub mod selector;
pub mod trimmer;

pub use catalog::{Catalog, PsqlCatalog};
pub use config::{Overrides, Settings};
pub use trimmer::{TrimReport, Trimmer};
