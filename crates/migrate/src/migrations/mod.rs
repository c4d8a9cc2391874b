//! Migration System
//!
//! Registry, ledger, runner and rollback logic, plus the file generator
//! and the plain-SQL migration unit.

pub mod creator;
pub mod definitions;
pub mod repository;
pub mod rollback;
pub mod runner;
pub mod sql;

pub use creator::*;
pub use definitions::*;
pub use repository::*;
pub use rollback::FRESH_DROP_OUTPUT;
pub use runner::*;
pub use sql::*;
