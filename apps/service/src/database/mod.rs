//! Monitor storage.
//!
//! Two backends implement [`MonitorRepository`]: a volatile
//! [`MemoryRepository`] and a durable [`LibsqlRepository`].

pub mod memory;
pub mod migrations;
pub mod repository;
pub mod sqlite;

pub use memory::MemoryRepository;
pub use repository::{MonitorRepository, RepositoryError};
pub use sqlite::LibsqlRepository;
