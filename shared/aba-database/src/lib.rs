pub mod connection;
pub mod domain;
pub mod migrations;
pub mod models;
pub mod repositories;

pub use connection::*;
pub use domain::*;
pub use migrations::*;
pub use models::*;
pub use repositories::*;