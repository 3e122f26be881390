pub mod db;
pub mod import;
pub mod models;

pub use rusqlite;
