//! libSQL database layer backing the reference remote store

mod connection;
mod migrations;

pub use connection::Database;
