//! tasksync document server
//!
//! Backs the remote side of tasksync sync: an authenticated JSON document
//! store with equality queries and atomic batch writes.

pub mod server;
