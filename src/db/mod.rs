//! Repository functions over PostgreSQL
//!
//! All functions are plain async fns taking an executor; multi-statement
//! business operations pass a transaction connection through them.

pub mod delivery;
pub mod inventory;
pub mod orders;
pub mod payments;
pub mod users;
