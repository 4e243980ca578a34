//! Request handlers

pub mod dashboard;
pub mod entries;
pub mod health;
pub mod sync;
