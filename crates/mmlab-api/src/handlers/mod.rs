//! API handlers

pub mod documents;
pub mod health;
pub mod retrieve;
