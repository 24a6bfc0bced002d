//! Engine logic and port trait definitions for flowrun.
//!
//! This crate defines the "ports" (repository, transport and notification
//! traits) that the infrastructure layer implements. It depends only on
//! `flowrun-types` -- never on `flowrun-infra` or any database/IO crate.

pub mod event;
pub mod expression;
pub mod recovery;
pub mod repository;
pub mod router;
pub mod scheduler;

#[cfg(test)]
mod testing;
