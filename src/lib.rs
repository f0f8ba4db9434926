//! Folio - background jobs for AI-assisted book writing
//!
//! Jobs that write, edit and review chunks of a book are queued in the database and run by a
//! polling processor. Each running job holds an exclusive lock on the book or chunk it works
//! on, and its chunk writes, log entries and final state are committed together.

#![allow(missing_docs)]

pub mod app;
pub mod boot;
pub mod cli;
pub mod commands;
pub mod config;
pub mod database;
pub mod environment;
pub mod generation;
pub mod job_queue;
pub mod jobs;
pub mod library;
pub mod model_catalog;
pub mod setup_tracing;

#[cfg(any(test, feature = "test-utils"))]
pub mod tests;
