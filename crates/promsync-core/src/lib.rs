//! Core types, config, errors, and catalog model for promsync.

pub mod catalog;
pub mod config;
pub mod document;
pub mod duration;
pub mod error;
