//! Inkwell: a small community blog with group feeds, author follows and comments.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
