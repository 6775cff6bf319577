//! contentmigrate - resumable content migration from paginated CMS APIs.
//!
//! Pulls users, taxonomy terms, media, posts and pages out of a paginated
//! source content API and loads them into a relational store, keeping an
//! old to new URL mapping for redirects.

pub mod cli;
pub mod config;
pub mod migration;
pub mod models;
pub mod repository;
pub mod schema;
pub mod source_api;
pub mod utils;
