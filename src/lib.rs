//! Pulsar forums library.
//!
//! Forum categories, forums, threads, posts and polls behind a JSON API,
//! with quote, mention and subscription notifications raised from post
//! contents.

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod notifications;
pub mod permissions;
pub mod users;
pub mod web;
