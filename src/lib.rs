//! Library exports for the recipe sharing backend
//!
//! This module exposes internal components for testing and potential library usage.

pub mod config;
pub mod database;
pub mod error;
pub mod extract;
pub mod handler;
pub mod middleware;
pub mod model;
pub mod query;
pub mod relation;
pub mod route;
pub mod seed;
pub mod short_link;
pub mod store;
pub mod validation;
