//! Guia Local: REST backend for a local business directory.
//!
//! Stack: Sled for embedded document storage (JSON per tree), Axum for the
//! HTTP layer, JWT + bcrypt for auth. Entities are cities, neighborhoods,
//! categories, subcategories, businesses and users; the public search
//! pipeline resolves slugs, filters, paginates and populates references.

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod rest;
pub mod search;
pub mod slug;
pub mod storage;
pub mod upload;
