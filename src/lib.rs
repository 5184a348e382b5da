//! picshare - moderation, token revocation and rating backend for a
//! photo-sharing service.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
