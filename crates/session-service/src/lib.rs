//! Parley Session Service
//!
//! HTTP front door for session admission. Clients join, hosts review the
//! waiting list and decide, and members read chat history and recordings.
//! All state changes go through [`session_core::admission::AdmissionRegistry`],
//! which announces them on the Redis bus so connected clients see them.
//!
//! # Architecture
//!
//! ```text
//! HTTP (axum) ─► require_auth (HS256 JWT) ─► handlers ─► AdmissionRegistry
//!                                                           │        │
//!                                                      PgStore   RedisTransport
//! ```

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
