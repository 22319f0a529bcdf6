//! Zesty Ops - facility incident management for zoo staff
//!
//! A client library for reporting, tracking and resolving facility incidents,
//! with staff messaging, a colleague directory and work schedules, backed by
//! a hosted relational store with a realtime change feed.
//!
//! # Features
//!
//! - Incident submission with optional photo, live active feed and history
//! - Facility map derived from active incidents
//! - Direct messages grouped into conversations
//! - Live collections kept fresh by push notifications or interval polling
//! - Pluggable backends: the hosted project or an in-process store

/// Account settings: profile, password, preferences
pub mod account;
/// Composition root and transient notices
pub mod app;
/// Session types and the auth provider seam
pub mod auth;
/// Configuration management
pub mod config;
/// Colleague directory
pub mod directory;
/// Error taxonomy
pub mod error;
/// Incident feed, history, map, submission and resolution
pub mod incidents;
/// Live collections over fetch + change feed
pub mod live;
/// Logging setup and utilities
pub mod logging;
/// In-process backend
pub mod memory;
/// Conversations, inbox and compose
pub mod messaging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// View-navigation state machine
pub mod navigation;
/// Change notifications
pub mod realtime;
/// Repository pattern for data access
pub mod repository;
/// Weekly work schedule
pub mod schedule;
/// Sign up, sign in, sign out and session restore
pub mod session;
/// Report locations and facility-map sites
pub mod sites;
/// Hosted backend over HTTP and WebSocket
pub mod supabase;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use app::App;
pub use config::AppConfig;
pub use error::{Result, ZestyError};
pub use live::LiveCollection;
pub use memory::InMemoryBackend;
pub use models::{Category, Incident, Message, Priority, Profile};
pub use navigation::{Nav, Router};
pub use repository::Backend;
pub use supabase::SupabaseBackend;
