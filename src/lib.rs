// ABOUTME: Library root for agent-pool
// ABOUTME: Exposes the session pool and the application configuration loader

//! Dynamic, fail-fast pool of pre-warmed AI agent sessions.

pub mod config;
pub mod session_pool;
