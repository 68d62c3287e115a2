//! Agent Teams API Library
//!
//! Hierarchical agent teams behind a streaming chat endpoint: a dispatcher
//! routes each request between a research team and a writing team, and only
//! the writing team's output is streamed to the client.

pub mod agents;
pub mod api;
pub mod config;
pub mod llm;
pub mod streaming;
pub mod tools;
