//! HTTP and WebSocket endpoints
//!
//! The WebSocket endpoint streams order changes to admitted subscribers; the
//! REST endpoints are the write path that produces those changes.

pub mod http;
pub mod rest;
pub mod websocket;
