//! Multi-stop navigation server.
//!
//! Validates an ordered list of stops, drives a routing engine through
//! initialization, route computation and guidance, and reports every
//! session state change as an event.

pub mod config;
pub mod domain;
pub mod gateway;
pub mod permission;
pub mod session;
pub mod web;
