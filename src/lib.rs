//! voicechat-rs library crate
//!
//! This module exposes internal types for integration testing.
//! The main binary is in main.rs.

#[macro_use]
extern crate log;

pub mod capture;
pub mod client;
pub mod config;
pub mod constants;
pub mod conversation;
pub mod credential;
pub mod decoder;
pub mod event;
pub mod message;
pub mod output;
pub mod queue;
pub mod speech;
pub mod stdin;
