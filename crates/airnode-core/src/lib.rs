//! Hardware-independent core library for airnode
//!
//! This crate contains all platform-agnostic logic for the airnode sensor node:
//! the cooperative main loop, the sample scheduler, the broker publish gate,
//! the restart / factory-reset controller, button debouncing, configuration
//! persistence and the status/config page rendering.
//!
//! Every external collaborator (network provisioning, broker transport, sensor
//! driver, config storage, button pin, clock) is a trait, so the same loop runs
//! on the ESP32-S3 under embassy and on a desktop host for the simulator and
//! tests.
//!
//! It is `#![no_std]` with `extern crate alloc`.

#![no_std]

extern crate alloc;

pub mod app_state;
pub mod button;
pub mod clock;
pub mod config;
pub mod mqtt;
pub mod node;
pub mod provisioning;
pub mod reset;
pub mod sampling;
pub mod sensors;
pub mod web;

#[cfg(test)]
mod testing;

pub use node::{Node, NodeParts, Step};
