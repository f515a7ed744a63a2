//! ESP32-S3 firmware-specific modules for airnode
//!
//! This crate implements the collaborator traits of `airnode-core` against
//! real hardware: Wi-Fi station and configuration access point, the captive
//! portal (DHCP, DNS and HTTP), SD-card configuration storage, the climate
//! sensor, and the MQTT session running in its own task.

#![no_std]

extern crate alloc;

pub mod app_state;
pub mod clock;
pub mod mqtt;
pub mod network;
pub mod portal;
pub mod sensor;
pub mod storage;
