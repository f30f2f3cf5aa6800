//! BTHome relay library — portable receive path for BTHome BLE sensors.
//!
//! Scans for BLE advertisements, keeps the ones carrying BTHome service data
//! (UUID 0xFCD2), decodes them into readings, and hands the latest reading to
//! a consumer loop through a single-slot mailbox. The consumer pauses scanning
//! while it drains the mailbox, which is the only synchronization between the
//! radio callback and the loop.
//!
//! Everything here is `no_std`, allocation-free, and testable on any host
//! with `cargo test --lib --no-default-features`. The ESP32 firmware binary
//! provides the radio (trouble-host) and the serial log sink.
//!
//! Data flow:
//! `scanner` (parse) → `filter` → `decoder` (+ `bthome`) → `mailbox`
//! → `consumer` ↔ `lifecycle` → `comm`

#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod bthome;
pub mod comm;
pub mod consumer;
pub mod decoder;
pub mod defaults;
pub mod filter;
pub mod lifecycle;
pub mod mailbox;
pub mod protocol;
pub mod scanner;
