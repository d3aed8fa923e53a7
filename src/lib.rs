//! # MIDI Pilot Library
//!
//! Fly a quadcopter from a MIDI keyboard and record its camera feed.
//!
//! Key presses are decoded from the MIDI byte stream, mapped to pilot commands
//! and dispatched to the [`controller::Controller`], which drives the flight
//! transport and runs capture sessions on a dedicated thread.

pub mod capture;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod flight;
pub mod keymap;
pub mod midi;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;
