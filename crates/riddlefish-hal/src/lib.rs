//! `riddlefish-hal` – hardware abstraction for the riddle fish.
//!
//! * [`bus`] – the [`RegisterBus`](bus::RegisterBus) trait every register
//!   device implements.
//! * [`registers`] – the puppet firmware's register map.
//! * [`i2c`] – Linux `i2c-dev` bus driver.
//! * [`puppet`] – the [`PuppetController`](puppet::PuppetController) worker.
//! * [`camera`] – the [`Camera`](camera::Camera) trait used by presence
//!   tracking.
//! * [`sim`] – simulated board and camera for headless runs and tests.

pub mod bus;
pub mod camera;
#[cfg(target_os = "linux")]
pub mod i2c;
pub mod puppet;
pub mod registers;
pub mod sim;
