//! In-process simulation of the puppet board and camera for headless runs
//! and tests.
//!
//! [`SimPuppetBus`] models the firmware's register protocol: a move request
//! is only accepted from the matching resting state, progresses while its
//! status register is polled, and down moves spring back to idle.  Every
//! clone shares the same firmware, so a test can keep a handle for
//! inspection after moving the bus into a controller.
//!
//! # Example
//!
//! ```rust
//! use riddlefish_hal::bus::RegisterBus;
//! use riddlefish_hal::registers::*;
//! use riddlefish_hal::sim::SimPuppetBus;
//!
//! let mut bus = SimPuppetBus::new().with_latency(0);
//! bus.write_register(HEAD_REG, MOTOR_UP_REQUESTED).unwrap();
//! assert_eq!(bus.read_register(HEAD_STATUS_REG).unwrap(), MOTOR_UP);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use riddlefish_types::FishError;

use crate::bus::RegisterBus;
use crate::camera::{Camera, CameraFrame};
use crate::registers::*;

// ────────────────────────────────────────────────────────────────────────────
// Simulated firmware
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Motor {
    Idle,
    UpRequested { remaining: u32 },
    Up,
    DownRequested { remaining: u32 },
    Down,
}

impl Motor {
    fn status(self) -> u8 {
        match self {
            Motor::Idle => MOTOR_IDLE,
            Motor::UpRequested { .. } => MOTOR_UP_REQUESTED,
            Motor::Up => MOTOR_UP,
            Motor::DownRequested { .. } => MOTOR_DOWN_REQUESTED,
            Motor::Down => MOTOR_DOWN,
        }
    }

    /// Advance one poll and return the status observed by that poll.  A
    /// finished down move is reported once, then the motor rests.
    fn poll(&mut self, stalled: bool) -> u8 {
        let next = match *self {
            Motor::UpRequested { remaining } if !stalled => {
                if remaining == 0 {
                    Motor::Up
                } else {
                    Motor::UpRequested {
                        remaining: remaining - 1,
                    }
                }
            }
            Motor::DownRequested { remaining } if !stalled => {
                if remaining == 0 {
                    Motor::Down
                } else {
                    Motor::DownRequested {
                        remaining: remaining - 1,
                    }
                }
            }
            Motor::Down => Motor::Idle,
            other => other,
        };
        *self = next;
        next.status()
    }
}

#[derive(Debug)]
struct Firmware {
    latency: u32,
    control: u8,
    head: Motor,
    tail: Motor,
    mouth: Motor,
    stalled: Vec<u8>,
    failing_reads: u32,
    failing_writes: u32,
    writes: Vec<(u8, u8)>,
    reads: u64,
}

impl Firmware {
    fn motor_mut(&mut self, reg: u8) -> Option<&mut Motor> {
        match reg {
            HEAD_REG | HEAD_STATUS_REG => Some(&mut self.head),
            TAIL_REG | TAIL_STATUS_REG => Some(&mut self.tail),
            MOUTH_REG | MOUTH_STATUS_REG => Some(&mut self.mouth),
            _ => None,
        }
    }

    fn write(&mut self, reg: u8, value: u8) {
        self.writes.push((reg, value));
        let latency = self.latency;
        match reg {
            CONTROL_REG => match value {
                CONTROL_REQUESTED if self.control != CONTROL_UNDER_CONTROL => {
                    self.control = CONTROL_UNDER_CONTROL;
                }
                CONTROL_LEAVE if self.control == CONTROL_UNDER_CONTROL => {
                    self.control = CONTROL_IDLE;
                }
                _ => {}
            },
            _ => {
                if let Some(motor) = self.motor_mut(reg) {
                    match (value, *motor) {
                        (MOTOR_UP_REQUESTED, Motor::Idle) => {
                            *motor = Motor::UpRequested { remaining: latency };
                        }
                        (MOTOR_DOWN_REQUESTED, Motor::Up) => {
                            *motor = Motor::DownRequested { remaining: latency };
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn read(&mut self, reg: u8) -> u8 {
        self.reads += 1;
        if reg == CONTROL_STATUS_REG {
            return self.control;
        }
        let stalled = self.stalled.contains(&reg);
        match self.motor_mut(reg) {
            Some(motor) => motor.poll(stalled),
            // Unknown registers read as the "busy" sentinel.
            None => ERROR_PLEASE_WAIT,
        }
    }
}

/// A simulated puppet board speaking the firmware's register protocol.
#[derive(Debug, Clone)]
pub struct SimPuppetBus {
    firmware: Arc<Mutex<Firmware>>,
}

impl Default for SimPuppetBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPuppetBus {
    /// Board with every motor resting and nobody in control.  Moves take two
    /// status polls to complete.
    pub fn new() -> Self {
        Self {
            firmware: Arc::new(Mutex::new(Firmware {
                latency: 2,
                control: CONTROL_IDLE,
                head: Motor::Idle,
                tail: Motor::Idle,
                mouth: Motor::Idle,
                stalled: Vec::new(),
                failing_reads: 0,
                failing_writes: 0,
                writes: Vec::new(),
                reads: 0,
            })),
        }
    }

    /// Number of status polls a requested move stays in flight.
    pub fn with_latency(self, polls: u32) -> Self {
        if let Ok(mut fw) = self.firmware.lock() {
            fw.latency = polls;
        }
        self
    }

    /// Make the motor behind `status_reg` ignore polls forever.
    pub fn stall(&self, status_reg: u8) {
        if let Ok(mut fw) = self.firmware.lock() {
            fw.stalled.push(status_reg);
        }
    }

    /// Fail the next `n` register reads with a hardware fault.
    pub fn fail_next_reads(&self, n: u32) {
        if let Ok(mut fw) = self.firmware.lock() {
            fw.failing_reads = n;
        }
    }

    /// Fail the next `n` register writes with a hardware fault.
    pub fn fail_next_writes(&self, n: u32) {
        if let Ok(mut fw) = self.firmware.lock() {
            fw.failing_writes = n;
        }
    }

    /// Every accepted write so far, in order.
    pub fn writes(&self) -> Vec<(u8, u8)> {
        self.firmware
            .lock()
            .map(|fw| fw.writes.clone())
            .unwrap_or_default()
    }

    /// Total number of read transfers attempted.
    pub fn reads(&self) -> u64 {
        self.firmware.lock().map(|fw| fw.reads).unwrap_or_default()
    }

    /// Current status register value without advancing the simulation.
    pub fn peek(&self, status_reg: u8) -> Option<u8> {
        let mut fw = self.firmware.lock().ok()?;
        if status_reg == CONTROL_STATUS_REG {
            return Some(fw.control);
        }
        fw.motor_mut(status_reg).map(|m| m.status())
    }

    fn firmware(&self) -> Result<MutexGuard<'_, Firmware>, FishError> {
        self.firmware.lock().map_err(|_| FishError::HardwareFault {
            component: "sim_puppet".to_string(),
            details: "firmware state poisoned".to_string(),
        })
    }
}

impl RegisterBus for SimPuppetBus {
    fn read_register(&mut self, reg: u8) -> Result<u8, FishError> {
        let mut fw = self.firmware()?;
        if fw.failing_reads > 0 {
            fw.failing_reads -= 1;
            fw.reads += 1;
            return Err(FishError::HardwareFault {
                component: "sim_puppet".to_string(),
                details: format!("injected read failure on {reg:#04x}"),
            });
        }
        Ok(fw.read(reg))
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), FishError> {
        let mut fw = self.firmware()?;
        if fw.failing_writes > 0 {
            fw.failing_writes -= 1;
            return Err(FishError::HardwareFault {
                component: "sim_puppet".to_string(),
                details: format!("injected write failure on {reg:#04x}"),
            });
        }
        fw.write(reg, value);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stub camera
// ────────────────────────────────────────────────────────────────────────────

/// A simulated camera that returns blank RGB24 frames with increasing
/// sequence numbers.
pub struct SimCamera {
    id: String,
    width: u32,
    height: u32,
    next: u64,
    failing: u32,
    released: Arc<AtomicBool>,
}

impl SimCamera {
    /// Create a new simulated 4×4 camera with the given identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            width: 4,
            height: 4,
            next: 0,
            failing: 0,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fail the next `n` captures.
    pub fn with_failures(mut self, n: u32) -> Self {
        self.failing = n;
        self
    }

    /// Flag that flips to `true` once the camera is released.
    pub fn released_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }
}

impl Camera for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn capture(&mut self) -> Result<CameraFrame, FishError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(FishError::HardwareFault {
                component: self.id.clone(),
                details: "camera released".to_string(),
            });
        }
        if self.failing > 0 {
            self.failing -= 1;
            return Err(FishError::HardwareFault {
                component: self.id.clone(),
                details: "no frame available".to_string(),
            });
        }
        let sequence = self.next;
        self.next += 1;
        Ok(CameraFrame {
            sequence,
            width: self.width,
            height: self.height,
            data: vec![0u8; (self.width * self.height * 3) as usize],
        })
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_move_completes_after_latency() {
        let mut bus = SimPuppetBus::new().with_latency(2);
        bus.write_register(TAIL_REG, MOTOR_UP_REQUESTED).unwrap();
        assert_eq!(bus.read_register(TAIL_STATUS_REG).unwrap(), MOTOR_UP_REQUESTED);
        assert_eq!(bus.read_register(TAIL_STATUS_REG).unwrap(), MOTOR_UP_REQUESTED);
        assert_eq!(bus.read_register(TAIL_STATUS_REG).unwrap(), MOTOR_UP);
        assert_eq!(bus.read_register(TAIL_STATUS_REG).unwrap(), MOTOR_UP);
    }

    #[test]
    fn down_move_springs_back_to_idle() {
        let mut bus = SimPuppetBus::new().with_latency(0);
        bus.write_register(MOUTH_REG, MOTOR_UP_REQUESTED).unwrap();
        assert_eq!(bus.read_register(MOUTH_STATUS_REG).unwrap(), MOTOR_UP);
        bus.write_register(MOUTH_REG, MOTOR_DOWN_REQUESTED).unwrap();
        assert_eq!(bus.read_register(MOUTH_STATUS_REG).unwrap(), MOTOR_DOWN);
        assert_eq!(bus.read_register(MOUTH_STATUS_REG).unwrap(), MOTOR_IDLE);
    }

    #[test]
    fn down_request_ignored_unless_up() {
        let mut bus = SimPuppetBus::new().with_latency(0);
        bus.write_register(HEAD_REG, MOTOR_DOWN_REQUESTED).unwrap();
        assert_eq!(bus.read_register(HEAD_STATUS_REG).unwrap(), MOTOR_IDLE);
        assert_eq!(bus.writes(), vec![(HEAD_REG, MOTOR_DOWN_REQUESTED)]);
    }

    #[test]
    fn control_arbitration() {
        let mut bus = SimPuppetBus::new();
        assert_eq!(bus.read_register(CONTROL_STATUS_REG).unwrap(), CONTROL_IDLE);
        bus.write_register(CONTROL_REG, CONTROL_REQUESTED).unwrap();
        assert_eq!(bus.read_register(CONTROL_STATUS_REG).unwrap(), CONTROL_UNDER_CONTROL);
        bus.write_register(CONTROL_REG, CONTROL_LEAVE).unwrap();
        assert_eq!(bus.peek(CONTROL_STATUS_REG), Some(CONTROL_IDLE));
    }

    #[test]
    fn injected_failures_are_hardware_faults() {
        let mut bus = SimPuppetBus::new();
        bus.fail_next_reads(1);
        bus.fail_next_writes(1);
        assert!(matches!(
            bus.read_register(HEAD_STATUS_REG),
            Err(FishError::HardwareFault { .. })
        ));
        assert!(bus.write_register(HEAD_REG, MOTOR_UP_REQUESTED).is_err());
        assert!(bus.read_register(HEAD_STATUS_REG).is_ok());
        assert!(bus.writes().is_empty());
        assert_eq!(bus.reads(), 2);
    }

    #[test]
    fn stalled_motor_never_arrives() {
        let mut bus = SimPuppetBus::new().with_latency(0);
        bus.stall(HEAD_STATUS_REG);
        bus.write_register(HEAD_REG, MOTOR_UP_REQUESTED).unwrap();
        for _ in 0..10 {
            assert_eq!(bus.read_register(HEAD_STATUS_REG).unwrap(), MOTOR_UP_REQUESTED);
        }
    }

    #[test]
    fn clones_share_firmware() {
        let mut bus = SimPuppetBus::new().with_latency(0);
        let observer = bus.clone();
        bus.write_register(HEAD_REG, MOTOR_UP_REQUESTED).unwrap();
        assert_eq!(observer.peek(HEAD_STATUS_REG), Some(MOTOR_UP_REQUESTED));
        assert_eq!(observer.writes().len(), 1);
    }

    #[test]
    fn sim_camera_sequence_failures_and_release() {
        let mut cam = SimCamera::new("sim").with_failures(1);
        let released = cam.released_flag();
        assert!(cam.capture().is_err());
        assert_eq!(cam.capture().unwrap().sequence, 0);
        let frame = cam.capture().unwrap();
        assert_eq!(frame.sequence, 1);
        assert_eq!(frame.data.len(), 48);
        cam.release();
        assert!(released.load(Ordering::SeqCst));
        assert!(cam.capture().is_err());
    }
}
