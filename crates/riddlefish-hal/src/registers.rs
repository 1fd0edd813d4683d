//! Register map of the puppet firmware.
//!
//! The firmware exposes one command register and one status register per
//! motor, plus a control register used to arbitrate bus ownership.  Commands
//! are written as "requested" values; the firmware moves the motor and
//! reports progress through the matching status register.

use riddlefish_types::PuppetCommand;

pub const MOUTH_REG: u8 = 0x01;
pub const CONTROL_REG: u8 = 0x02;
pub const TAIL_REG: u8 = 0x03;
pub const HEAD_REG: u8 = 0x04;

pub const MOUTH_STATUS_REG: u8 = 0x50;
pub const CONTROL_STATUS_REG: u8 = 0x51;
pub const TAIL_STATUS_REG: u8 = 0x52;
pub const HEAD_STATUS_REG: u8 = 0x53;

pub const MOTOR_IDLE: u8 = 0x00;
pub const MOTOR_UP_REQUESTED: u8 = 0x01;
pub const MOTOR_UP: u8 = 0x02;
pub const MOTOR_DOWN_REQUESTED: u8 = 0x03;
pub const MOTOR_DOWN: u8 = 0x04;

pub const CONTROL_IDLE: u8 = 0x10;
pub const CONTROL_REQUESTED: u8 = 0x11;
pub const CONTROL_UNDER_CONTROL: u8 = 0x12;
pub const CONTROL_LEAVE: u8 = 0x13;

/// Returned by the firmware while it is busy with a previous request.
pub const ERROR_PLEASE_WAIT: u8 = 0x20;

/// Default 7-bit bus address of the puppet board.
pub const DEFAULT_ADDRESS: u16 = 0x08;

/// Register-level recipe for one [`PuppetCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveSpec {
    pub command_reg: u8,
    pub status_reg: u8,
    /// Value written to `command_reg` to start the move.
    pub request: u8,
    /// Status value that marks the move as finished.
    pub target: u8,
}

impl MoveSpec {
    pub fn for_command(cmd: PuppetCommand) -> Self {
        let (command_reg, status_reg) = match cmd.actuator() {
            riddlefish_types::Actuator::Head => (HEAD_REG, HEAD_STATUS_REG),
            riddlefish_types::Actuator::Tail => (TAIL_REG, TAIL_STATUS_REG),
            riddlefish_types::Actuator::Mouth => (MOUTH_REG, MOUTH_STATUS_REG),
        };
        // Down moves spring back to idle once the firmware has finished.
        let (request, target) = if cmd.is_raise() {
            (MOTOR_UP_REQUESTED, MOTOR_UP)
        } else {
            (MOTOR_DOWN_REQUESTED, MOTOR_IDLE)
        };
        Self {
            command_reg,
            status_reg,
            request,
            target,
        }
    }
}
