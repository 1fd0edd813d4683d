//! [`PuppetController`] – exclusive owner of the puppet's register bus.
//!
//! The controller runs on a dedicated OS thread.  It settles the bus, takes
//! control from the firmware's idle animation, then executes one
//! [`PuppetCommand`] at a time from a single-consumer queue, sending one
//! [`PuppetAck`] per completed command.  Commands are never pipelined: the
//! next one is only dequeued after the previous move has been observed on
//! its status register.
//!
//! Dropping the controller parks the puppet (head down) and hands control
//! back to the firmware before the bus handle itself is released.  Because
//! this lives in [`Drop`], it runs on a normal shutdown, when the command
//! channel closes, and while unwinding from a panic.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use riddlefish_types::{PuppetAck, PuppetCommand};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::bus::RegisterBus;
use crate::registers::*;

/// Timing knobs of the controller.
#[derive(Debug, Clone)]
pub struct PuppetConfig {
    /// Pause between two status polls.
    pub poll_interval: Duration,
    /// Pause after each read of the start-up settle pass.
    pub settle_delay: Duration,
    /// How long the main loop waits for a command before re-checking the
    /// shutdown flag.
    pub receive_timeout: Duration,
    /// Upper bound on each wait while parking on shutdown.
    pub park_timeout: Duration,
}

impl Default for PuppetConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            settle_delay: Duration::from_millis(200),
            receive_timeout: Duration::from_secs(1),
            park_timeout: Duration::from_secs(3),
        }
    }
}

/// Outcome of a single blocking move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The target status was observed.
    Reached,
    /// Shutdown was requested before the target was observed.
    Interrupted,
}

/// When a wait gives up.
#[derive(Clone, Copy)]
enum Until {
    Shutdown,
    Deadline(Instant),
}

/// Drives the puppet board through a [`RegisterBus`].
pub struct PuppetController<B: RegisterBus> {
    bus: B,
    config: PuppetConfig,
    shutdown: Arc<AtomicBool>,
    under_control: bool,
}

impl<B: RegisterBus> PuppetController<B> {
    pub fn new(bus: B, config: PuppetConfig, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            bus,
            config,
            shutdown,
            under_control: false,
        }
    }

    fn shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Read a register; failures are logged and reported as unknown state.
    fn read(&mut self, reg: u8) -> Option<u8> {
        match self.bus.read_register(reg) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(register = reg, error = %e, "puppet bus read failed");
                None
            }
        }
    }

    fn write(&mut self, reg: u8, value: u8) -> bool {
        match self.bus.write_register(reg, value) {
            Ok(()) => true,
            Err(e) => {
                warn!(register = reg, value, error = %e, "puppet bus write failed");
                false
            }
        }
    }

    /// Write `request` to `reg` (retrying failed writes) and poll
    /// `status_reg` until it reads `target`.
    fn drive(&mut self, reg: u8, request: u8, status_reg: u8, target: u8, until: Until) -> Completion {
        let mut requested = false;
        loop {
            let expired = match until {
                Until::Shutdown => self.shutting_down(),
                Until::Deadline(at) => Instant::now() >= at,
            };
            if expired {
                return Completion::Interrupted;
            }
            if !requested {
                requested = self.write(reg, request);
            }
            if requested && self.read(status_reg) == Some(target) {
                return Completion::Reached;
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    /// Read and discard every status register once so stale bytes are
    /// flushed off the bus.
    pub fn settle(&mut self) {
        for reg in [
            CONTROL_STATUS_REG,
            MOUTH_STATUS_REG,
            TAIL_STATUS_REG,
            HEAD_STATUS_REG,
        ] {
            let _ = self.read(reg);
            thread::sleep(self.config.settle_delay);
        }
    }

    /// Request bus control and wait until the firmware grants it.  There is
    /// no timeout; only shutdown ends the wait early.
    pub fn assume_control(&mut self) -> Completion {
        let outcome = self.drive(
            CONTROL_REG,
            CONTROL_REQUESTED,
            CONTROL_STATUS_REG,
            CONTROL_UNDER_CONTROL,
            Until::Shutdown,
        );
        if outcome == Completion::Reached {
            self.under_control = true;
            info!("puppet under control");
        }
        outcome
    }

    /// Execute one command, blocking until its target state is observed.
    pub fn execute(&mut self, cmd: PuppetCommand) -> Completion {
        let spec = MoveSpec::for_command(cmd);
        debug!(command = %cmd, "executing puppet command");
        let outcome = self.drive(
            spec.command_reg,
            spec.request,
            spec.status_reg,
            spec.target,
            Until::Shutdown,
        );
        if outcome == Completion::Interrupted {
            debug!(command = %cmd, "puppet command interrupted by shutdown");
        }
        outcome
    }

    /// Main loop: settle, take control, then serve commands until shutdown or
    /// until the command channel closes.  Consumes the controller so that its
    /// parking sequence runs when the loop exits.
    pub fn run(mut self, commands: Receiver<PuppetCommand>, acks: UnboundedSender<PuppetAck>) {
        self.settle();
        if self.assume_control() == Completion::Interrupted {
            return;
        }

        while !self.shutting_down() {
            match commands.recv_timeout(self.config.receive_timeout) {
                Ok(cmd) => {
                    if self.execute(cmd) == Completion::Reached
                        && acks.send(PuppetAck::ActionCompleted).is_err()
                    {
                        info!("ack receiver gone, puppet controller stopping");
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    info!("command channel closed, puppet controller stopping");
                    break;
                }
            }
        }
    }

    /// Head down, then hand control back to the firmware.  Each wait is
    /// bounded by `park_timeout` since the shutdown flag is usually already
    /// set at this point.
    fn park(&mut self) {
        let spec = MoveSpec::for_command(PuppetCommand::HeadDown);
        let deadline = Until::Deadline(Instant::now() + self.config.park_timeout);
        if self.drive(spec.command_reg, spec.request, spec.status_reg, spec.target, deadline)
            == Completion::Interrupted
        {
            warn!("head did not reach rest before release");
        }
        let deadline = Until::Deadline(Instant::now() + self.config.park_timeout);
        if self.drive(CONTROL_REG, CONTROL_LEAVE, CONTROL_STATUS_REG, CONTROL_IDLE, deadline)
            == Completion::Interrupted
        {
            warn!("firmware did not confirm release of control");
        }
        self.under_control = false;
        info!("puppet parked and released");
    }
}

impl<B: RegisterBus> Drop for PuppetController<B> {
    fn drop(&mut self) {
        if self.under_control {
            self.park();
        }
    }
}
