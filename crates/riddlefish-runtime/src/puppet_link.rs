//! Orchestrator side of the puppet command/ack channel.
//!
//! The puppet worker consumes commands from a `std::sync::mpsc` queue on its
//! own thread and answers every completed move with one
//! [`PuppetAck::ActionCompleted`].  [`PuppetLink`] sends one command and
//! awaits its ack before returning, so command `k + 1` is never queued before
//! ack `k` has arrived.

use std::sync::mpsc::Sender;

use async_trait::async_trait;
use riddlefish_types::{PuppetAck, PuppetCommand};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

/// Something that performs gestures one at a time.
#[async_trait]
pub trait Puppet: Send {
    /// Perform `cmd` and wait until it has completed.
    ///
    /// Returns `false` when the gesture was skipped because the puppet is
    /// unavailable.  Never fails: the puppet is a separate fault domain.
    async fn perform(&mut self, cmd: PuppetCommand) -> bool;
}

/// Channel pair wired to a running puppet worker.
pub struct PuppetLink {
    commands: Sender<PuppetCommand>,
    acks: UnboundedReceiver<PuppetAck>,
    lost: bool,
}

impl PuppetLink {
    pub fn new(commands: Sender<PuppetCommand>, acks: UnboundedReceiver<PuppetAck>) -> Self {
        Self {
            commands,
            acks,
            lost: false,
        }
    }

    /// Whether the worker has gone away.
    pub fn is_lost(&self) -> bool {
        self.lost
    }

    fn mark_lost(&mut self, cmd: PuppetCommand) {
        if !self.lost {
            warn!(%cmd, "puppet worker is gone; gestures will be skipped");
        }
        self.lost = true;
    }
}

#[async_trait]
impl Puppet for PuppetLink {
    async fn perform(&mut self, cmd: PuppetCommand) -> bool {
        if self.lost {
            debug!(%cmd, "skipping gesture");
            return false;
        }
        if self.commands.send(cmd).is_err() {
            self.mark_lost(cmd);
            return false;
        }
        match self.acks.recv().await {
            Some(PuppetAck::ActionCompleted) => {
                debug!(%cmd, "gesture completed");
                true
            }
            None => {
                self.mark_lost(cmd);
                false
            }
        }
    }
}
