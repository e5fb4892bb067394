//! Host background-execution adapter
//!
//! Maps the host's start/stop/restart model onto controller calls. The host
//! calls [`ServiceLifecycleAdapter::on_process_start`] every time the process
//! comes up, which resumes tracking if it was left enabled. While the
//! controller is Tracking the adapter keeps an ongoing-activity indicator
//! visible.

use crate::bus::Subscription;
use crate::controller::TrackingController;
use crate::events::TrackingEvent;
use crate::types::{Result, TrackingState};
use std::fmt;
use std::sync::Arc;

/// Commands delivered by the host or process supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    Start,
    Stop,
    Reset,
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostCommand::Start => write!(f, "start"),
            HostCommand::Stop => write!(f, "stop"),
            HostCommand::Reset => write!(f, "reset"),
        }
    }
}

/// Ongoing-activity indicator (e.g. a persistent notification)
pub trait ActivityIndicator: Send + Sync {
    fn show(&self);

    fn hide(&self);
}

/// Thin shim between the host and the tracking controller
pub struct ServiceLifecycleAdapter {
    controller: TrackingController,
    _indicator_feed: Subscription,
}

impl ServiceLifecycleAdapter {
    pub fn new(controller: TrackingController, indicator: Arc<dyn ActivityIndicator>) -> Self {
        let indicator_feed = controller.bus().subscribe_with(move |event| {
            if let TrackingEvent::StateChanged { from, to } = event {
                if to == TrackingState::Tracking {
                    indicator.show();
                } else if from == TrackingState::Tracking {
                    indicator.hide();
                }
            }
        });

        Self {
            controller,
            _indicator_feed: indicator_feed,
        }
    }

    /// Called by the host whenever the process (re)starts
    ///
    /// Returns true if tracking was resumed from the persisted flag.
    pub fn on_process_start(&self) -> Result<bool> {
        let resumed = self.controller.resume_if_enabled()?;
        if resumed {
            log::info!("Host restart: tracking resumed");
        }
        Ok(resumed)
    }

    pub fn handle(&self, command: HostCommand) -> Result<()> {
        log::debug!("Host command: {}", command);
        match command {
            HostCommand::Start => self.controller.start(),
            HostCommand::Stop => self.controller.stop(),
            HostCommand::Reset => self.controller.reset(),
        }
    }

    pub fn controller(&self) -> &TrackingController {
        &self.controller
    }
}
