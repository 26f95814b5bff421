//! Telescope action chain.
//!
//! Connection control, the deferred job queue actions (sync, park,
//! flat) and the flat-light coupling, all gated on the telescope power
//! switch.

use crate::chain::Flow;
use crate::context::SharedObservatory;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use skylid_devices::switch::{SwitchKey, SwitchStatus};
use skylid_devices::telescope::{
    AltazimutalCoords, EquatorialCoords, TelescopeSpeed, TelescopeStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TelescopeCommand {
    Connect,
    Disconnect,
    Sync,
    Park,
    Flat,
    Check,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TelescopeRequest {
    pub command: TelescopeCommand,
    /// Couple the dome light to the slewing state.
    pub autolight: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TelescopeDisabled {
    pub connect: bool,
    pub sync: bool,
    pub park: bool,
    pub flat: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TelescopeResponse {
    pub status: TelescopeStatus,
    pub speed: TelescopeSpeed,
    pub eq: Option<EquatorialCoords>,
    pub aa: Option<AltazimutalCoords>,
    pub airmass: Option<f64>,
    pub disabled: TelescopeDisabled,
}

struct TelescopeMediator {
    request: TelescopeRequest,
    status: TelescopeStatus,
    speed: TelescopeSpeed,
    disabled: TelescopeDisabled,
}

#[derive(Debug, Clone, Copy)]
enum Step {
    PowerGuard,
    Connect,
    DisconnectedGuard,
    Disconnect,
    Sync,
    Park,
    Flat,
    FlatLight,
    AutoLight,
}

const CHAIN: &[Step] = &[
    Step::PowerGuard,
    Step::Connect,
    Step::DisconnectedGuard,
    Step::Disconnect,
    Step::Sync,
    Step::Park,
    Step::Flat,
    Step::FlatLight,
    Step::AutoLight,
];

pub struct TelescopeActions {
    obs: SharedObservatory,
}

impl TelescopeActions {
    pub fn new(obs: SharedObservatory) -> Self {
        TelescopeActions { obs }
    }

    pub async fn handle(&self, request: TelescopeRequest) -> TelescopeResponse {
        let snapshot = self.obs.telescope.snapshot();
        let mut mediator = TelescopeMediator {
            request,
            status: snapshot.status,
            speed: snapshot.speed,
            disabled: TelescopeDisabled::default(),
        };

        for step in CHAIN {
            if self.run(*step, &mut mediator).await == Flow::Stop {
                break;
            }
        }

        let snapshot = self.obs.telescope.snapshot();
        TelescopeResponse {
            status: mediator.status,
            speed: mediator.speed,
            eq: snapshot.eq,
            aa: snapshot.aa,
            airmass: snapshot.airmass,
            disabled: mediator.disabled,
        }
    }

    async fn run(&self, step: Step, m: &mut TelescopeMediator) -> Flow {
        let telescope = &self.obs.telescope;
        match step {
            // Nothing works over a powered-off mount, and the position
            // can no longer be vouched for.
            Step::PowerGuard => {
                let power = self.obs.switches.get(SwitchKey::TelescopePower);
                if power.get_status() == SwitchStatus::Off {
                    m.disabled = TelescopeDisabled {
                        connect: true,
                        sync: true,
                        park: true,
                        flat: true,
                    };
                    m.status = TelescopeStatus::Lost;
                    m.speed = TelescopeSpeed::Error;
                    return Flow::Stop;
                }
                Flow::Continue
            }
            Step::Connect => {
                if m.request.command == TelescopeCommand::Connect {
                    telescope.polling_start().await;
                    return Flow::Stop;
                }
                Flow::Continue
            }
            Step::DisconnectedGuard => {
                if m.status == TelescopeStatus::Disconnected || !telescope.polling() {
                    m.speed = TelescopeSpeed::Error;
                    return Flow::Stop;
                }
                Flow::Continue
            }
            Step::Disconnect => {
                if m.request.command == TelescopeCommand::Disconnect {
                    telescope.polling_end().await;
                    return Flow::Stop;
                }
                Flow::Continue
            }
            Step::Sync => {
                if m.request.command == TelescopeCommand::Sync {
                    // register the park position as of power-on
                    let power = self.obs.switches.get(SwitchKey::TelescopePower);
                    let started_at = power.turned_on_at().unwrap_or_else(Utc::now);
                    telescope.queue_sync(started_at);
                }
                Flow::Continue
            }
            Step::Park => {
                if m.request.command == TelescopeCommand::Park {
                    telescope.queue_park();
                }
                Flow::Continue
            }
            Step::Flat => {
                if m.request.command == TelescopeCommand::Flat {
                    telescope.queue_flat();
                }
                Flow::Continue
            }
            // At the flat position with the panel light off the drive
            // has no business tracking.
            Step::FlatLight => {
                let light = self.obs.switches.get(SwitchKey::FlatLight);
                if m.status == TelescopeStatus::Flatter && light.get_status() == SwitchStatus::Off {
                    telescope.queue_set_speed(TelescopeSpeed::NotTracking);
                }
                Flow::Continue
            }
            Step::AutoLight => {
                if m.request.autolight {
                    let dome_light = self.obs.switches.get(SwitchKey::DomeLight);
                    if m.speed == TelescopeSpeed::Slewing {
                        dome_light.on().await;
                    } else {
                        dome_light.off().await;
                    }
                }
                Flow::Stop
            }
        }
    }
}
