//! Roof action chain.
//!
//! Opening is never vetoed by the other devices; closing is, because the
//! roof must not come down onto an exposed telescope or raised curtains.
//! A roof already in motion refuses re-entrant commands.

use crate::chain::Flow;
use crate::context::SharedObservatory;
use serde::{Deserialize, Serialize};
use skylid_devices::roof::RoofStatus;
use skylid_devices::weather::WeatherStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RoofCommand {
    Open,
    Close,
    Check,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoofResponse {
    pub status: RoofStatus,
    pub disabled: bool,
}

struct RoofMediator {
    command: RoofCommand,
    /// Status snapshotted at request entry; the guards reason about it.
    status: RoofStatus,
    disabled: bool,
}

#[derive(Debug, Clone, Copy)]
enum Step {
    WeatherGuard,
    TelescopeGuard,
    CurtainsGuard,
    Actuate,
}

const CHAIN: &[Step] = &[
    Step::WeatherGuard,
    Step::TelescopeGuard,
    Step::CurtainsGuard,
    Step::Actuate,
];

pub struct RoofActions {
    obs: SharedObservatory,
}

impl RoofActions {
    pub fn new(obs: SharedObservatory) -> Self {
        RoofActions { obs }
    }

    pub async fn handle(&self, command: RoofCommand) -> RoofResponse {
        let mut mediator = RoofMediator {
            command,
            status: self.obs.roof.get_status(),
            disabled: false,
        };

        for step in CHAIN {
            if self.run(*step, &mut mediator).await == Flow::Stop {
                break;
            }
        }

        let response = RoofResponse {
            status: self.obs.roof.get_status(),
            disabled: mediator.disabled,
        };
        tracing::debug!(status = %response.status, disabled = response.disabled, "roof action handled");
        response
    }

    async fn run(&self, step: Step, m: &mut RoofMediator) -> Flow {
        match step {
            // A shut roof stays shut while the weather is dangerous.
            Step::WeatherGuard => {
                if m.status == RoofStatus::Closed
                    && self.obs.weather.status().await == WeatherStatus::Danger
                {
                    tracing::info!("roof opening refused, weather is dangerous");
                    m.disabled = true;
                    return Flow::Stop;
                }
                Flow::Continue
            }
            // An open roof only closes over a secured telescope.
            Step::TelescopeGuard => {
                if m.status == RoofStatus::Opened && !self.obs.telescope_is_secure() {
                    tracing::info!("roof closing refused, telescope is not secure");
                    m.disabled = true;
                    return Flow::Stop;
                }
                Flow::Continue
            }
            // ...and only once both curtains are latched shut.
            Step::CurtainsGuard => {
                if m.status == RoofStatus::Opened && !self.obs.curtains_are_secure() {
                    tracing::info!("roof closing refused, curtains are not disabled");
                    m.disabled = true;
                    return Flow::Stop;
                }
                Flow::Continue
            }
            Step::Actuate => {
                match m.status {
                    RoofStatus::Opening | RoofStatus::Closing => {
                        m.disabled = true;
                    }
                    _ => match m.command {
                        RoofCommand::Open => {
                            self.obs.roof.open().await;
                        }
                        RoofCommand::Close => {
                            self.obs.roof.close().await;
                        }
                        RoofCommand::Check => {}
                    },
                }
                Flow::Stop
            }
        }
    }
}
