//! Curtain action chain.
//!
//! The curtains only operate under an open roof with the telescope poll
//! worker alive and the weather below the danger threshold. Every
//! request additionally re-derives the step targets from the current
//! telescope pointing and issues the moves.

use crate::chain::Flow;
use crate::context::SharedObservatory;
use serde::{Deserialize, Serialize};
use skylid_devices::curtain::{step_targets, CurtainStatus};
use skylid_devices::roof::RoofStatus;
use skylid_devices::telescope::TelescopeSpeed;
use skylid_devices::weather::WeatherStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CurtainsCommand {
    Enable,
    Disable,
    Check,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CurtainSide {
    pub status: CurtainStatus,
    pub step: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurtainsResponse {
    pub east: CurtainSide,
    pub west: CurtainSide,
    pub disabled: bool,
}

struct CurtainsMediator {
    command: CurtainsCommand,
    status_east: CurtainStatus,
    status_west: CurtainStatus,
    disabled: bool,
}

#[derive(Debug, Clone, Copy)]
enum Step {
    RoofGuard,
    WeatherGuard,
    TelescopeGuard,
    Disable,
    Enable,
    Move,
}

const CHAIN: &[Step] = &[
    Step::RoofGuard,
    Step::WeatherGuard,
    Step::TelescopeGuard,
    Step::Disable,
    Step::Enable,
    Step::Move,
];

pub struct CurtainsActions {
    obs: SharedObservatory,
}

impl CurtainsActions {
    pub fn new(obs: SharedObservatory) -> Self {
        CurtainsActions { obs }
    }

    pub async fn handle(&self, command: CurtainsCommand) -> CurtainsResponse {
        let mut mediator = CurtainsMediator {
            command,
            status_east: self.obs.curtain_east.get_status(),
            status_west: self.obs.curtain_west.get_status(),
            disabled: false,
        };

        for step in CHAIN {
            if self.run(*step, &mut mediator).await == Flow::Stop {
                break;
            }
        }

        CurtainsResponse {
            east: CurtainSide {
                status: self.obs.curtain_east.get_status(),
                step: self.obs.curtain_east.step(),
            },
            west: CurtainSide {
                status: self.obs.curtain_west.get_status(),
                step: self.obs.curtain_west.step(),
            },
            disabled: mediator.disabled,
        }
    }

    async fn run(&self, step: Step, m: &mut CurtainsMediator) -> Flow {
        match step {
            Step::RoofGuard => {
                if self.obs.roof.get_status() != RoofStatus::Opened {
                    tracing::info!("curtain action refused, roof is not open");
                    self.obs.curtain_east.disable().await;
                    self.obs.curtain_west.disable().await;
                    m.disabled = true;
                    return Flow::Stop;
                }
                Flow::Continue
            }
            Step::WeatherGuard => {
                if self.obs.weather.status().await == WeatherStatus::Danger {
                    tracing::info!("curtain action refused, weather is dangerous");
                    m.disabled = true;
                    return Flow::Stop;
                }
                Flow::Continue
            }
            Step::TelescopeGuard => {
                if !self.obs.telescope.polling() {
                    tracing::info!("curtain action refused, telescope is not polling");
                    self.obs.curtain_east.disable().await;
                    self.obs.curtain_west.disable().await;
                    m.disabled = true;
                    return Flow::Stop;
                }
                Flow::Continue
            }
            Step::Disable => {
                if m.command == CurtainsCommand::Disable
                    && m.status_east.at_rest()
                    && m.status_west.at_rest()
                {
                    self.obs.curtain_east.disable().await;
                    self.obs.curtain_west.disable().await;
                }
                Flow::Continue
            }
            Step::Enable => {
                if m.command == CurtainsCommand::Enable {
                    self.obs.curtain_east.enable();
                    self.obs.curtain_west.enable();
                }
                Flow::Continue
            }
            Step::Move => {
                let snapshot = self.obs.telescope.snapshot();
                let at_rate = matches!(
                    snapshot.speed,
                    TelescopeSpeed::Tracking | TelescopeSpeed::NotTracking
                );
                if at_rate {
                    if let Some(aa) = snapshot.aa {
                        let targets = step_targets(aa, snapshot.status, &self.obs.curtain_bounds);
                        tracing::debug!(?targets, "curtain step targets");
                        if let Some(target) = targets.east {
                            self.obs.curtain_east.move_to(target).await;
                        }
                        if let Some(target) = targets.west {
                            self.obs.curtain_west.move_to(target).await;
                        }
                    }
                }
                Flow::Stop
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{aa, make_weather_dangerous, sim_observatory};
    use std::time::Duration;

    #[tokio::test]
    async fn refused_while_roof_is_shut() {
        let fixture = sim_observatory();
        fixture.roof.force_closed();
        fixture.obs.telescope.polling_start().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let response = CurtainsActions::new(fixture.obs.clone())
            .handle(CurtainsCommand::Enable)
            .await;

        assert!(response.disabled);
        assert_eq!(response.east.status, CurtainStatus::Disabled);
        assert_eq!(response.west.status, CurtainStatus::Disabled);
        fixture.obs.telescope.polling_end().await;
    }

    #[tokio::test]
    async fn refused_while_weather_is_dangerous() {
        let fixture = sim_observatory();
        fixture.obs.telescope.polling_start().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        make_weather_dangerous(&fixture);

        let response = CurtainsActions::new(fixture.obs.clone())
            .handle(CurtainsCommand::Enable)
            .await;

        assert!(response.disabled);
        assert_eq!(response.east.status, CurtainStatus::Disabled);
        fixture.obs.telescope.polling_end().await;
    }

    #[tokio::test]
    async fn refused_while_telescope_is_not_polling() {
        let fixture = sim_observatory();

        let response = CurtainsActions::new(fixture.obs.clone())
            .handle(CurtainsCommand::Enable)
            .await;

        assert!(response.disabled);
        assert_eq!(response.east.status, CurtainStatus::Disabled);
    }

    #[tokio::test]
    async fn enable_then_move_follows_the_telescope() {
        let fixture = sim_observatory();
        fixture.telescope.set_pointing(aa(40.0, 260.0));
        fixture.obs.telescope.polling_start().await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        let response = CurtainsActions::new(fixture.obs.clone())
            .handle(CurtainsCommand::Enable)
            .await;

        // telescope west of the meridian: east fully open, west interpolated
        assert!(!response.disabled);
        assert_eq!(response.east.step, 155);
        assert_eq!(response.east.status, CurtainStatus::Opened);
        assert_eq!(response.west.step, 116);
        assert_eq!(response.west.status, CurtainStatus::Enabled);
        fixture.obs.telescope.polling_end().await;
    }

    #[tokio::test]
    async fn disable_latches_curtains_shut() {
        let fixture = sim_observatory();
        fixture.telescope.set_pointing(aa(40.0, 260.0));
        fixture.obs.telescope.polling_start().await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        let actions = CurtainsActions::new(fixture.obs.clone());
        actions.handle(CurtainsCommand::Enable).await;
        // point the telescope back down so the post-disable move stays at zero
        fixture.telescope.set_pointing(aa(5.0, 0.0));
        tokio::time::sleep(Duration::from_millis(30)).await;

        let response = actions.handle(CurtainsCommand::Disable).await;

        assert_eq!(response.east.status, CurtainStatus::Disabled);
        assert_eq!(response.west.status, CurtainStatus::Disabled);
        assert_eq!(response.east.step, 0);
        assert_eq!(response.west.step, 0);
        fixture.obs.telescope.polling_end().await;
    }
}
