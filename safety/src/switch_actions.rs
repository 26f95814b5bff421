//! Mains switch action chain.
//!
//! Plain relay toggles, with three couplings: powering the telescope off
//! also stops its poll worker, powering it on is refused in dangerous
//! weather, and the flat-panel light resumes tracking when lit at the
//! flat position.

use crate::chain::Flow;
use crate::context::SharedObservatory;
use serde::{Deserialize, Serialize};
use skylid_devices::switch::{SwitchKey, SwitchStatus};
use skylid_devices::telescope::{TelescopeSpeed, TelescopeStatus};
use skylid_devices::weather::WeatherStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SwitchCommand {
    TurnOn,
    TurnOff,
    Check,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SwitchRequest {
    pub key: SwitchKey,
    pub command: SwitchCommand,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwitchResponse {
    pub key: SwitchKey,
    pub status: SwitchStatus,
    pub disabled: bool,
}

struct SwitchMediator {
    request: SwitchRequest,
    disabled: bool,
}

#[derive(Debug, Clone, Copy)]
enum Step {
    WeatherGuard,
    TelescopePower,
    FlatLight,
    Apply,
}

const CHAIN: &[Step] = &[
    Step::WeatherGuard,
    Step::TelescopePower,
    Step::FlatLight,
    Step::Apply,
];

pub struct SwitchActions {
    obs: SharedObservatory,
}

impl SwitchActions {
    pub fn new(obs: SharedObservatory) -> Self {
        SwitchActions { obs }
    }

    pub async fn handle(&self, request: SwitchRequest) -> SwitchResponse {
        let mut mediator = SwitchMediator {
            request,
            disabled: false,
        };

        for step in CHAIN {
            if self.run(*step, &mut mediator).await == Flow::Stop {
                break;
            }
        }

        SwitchResponse {
            key: request.key,
            status: self.obs.switches.get(request.key).get_status(),
            disabled: mediator.disabled,
        }
    }

    async fn run(&self, step: Step, m: &mut SwitchMediator) -> Flow {
        let request = m.request;
        let control = self.obs.switches.get(request.key);
        match step {
            // Never energize the telescope into a storm.
            Step::WeatherGuard => {
                if request.key == SwitchKey::TelescopePower
                    && request.command == SwitchCommand::TurnOn
                    && self.obs.weather.status().await == WeatherStatus::Danger
                {
                    tracing::info!("telescope power-on refused, weather is dangerous");
                    m.disabled = true;
                    return Flow::Stop;
                }
                Flow::Continue
            }
            // Cutting the telescope mains also stops the poll worker,
            // not just the buttons in front of it.
            Step::TelescopePower => {
                if request.key == SwitchKey::TelescopePower
                    && request.command == SwitchCommand::TurnOff
                {
                    control.off().await;
                    self.obs.telescope.polling_end().await;
                    return Flow::Stop;
                }
                Flow::Continue
            }
            // Lighting the flat panel while the mount sits at the flat
            // position puts the drive back into tracking.
            Step::FlatLight => {
                if request.key == SwitchKey::FlatLight
                    && request.command == SwitchCommand::TurnOn
                    && self.obs.telescope.snapshot().status == TelescopeStatus::Flatter
                {
                    control.on().await;
                    self.obs.telescope.queue_set_speed(TelescopeSpeed::Tracking);
                    return Flow::Stop;
                }
                Flow::Continue
            }
            Step::Apply => {
                match request.command {
                    SwitchCommand::TurnOn => control.on().await,
                    SwitchCommand::TurnOff => control.off().await,
                    SwitchCommand::Check => {}
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
    async fn telescope_power_off_stops_the_poll_worker() {
        let fixture = sim_observatory();
        let actions = SwitchActions::new(fixture.obs.clone());
        actions
            .handle(SwitchRequest {
                key: SwitchKey::TelescopePower,
                command: SwitchCommand::TurnOn,
            })
            .await;
        fixture.obs.telescope.polling_start().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let response = actions
            .handle(SwitchRequest {
                key: SwitchKey::TelescopePower,
                command: SwitchCommand::TurnOff,
            })
            .await;

        assert_eq!(response.status, SwitchStatus::Off);
        assert!(!fixture.obs.telescope.polling());
    }

    #[tokio::test]
    async fn telescope_power_on_refused_in_dangerous_weather() {
        let fixture = sim_observatory();
        make_weather_dangerous(&fixture);
        let actions = SwitchActions::new(fixture.obs.clone());

        let response = actions
            .handle(SwitchRequest {
                key: SwitchKey::TelescopePower,
                command: SwitchCommand::TurnOn,
            })
            .await;

        assert!(response.disabled);
        assert_eq!(response.status, SwitchStatus::Off);
    }

    #[tokio::test]
    async fn other_switches_toggle_in_any_weather() {
        let fixture = sim_observatory();
        make_weather_dangerous(&fixture);
        let actions = SwitchActions::new(fixture.obs.clone());

        let response = actions
            .handle(SwitchRequest {
                key: SwitchKey::DomeLight,
                command: SwitchCommand::TurnOn,
            })
            .await;

        assert!(!response.disabled);
        assert_eq!(response.status, SwitchStatus::On);
    }

    #[tokio::test]
    async fn flat_light_at_flat_position_resumes_tracking() {
        let fixture = sim_observatory();
        fixture.telescope.set_pointing(aa(10.0, 180.0));
        fixture
            .telescope
            .set_speed_reading(TelescopeSpeed::NotTracking);
        fixture.obs.telescope.polling_start().await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        let actions = SwitchActions::new(fixture.obs.clone());
        actions
            .handle(SwitchRequest {
                key: SwitchKey::FlatLight,
                command: SwitchCommand::TurnOn,
            })
            .await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(
            fixture.obs.switches.get(SwitchKey::FlatLight).get_status(),
            SwitchStatus::On
        );
        assert_eq!(
            fixture.obs.telescope.snapshot().speed,
            TelescopeSpeed::Tracking
        );
        fixture.obs.telescope.polling_end().await;
    }
}
