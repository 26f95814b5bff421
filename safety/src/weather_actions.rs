//! Weather status surface.
//!
//! Every evaluation is also an opportunity to notice the transition to
//! dangerous weather, so the report is routed through the emergency
//! closer before it goes back to the caller.

use crate::emergency::EmergencyCloser;
use skylid_devices::weather::WeatherReport;
use std::sync::Arc;

pub struct WeatherActions {
    closer: Arc<EmergencyCloser>,
}

impl WeatherActions {
    pub fn new(closer: Arc<EmergencyCloser>) -> Self {
        WeatherActions { closer }
    }

    pub async fn get_status(&self) -> WeatherReport {
        let report = self.closer.observatory().weather.evaluate().await;
        self.closer.maybe_trigger(report.status);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{make_weather_dangerous, sim_observatory};
    use skylid_devices::weather::WeatherStatus;
    use std::time::Duration;

    #[tokio::test]
    async fn dangerous_report_triggers_the_closer() {
        let fixture = sim_observatory();
        fixture.obs.telescope.polling_start().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        make_weather_dangerous(&fixture);

        let closer = EmergencyCloser::with_recheck(fixture.obs.clone(), Duration::from_millis(5));
        let actions = WeatherActions::new(Arc::clone(&closer));

        let report = actions.get_status().await;
        assert_eq!(report.status, WeatherStatus::Danger);
        assert!(closer.is_running());

        // let the detached sequence finish before tearing down
        for _ in 0..400 {
            if !closer.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!fixture.obs.telescope.polling());
    }
}
