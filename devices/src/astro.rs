//! Horizontal/equatorial coordinate conversions.
//!
//! The classic spherical-trigonometry forms over Greenwich mean sidereal
//! time. Accuracy is far below the 2-degree tolerance the pointing-zone
//! checks operate with, so no precession or refraction terms are carried.

use crate::telescope::{AltazimutalCoords, EquatorialCoords};
use chrono::{DateTime, Utc};

/// Seam for alt/az <-> ra/dec conversions so the control logic can be
/// exercised against canned transforms.
pub trait CoordinateTransform: Send + Sync {
    /// Equatorial coordinates (ra in hours, dec in degrees) of the given
    /// horizontal position at the given instant.
    fn altaz_to_radec(&self, aa: AltazimutalCoords, at: DateTime<Utc>) -> EquatorialCoords;

    /// Horizontal position of the given equatorial coordinates at the
    /// given instant.
    fn radec_to_altaz(&self, eq: EquatorialCoords, at: DateTime<Utc>) -> AltazimutalCoords;
}

/// Observer site used by the default transform.
#[derive(Debug, Clone, Copy)]
pub struct Site {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub height_m: f64,
}

fn julian_day(at: DateTime<Utc>) -> f64 {
    at.timestamp() as f64 / 86_400.0 + 2_440_587.5
}

impl Site {
    /// Local mean sidereal time in hours, [0, 24).
    pub fn local_sidereal_hours(&self, at: DateTime<Utc>) -> f64 {
        let d = julian_day(at) - 2_451_545.0;
        let gmst = 18.697_374_558 + 24.065_709_824_419_08 * d;
        (gmst + self.longitude_deg / 15.0).rem_euclid(24.0)
    }
}

impl CoordinateTransform for Site {
    fn altaz_to_radec(&self, aa: AltazimutalCoords, at: DateTime<Utc>) -> EquatorialCoords {
        let lat = self.latitude_deg.to_radians();
        let alt = aa.alt.to_radians();
        let az = aa.az.to_radians();

        let sin_dec = alt.sin() * lat.sin() + alt.cos() * lat.cos() * az.cos();
        let dec = sin_dec.asin();
        let ha = (-az.sin() * alt.cos()).atan2(alt.sin() * lat.cos() - alt.cos() * lat.sin() * az.cos());

        let ra = (self.local_sidereal_hours(at) - ha.to_degrees() / 15.0).rem_euclid(24.0);
        EquatorialCoords {
            ra,
            dec: dec.to_degrees(),
        }
    }

    fn radec_to_altaz(&self, eq: EquatorialCoords, at: DateTime<Utc>) -> AltazimutalCoords {
        let lat = self.latitude_deg.to_radians();
        let dec = eq.dec.to_radians();
        let ha = ((self.local_sidereal_hours(at) - eq.ra) * 15.0).to_radians();

        let sin_alt = lat.sin() * dec.sin() + lat.cos() * dec.cos() * ha.cos();
        let alt = sin_alt.asin();
        let az = (-dec.cos() * ha.sin()).atan2(dec.sin() * lat.cos() - dec.cos() * lat.sin() * ha.cos());

        AltazimutalCoords {
            alt: alt.to_degrees(),
            az: az.to_degrees().rem_euclid(360.0),
        }
    }
}

/// Relative optical path length through the atmosphere (sec z) at the
/// given altitude, rounded to three decimals.
pub fn airmass(alt_deg: f64) -> f64 {
    let zenith = (90.0 - alt_deg).to_radians();
    let sec_z = 1.0 / zenith.cos();
    (sec_z * 1000.0).round() / 1000.0
}
