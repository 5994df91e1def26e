//! Daytime-only gating on the frame clock.
//!
//! Sunrise and sunset come from the NOAA sunrise equation (about a minute
//! of error at mid latitudes). The active period runs from sunrise minus
//! the margin to sunset plus the margin, in the local time frames are
//! stamped with.

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

use crate::config::DaylightSettings;

const J2000: f64 = 2_451_545.0;
const OBLIQUITY_DEG: f64 = 23.4397;
/// Refraction plus the solar semi-diameter.
const HORIZON_DEG: f64 = -0.833;

/// Sun events for one UTC date.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SunTimes {
    /// Sunrise and sunset in UTC.
    Window {
        rise: NaiveDateTime,
        set: NaiveDateTime,
    },
    /// The sun stays up.
    Midnight,
    /// The sun stays down.
    PolarNight,
}

/// Sunrise and sunset in UTC for `date` at the given position.
/// Longitude is positive east.
pub fn sun_times(date: NaiveDate, latitude: f64, longitude: f64) -> SunTimes {
    let days = (date - epoch()).num_days() as f64;
    let mean_solar_noon = days - longitude / 360.0;

    let anomaly = (357.5291 + 0.985_600_28 * mean_solar_noon).rem_euclid(360.0);
    let m = anomaly.to_radians();
    let center = 1.9148 * m.sin() + 0.02 * (2.0 * m).sin() + 0.0003 * (3.0 * m).sin();
    let ecliptic_lon = (anomaly + center + 282.9372).rem_euclid(360.0).to_radians();
    let transit =
        J2000 + mean_solar_noon + 0.0053 * m.sin() - 0.0069 * (2.0 * ecliptic_lon).sin();

    let sin_dec = ecliptic_lon.sin() * OBLIQUITY_DEG.to_radians().sin();
    let cos_dec = (1.0 - sin_dec * sin_dec).sqrt();
    let phi = latitude.to_radians();
    let cos_hour_angle =
        (HORIZON_DEG.to_radians().sin() - phi.sin() * sin_dec) / (phi.cos() * cos_dec);

    if cos_hour_angle < -1.0 {
        return SunTimes::Midnight;
    }
    if cos_hour_angle > 1.0 {
        return SunTimes::PolarNight;
    }
    let half_day = cos_hour_angle.acos().to_degrees() / 360.0;

    // Julian day number at 00:00 UTC on `date`.
    let midnight_jd = J2000 - 0.5 + days;
    let midnight = date.and_time(NaiveTime::default());
    let at = |jd: f64| {
        midnight + Duration::milliseconds(((jd - midnight_jd) * 86_400_000.0).round() as i64)
    };
    SunTimes::Window {
        rise: at(transit - half_day),
        set: at(transit + half_day),
    }
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default()
}

/// Local active period for one date, margins included.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActivePeriod {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ActivePeriod {
    pub fn contains(&self, now: NaiveDateTime) -> bool {
        self.start <= now && now <= self.end
    }
}

// -------------------- Gate --------------------

/// Admits frames whose capture time falls inside the day's active period.
pub struct DaylightGate {
    settings: DaylightSettings,
    cached: Option<(NaiveDate, Option<ActivePeriod>)>,
    active: Option<bool>,
}

impl DaylightGate {
    pub fn new(settings: DaylightSettings) -> Self {
        Self {
            settings,
            cached: None,
            active: None,
        }
    }

    /// `None` when the sun never rises on `date`.
    pub fn active_period(&self, date: NaiveDate) -> Option<ActivePeriod> {
        let margin = Duration::seconds((self.settings.margin_minutes * 60.0).round() as i64);
        match sun_times(date, self.settings.latitude, self.settings.longitude) {
            SunTimes::Window { rise, set } => Some(ActivePeriod {
                start: self.to_local(rise) - margin,
                end: self.to_local(set) + margin,
            }),
            SunTimes::Midnight => {
                let start = date.and_time(NaiveTime::default());
                Some(ActivePeriod {
                    start,
                    end: start + Duration::days(1),
                })
            }
            SunTimes::PolarNight => None,
        }
    }

    /// Whether a frame captured at `now` should be processed. Logs each
    /// switch between active and paused.
    pub fn admit(&mut self, now: NaiveDateTime) -> bool {
        let date = now.date();
        let period = match self.cached {
            Some((cached, period)) if cached == date => period,
            _ => {
                let period = self.active_period(date);
                if let Some(p) = &period {
                    log::info!("active period for {}: {} to {}", date, p.start, p.end);
                } else {
                    log::info!("no daylight on {}", date);
                }
                self.cached = Some((date, period));
                period
            }
        };
        let active = period.is_some_and(|p| p.contains(now));
        if self.active != Some(active) {
            if active {
                log::info!("within active period at {}, resuming", now);
            } else {
                log::info!("outside active period at {}, pausing", now);
            }
            self.active = Some(active);
        }
        active
    }

    fn to_local(&self, utc: NaiveDateTime) -> NaiveDateTime {
        match self.settings.utc_offset_hours {
            Some(hours) => utc + Duration::minutes((hours * 60.0).round() as i64),
            None => Local.from_utc_datetime(&utc).naive_local(),
        }
    }
}
