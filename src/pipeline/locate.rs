use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::types::activity::{Activity, Identity, TrackPoint};

/// How a client refers to a point: the coordinates it rendered, plus either
/// the timestamp or the creation index.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PointQuery {
    #[serde(alias = "lat")]
    pub latitude: Decimal,
    #[serde(alias = "lng")]
    pub longitude: Decimal,
    #[serde(default, alias = "time")]
    pub time_millis: Option<i64>,
    #[serde(default)]
    pub index: Option<u32>,
    /// Lap to search first.
    #[serde(default)]
    pub lap_hint: Option<usize>,
}

impl PointQuery {
    pub fn by_time(latitude: Decimal, longitude: Decimal, time_millis: i64) -> Self {
        Self {
            latitude,
            longitude,
            time_millis: Some(time_millis),
            index: None,
            lap_hint: None,
        }
    }

    pub fn by_index(latitude: Decimal, longitude: Decimal, index: u32) -> Self {
        Self {
            latitude,
            longitude,
            time_millis: None,
            index: Some(index),
            lap_hint: None,
        }
    }

    pub fn with_lap_hint(mut self, lap: usize) -> Self {
        self.lap_hint = Some(lap);
        self
    }

    pub fn matches(&self, point: &TrackPoint) -> bool {
        if point.position.latitude != self.latitude || point.position.longitude != self.longitude {
            return false;
        }
        let time_matches = match (self.time_millis, point.identity) {
            (Some(millis), Identity::Time(time)) => time.timestamp_millis() == millis,
            _ => false,
        };
        let index_matches = match (self.index, point.identity) {
            (Some(wanted), Identity::Index(index)) => wanted == index,
            _ => false,
        };
        time_matches || index_matches
    }
}

/// `(lap_idx, point_idx)` of the first point matching `query`.
pub fn locate_point(activity: &Activity, query: &PointQuery) -> Option<(usize, usize)> {
    let hint = query.lap_hint.filter(|&idx| idx < activity.laps.len());
    let order = hint
        .into_iter()
        .chain((0..activity.laps.len()).filter(|&idx| Some(idx) != hint));

    for lap_idx in order {
        let lap = &activity.laps[lap_idx];
        if let Some(point_idx) = lap.tracks.iter().position(|p| query.matches(p)) {
            return Some((lap_idx, point_idx));
        }
    }
    None
}

pub fn locate_lap_by_start(activity: &Activity, start: DateTime<Utc>) -> Option<usize> {
    activity
        .laps
        .iter()
        .position(|lap| lap.start_time() == Some(start))
}

pub fn locate_lap_by_index(activity: &Activity, index: usize) -> Option<usize> {
    (index < activity.laps.len()).then_some(index)
}
