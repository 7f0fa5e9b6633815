use crate::pipeline::geometry;
use crate::types::activity::{Identity, Lap, LapStats, TrackPoint};

/// Distance and speed of one point relative to its predecessor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub distance: f64,
    pub elapsed: f64,
    pub speed: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LapSummary {
    pub stats: LapStats,
    /// One entry per point; `None` for a first point without an anchor.
    pub segments: Vec<Option<Segment>>,
    pub start: Option<Identity>,
}

/// Derives a lap's aggregates from its points without touching them.
pub fn summarize(points: &[TrackPoint], anchor: Option<&TrackPoint>) -> LapSummary {
    if points.is_empty() {
        return LapSummary {
            stats: LapStats::default(),
            segments: Vec::new(),
            start: None,
        };
    }

    let mut segments = Vec::with_capacity(points.len());
    let mut previous = anchor;
    for current in points {
        segments.push(previous.map(|prev| segment(prev, current)));
        previous = Some(current);
    }

    let measured: Vec<&Segment> = segments.iter().flatten().collect();
    let distance: f64 = measured.iter().map(|s| s.distance).sum();
    let elapsed: f64 = measured.iter().map(|s| s.elapsed).sum();
    let max_speed = measured.iter().map(|s| s.speed).fold(0.0, f64::max);
    let avg_speed = if measured.is_empty() {
        0.0
    } else {
        measured.iter().map(|s| s.speed).sum::<f64>() / measured.len() as f64
    };

    let heart_rates: Vec<u16> = points.iter().filter_map(|p| p.heart_rate).collect();
    let max_hr = heart_rates.iter().copied().max();
    let avg_hr = if heart_rates.is_empty() {
        None
    } else {
        Some(heart_rates.iter().map(|&hr| hr as f64).sum::<f64>() / heart_rates.len() as f64)
    };

    LapSummary {
        stats: LapStats {
            total_time_seconds: non_zero(elapsed),
            distance_meters: non_zero(distance),
            maximum_speed: non_zero(max_speed),
            average_speed: non_zero(avg_speed),
            average_heart_rate: avg_hr.and_then(non_zero),
            maximum_heart_rate: max_hr.filter(|&hr| hr > 0),
        },
        segments,
        start: points[0].time().map(Identity::Time),
    }
}

/// Restores a lap's derived values. Point distance/speed are filled only
/// where unset, so values carried by the source file survive.
pub fn recompute_lap(lap: &mut Lap, anchor: Option<&TrackPoint>) {
    let summary = summarize(&lap.tracks, anchor);

    for (point, segment) in lap.tracks.iter_mut().zip(&summary.segments) {
        if let Some(segment) = segment {
            point.distance.get_or_insert(segment.distance);
            point.speed.get_or_insert(segment.speed);
        }
    }
    if let Some(start) = summary.start {
        lap.identity = start;
    }
    lap.set_stats(summary.stats);
}

/// Recomputes every lap in order, each anchored on the lap before it.
pub fn recompute_all(laps: &mut [Lap]) {
    let mut anchor: Option<TrackPoint> = None;
    for lap in laps.iter_mut() {
        recompute_lap(lap, anchor.as_ref());
        if let Some(last) = lap.last_point() {
            anchor = Some(last.clone());
        }
    }
}

fn segment(previous: &TrackPoint, current: &TrackPoint) -> Segment {
    let distance = geometry::distance(&previous.position, &current.position);
    let elapsed = geometry::elapsed_seconds(previous, current).max(0.0);
    let speed = if elapsed > 0.0 { distance / elapsed } else { 0.0 };
    Segment {
        distance,
        elapsed,
        speed,
    }
}

fn non_zero(value: f64) -> Option<f64> {
    (value != 0.0 && value.is_finite()).then_some(value)
}
