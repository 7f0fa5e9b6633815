//! Structural edits on an activity.
//!
//! Each operation works on a clone and returns it only when every step
//! succeeded, so a failed edit never leaves a half-applied activity behind.

use chrono::{DateTime, Utc};

use crate::error::EditError;
use crate::pipeline::aggregate::recompute_lap;
use crate::pipeline::locate::{locate_lap_by_index, locate_lap_by_start, locate_point, PointQuery};
use crate::types::activity::{Activity, Identity, Lap};
use crate::types::color::normalize_hex;

/// Removes one point. A lap left without points is removed with it.
pub fn remove_point(activity: &Activity, query: &PointQuery) -> Result<Activity, EditError> {
    let (lap_idx, point_idx) = locate_point(activity, query).ok_or(EditError::PointNotFound)?;
    let mut edited = activity.clone();

    let lap = &mut edited.laps[lap_idx];
    let was_last = point_idx + 1 == lap.tracks.len();
    lap.tracks.remove(point_idx);

    if lap.tracks.is_empty() {
        edited.laps.remove(lap_idx);
        reanchor_lap(&mut edited, lap_idx);
    } else {
        if let Some(successor) = lap.tracks.get_mut(point_idx) {
            successor.clear_derived();
        }
        refresh_lap(&mut edited, lap_idx);
        if was_last {
            reanchor_lap(&mut edited, lap_idx + 1);
        }
    }

    edited.renumber_laps();
    Ok(edited)
}

/// Splits a lap before the located point; the point opens the new lap.
pub fn split_lap(activity: &Activity, query: &PointQuery) -> Result<Activity, EditError> {
    let (lap_idx, point_idx) = locate_point(activity, query).ok_or(EditError::PointNotFound)?;
    if point_idx == 0 {
        return Err(EditError::OperationNotExecuted(
            "cannot split a lap at its first point",
        ));
    }
    let mut edited = activity.clone();

    let original = &mut edited.laps[lap_idx];
    let tail = original.tracks.split_off(point_idx);
    let mut second = Lap::new(Identity::Index(lap_idx as u32 + 1), tail);
    second.intensity = original.intensity.clone();
    second.trigger_method = original.trigger_method.clone();
    second.color = original.color.clone();
    second.light_color = original.light_color.clone();

    edited.laps.insert(lap_idx + 1, second);
    refresh_lap(&mut edited, lap_idx);
    refresh_lap(&mut edited, lap_idx + 1);

    edited.renumber_laps();
    Ok(edited)
}

/// Merges two adjacent laps into the left one.
pub fn join_laps(activity: &Activity, left: usize, right: usize) -> Result<Activity, EditError> {
    if right != left + 1 {
        return Err(EditError::OperationNotExecuted("only adjacent laps can be joined"));
    }
    if right >= activity.laps.len() {
        return Err(EditError::LapNotFound);
    }
    let mut edited = activity.clone();

    let right_lap = edited.laps.remove(right);
    let merged = &mut edited.laps[left];
    merged.tracks.extend(right_lap.tracks);
    merged.calories = match (merged.calories, right_lap.calories) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0).saturating_add(b.unwrap_or(0))),
    };
    refresh_lap(&mut edited, left);

    edited.renumber_laps();
    Ok(edited)
}

/// Removes laps picked by start time, or by position when no times are given.
pub fn remove_laps(
    activity: &Activity,
    start_times: &[DateTime<Utc>],
    indexes: &[usize],
) -> Result<Activity, EditError> {
    let mut targets = if start_times.is_empty() {
        indexes
            .iter()
            .map(|&index| locate_lap_by_index(activity, index))
            .collect::<Option<Vec<_>>>()
    } else {
        start_times
            .iter()
            .map(|&start| locate_lap_by_start(activity, start))
            .collect::<Option<Vec<_>>>()
    }
    .ok_or(EditError::LapNotFound)?;

    if targets.is_empty() {
        return Err(EditError::OperationNotExecuted("no laps selected"));
    }
    targets.sort_unstable();
    targets.dedup();

    let mut edited = activity.clone();
    for &lap_idx in targets.iter().rev() {
        edited.laps.remove(lap_idx);
    }

    // A surviving lap's predecessor changed if the lap right before it went.
    let mut reanchored: Vec<usize> = targets
        .iter()
        .enumerate()
        .map(|(removed_before, &lap_idx)| lap_idx - removed_before)
        .collect();
    reanchored.dedup();
    for lap_idx in reanchored {
        reanchor_lap(&mut edited, lap_idx);
    }

    edited.renumber_laps();
    Ok(edited)
}

/// Assigns `primary-light` color pairs, separated by `@`, to laps in order.
/// Every `@`-separated group counts, empty ones included.
pub fn set_color_lap(activity: &Activity, data: &str) -> Result<Activity, EditError> {
    let laps = activity.laps.len();
    let groups: Vec<&str> = if data.trim().is_empty() {
        Vec::new()
    } else {
        data.split('@').map(str::trim).collect()
    };
    let mismatch = EditError::ColorsNotAssigned {
        groups: groups.len(),
        laps,
    };
    if groups.len() != laps {
        return Err(mismatch);
    }

    let mut pairs = Vec::with_capacity(groups.len());
    for group in groups {
        let pair = group
            .split_once('-')
            .and_then(|(color, light)| Some((normalize_hex(color)?, normalize_hex(light)?)));
        match pair {
            Some(pair) => pairs.push(pair),
            None => return Err(mismatch),
        }
    }

    let mut edited = activity.clone();
    for (lap, (color, light)) in edited.laps.iter_mut().zip(pairs) {
        lap.color = Some(color);
        lap.light_color = Some(light);
    }
    Ok(edited)
}

fn refresh_lap(activity: &mut Activity, lap_idx: usize) {
    let anchor = activity.anchor_for(lap_idx);
    if let Some(lap) = activity.laps.get_mut(lap_idx) {
        recompute_lap(lap, anchor.as_ref());
    }
}

/// Recomputes a lap whose predecessor lap changed under it.
fn reanchor_lap(activity: &mut Activity, lap_idx: usize) {
    if let Some(first) = activity
        .laps
        .get_mut(lap_idx)
        .and_then(|lap| lap.tracks.first_mut())
    {
        first.clear_derived();
    }
    refresh_lap(activity, lap_idx);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::aggregate::recompute_all;
    use crate::types::activity::{FileFormat, Position, TrackPoint};
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    fn point(n: i64) -> TrackPoint {
        let mut point = TrackPoint::new(
            Identity::Time(base() + Duration::seconds(n * 10)),
            Position::new(Decimal::new(475_000 + n * 10, 4), Decimal::new(85_000, 4)),
        );
        point.heart_rate = Some(130 + n as u16);
        point
    }

    fn query(n: i64) -> PointQuery {
        let p = point(n);
        PointQuery::by_time(
            p.position.latitude,
            p.position.longitude,
            p.time().unwrap().timestamp_millis(),
        )
    }

    /// Three laps of points 0..4, 4..7, 7..10.
    fn activity() -> Activity {
        let mut activity = Activity::new(FileFormat::Tcx);
        activity.id = "a1".to_string();
        for range in [0..4, 4..7, 7..10] {
            let mut lap = Lap::new(Identity::Index(0), range.map(point).collect());
            lap.intensity = Some("Active".to_string());
            activity.laps.push(lap);
        }
        recompute_all(&mut activity.laps);
        activity
    }

    fn lap_points(activity: &Activity) -> Vec<Vec<TrackPoint>> {
        activity.laps.iter().map(|l| l.tracks.clone()).collect()
    }

    #[test]
    fn remove_last_point_recomputes_lap_and_next() {
        let original = activity();
        let edited = remove_point(&original, &query(6)).unwrap();
        assert_eq!(edited.laps[1].tracks.len(), 2);
        assert!(edited.laps[1].stats().distance_meters < original.laps[1].stats().distance_meters);
        assert_eq!(edited.laps[1].stats().maximum_heart_rate, Some(135));

        let next_first = &edited.laps[2].tracks[0];
        let expected = crate::pipeline::geometry::distance(&point(5).position, &next_first.position);
        assert!((next_first.distance.unwrap() - expected).abs() < 1e-6);
        assert!(edited.is_ordered());
        assert_eq!(original, activity());
    }

    #[test]
    fn remove_point_rederives_successor() {
        let edited = remove_point(&activity(), &query(5)).unwrap();
        let successor = &edited.laps[1].tracks[1];
        let expected = crate::pipeline::geometry::distance(&point(4).position, &successor.position);
        assert!((successor.distance.unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn remove_first_point_keeps_anchor_from_previous_lap() {
        let edited = remove_point(&activity(), &query(4)).unwrap();
        let first = &edited.laps[1].tracks[0];
        let expected = crate::pipeline::geometry::distance(&point(3).position, &first.position);
        assert!((first.distance.unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn removing_sole_point_removes_lap() {
        let mut single = activity();
        single.laps.truncate(1);
        single.laps[0].tracks.truncate(1);
        let edited = remove_point(&single, &query(0)).unwrap();
        assert!(edited.laps.is_empty());
    }

    #[test]
    fn remove_missing_point_fails() {
        let err = remove_point(&activity(), &query(42)).unwrap_err();
        assert!(matches!(err, EditError::PointNotFound));
    }

    #[test]
    fn split_puts_divider_in_second_lap() {
        let edited = split_lap(&activity(), &query(2)).unwrap();
        assert_eq!(edited.laps.len(), 4);
        assert_eq!(edited.laps[0].tracks.len(), 2);
        assert_eq!(edited.laps[1].tracks[0].identity, point(2).identity);
        assert_eq!(edited.laps[1].identity, point(2).identity);
        assert_eq!(edited.laps[1].intensity.as_deref(), Some("Active"));
        assert!(edited.is_ordered());
    }

    #[test]
    fn split_at_first_point_is_rejected() {
        let err = split_lap(&activity(), &query(4)).unwrap_err();
        assert!(matches!(err, EditError::OperationNotExecuted(_)));
    }

    #[test]
    fn split_then_join_restores_original() {
        let original = activity();
        let split = split_lap(&original, &query(5)).unwrap();
        let joined = join_laps(&split, 1, 2).unwrap();
        assert_eq!(lap_points(&joined), lap_points(&original));
        assert_eq!(joined.laps[1].stats(), original.laps[1].stats());
        assert_eq!(joined.laps[1].identity, original.laps[1].identity);
    }

    #[test]
    fn join_requires_adjacent_laps() {
        let err = join_laps(&activity(), 0, 2).unwrap_err();
        assert!(matches!(err, EditError::OperationNotExecuted(_)));
    }

    #[test]
    fn join_past_the_end_fails() {
        let err = join_laps(&activity(), 2, 3).unwrap_err();
        assert!(matches!(err, EditError::LapNotFound));
    }

    #[test]
    fn join_keeps_left_descriptors() {
        let mut original = activity();
        original.laps[1].trigger_method = Some("Manual".to_string());
        original.laps[2].trigger_method = Some("Distance".to_string());
        let joined = join_laps(&original, 1, 2).unwrap();
        assert_eq!(joined.laps.len(), 2);
        assert_eq!(joined.laps[1].trigger_method.as_deref(), Some("Manual"));
        assert_eq!(joined.laps[1].tracks.len(), 6);
        assert!(joined.is_ordered());
    }

    #[test]
    fn remove_laps_by_start_time_reanchors_next_lap() {
        let original = activity();
        let start = original.laps[1].start_time().unwrap();
        let edited = remove_laps(&original, &[start], &[]).unwrap();
        assert_eq!(edited.laps.len(), 2);
        assert!(edited.is_ordered());
        let first = &edited.laps[1].tracks[0];
        let expected = crate::pipeline::geometry::distance(&point(3).position, &first.position);
        assert!((first.distance.unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn remove_laps_by_index() {
        let edited = remove_laps(&activity(), &[], &[0, 2]).unwrap();
        assert_eq!(edited.laps.len(), 1);
        assert!(edited.is_ordered());
        assert_eq!(edited.laps[0].tracks[0].distance, None);
    }

    #[test]
    fn remove_unknown_lap_leaves_activity_untouched() {
        let err = remove_laps(&activity(), &[], &[1, 9]).unwrap_err();
        assert!(matches!(err, EditError::LapNotFound));
    }

    #[test]
    fn color_groups_must_match_lap_count() {
        let mut two_laps = activity();
        two_laps.laps.truncate(2);
        let err = set_color_lap(&two_laps, "ff0000-ff8080").unwrap_err();
        assert!(matches!(err, EditError::ColorsNotAssigned { groups: 1, laps: 2 }));
    }

    #[test]
    fn colors_are_assigned_positionally() {
        let edited = set_color_lap(&activity(), "ff0000-ff8080@00ff00-80ff80@0000ff-8080ff").unwrap();
        assert_eq!(edited.laps[2].color.as_deref(), Some("#0000FF"));
        assert_eq!(edited.laps[2].light_color.as_deref(), Some("#8080FF"));
        assert_eq!(edited.laps[0].stats(), activity().laps[0].stats());
    }

    #[test]
    fn malformed_color_group_is_rejected() {
        let err = set_color_lap(&activity(), "ff0000@00ff00-80ff80@0000ff-8080ff").unwrap_err();
        assert!(matches!(err, EditError::ColorsNotAssigned { .. }));
    }

    #[test]
    fn empty_color_groups_still_count() {
        let err = set_color_lap(&activity(), "ff0000-ff8080@@00ff00-80ff80").unwrap_err();
        assert!(matches!(err, EditError::ColorsNotAssigned { groups: 3, laps: 3 }));
        let err = set_color_lap(&activity(), "ff0000-ff8080@00ff00-80ff80@0000ff-8080ff@").unwrap_err();
        assert!(matches!(err, EditError::ColorsNotAssigned { groups: 4, laps: 3 }));
    }

    fn untimed_point(n: u32) -> TrackPoint {
        TrackPoint::new(
            Identity::Index(n),
            Position::new(Decimal::new(450_000 + n as i64 * 10, 4), Decimal::new(70_000, 4)),
        )
    }

    /// Laps with start times whose points carry no timestamps, as in course files.
    fn course() -> Activity {
        let mut activity = Activity::new(FileFormat::Tcx);
        activity.laps.push(Lap::new(
            Identity::Time(base()),
            (0..3).map(untimed_point).collect(),
        ));
        activity.laps.push(Lap::new(
            Identity::Time(base() + Duration::minutes(10)),
            (3..5).map(untimed_point).collect(),
        ));
        recompute_all(&mut activity.laps);
        activity
    }

    #[test]
    fn split_of_timed_lap_with_untimed_points_stays_ordered() {
        let original = course();
        let divider = untimed_point(1);
        let query = PointQuery::by_index(divider.position.latitude, divider.position.longitude, 1);

        let split = split_lap(&original, &query).unwrap();
        let identities: Vec<Identity> = split.laps.iter().map(|l| l.identity).collect();
        assert_eq!(
            identities,
            vec![
                Identity::Time(base()),
                Identity::Index(1),
                Identity::Time(base() + Duration::minutes(10)),
            ]
        );
        assert!(split.is_ordered());

        let joined = join_laps(&split, 0, 1).unwrap();
        assert!(joined.is_ordered());
        assert_eq!(joined.laps[0].identity, Identity::Time(base()));
        assert_eq!(lap_points(&joined), lap_points(&original));
    }
}
