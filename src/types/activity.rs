use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How a lap or track point is ordered and addressed.
///
/// Files without timestamps still need a stable order, so entities fall back
/// to a creation index. Sequences are ordered per kind: timed entries ascend
/// by time, indexed entries ascend by index, and each kind keeps the slots it
/// occupies so untimed entries stay where the document put them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum Identity {
    Time(DateTime<Utc>),
    Index(u32),
}

impl Identity {
    pub fn time(&self) -> Option<DateTime<Utc>> {
        match self {
            Identity::Time(time) => Some(*time),
            Identity::Index(_) => None,
        }
    }

    pub fn index(&self) -> Option<u32> {
        match self {
            Identity::Time(_) => None,
            Identity::Index(index) => Some(*index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub latitude: Decimal,
    pub longitude: Decimal,
}

impl Position {
    pub fn new(latitude: Decimal, longitude: Decimal) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// `"lat,lng"` with the exact decimal digits, as sent to elevation lookups.
    pub fn key(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub identity: Identity,
    pub position: Position,
    pub altitude: Option<f64>,
    /// Meters from the previous point (or the previous lap's last point).
    pub distance: Option<f64>,
    pub speed: Option<f64>,
    pub heart_rate: Option<u16>,
}

impl TrackPoint {
    pub fn new(identity: Identity, position: Position) -> Self {
        Self {
            identity,
            position,
            altitude: None,
            distance: None,
            speed: None,
            heart_rate: None,
        }
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.identity.time()
    }

    /// Drops the values derived from this point's predecessor.
    pub fn clear_derived(&mut self) {
        self.distance = None;
        self.speed = None;
    }
}

/// Aggregates derived from a lap's points. Only the aggregator writes these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LapStats {
    pub total_time_seconds: Option<f64>,
    pub distance_meters: Option<f64>,
    pub maximum_speed: Option<f64>,
    pub average_speed: Option<f64>,
    pub average_heart_rate: Option<f64>,
    pub maximum_heart_rate: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lap {
    pub identity: Identity,
    #[serde(flatten)]
    stats: LapStats,
    pub calories: Option<u16>,
    pub intensity: Option<String>,
    pub trigger_method: Option<String>,
    pub color: Option<String>,
    pub light_color: Option<String>,
    pub tracks: Vec<TrackPoint>,
}

impl Lap {
    /// A lap with no aggregates yet; run the aggregator before handing it out.
    pub fn new(identity: Identity, tracks: Vec<TrackPoint>) -> Self {
        Self {
            identity,
            stats: LapStats::default(),
            calories: None,
            intensity: None,
            trigger_method: None,
            color: None,
            light_color: None,
            tracks,
        }
    }

    pub fn stats(&self) -> &LapStats {
        &self.stats
    }

    pub(crate) fn set_stats(&mut self, stats: LapStats) {
        self.stats = stats;
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.identity.time()
    }

    pub fn last_point(&self) -> Option<&TrackPoint> {
        self.tracks.last()
    }

    pub fn sort_tracks(&mut self) {
        sort_within_kind(&mut self.tracks, |p| p.identity);
    }

    pub fn tracks_sorted(&self) -> bool {
        is_sorted(self.tracks.iter().map(|p| p.identity))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Gpx,
    Tcx,
}

impl FileFormat {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        Self::from_name(ext)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "gpx" => Some(FileFormat::Gpx),
            "tcx" => Some(FileFormat::Tcx),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Gpx => "gpx",
            FileFormat::Tcx => "tcx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            FileFormat::Gpx => "application/gpx+xml",
            FileFormat::Tcx => "application/vnd.garmin.tcx+xml",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub user_id: String,
    pub device: Option<String>,
    pub sport: Option<String>,
    pub name: Option<String>,
    pub source_format: FileFormat,
    pub date: Option<DateTime<Utc>>,
    pub laps: Vec<Lap>,
}

impl Activity {
    pub fn new(source_format: FileFormat) -> Self {
        Self {
            id: String::new(),
            user_id: String::new(),
            device: None,
            sport: None,
            name: None,
            source_format,
            date: None,
            laps: Vec::new(),
        }
    }

    pub fn sort_laps(&mut self) {
        sort_within_kind(&mut self.laps, |l| l.identity);
    }

    /// Index-identified laps take their position as index so that laps can
    /// be addressed positionally after splits and removals.
    pub fn renumber_laps(&mut self) {
        for (position, lap) in self.laps.iter_mut().enumerate() {
            if let Identity::Index(_) = lap.identity {
                lap.identity = Identity::Index(position as u32);
            }
        }
    }

    /// Whether laps and every lap's points respect identity order.
    pub fn is_ordered(&self) -> bool {
        is_sorted(self.laps.iter().map(|l| l.identity)) && self.laps.iter().all(Lap::tracks_sorted)
    }

    pub fn point_count(&self) -> usize {
        self.laps.iter().map(|lap| lap.tracks.len()).sum()
    }

    pub fn total_distance(&self) -> f64 {
        self.laps
            .iter()
            .filter_map(|lap| lap.stats().distance_meters)
            .sum()
    }

    /// Last point of the lap before `lap_idx`, the continuity anchor.
    pub fn anchor_for(&self, lap_idx: usize) -> Option<TrackPoint> {
        lap_idx
            .checked_sub(1)
            .and_then(|prev| self.laps.get(prev))
            .and_then(|lap| lap.last_point())
            .cloned()
    }
}

/// Both the timed and the indexed subsequence ascend.
fn is_sorted(identities: impl Iterator<Item = Identity>) -> bool {
    let mut last_time = None;
    let mut last_index = None;
    for identity in identities {
        let in_order = match identity {
            Identity::Time(time) => last_time.replace(time).map_or(true, |prev| prev <= time),
            Identity::Index(index) => last_index.replace(index).map_or(true, |prev| prev <= index),
        };
        if !in_order {
            return false;
        }
    }
    true
}

/// Stable sort of each identity kind within the positions that kind holds.
fn sort_within_kind<T>(items: &mut Vec<T>, identity: impl Fn(&T) -> Identity) {
    let identities: Vec<Identity> = items.iter().map(&identity).collect();
    let mut source: Vec<usize> = (0..items.len()).collect();
    for timed in [true, false] {
        let slots: Vec<usize> = (0..identities.len())
            .filter(|&i| identities[i].time().is_some() == timed)
            .collect();
        let mut ordered = slots.clone();
        ordered.sort_by_key(|&i| identities[i]);
        for (slot, from) in slots.into_iter().zip(ordered) {
            source[slot] = from;
        }
    }

    let mut taken: Vec<Option<T>> = std::mem::take(items).into_iter().map(Some).collect();
    *items = source
        .into_iter()
        .filter_map(|from| taken[from].take())
        .collect();
}
