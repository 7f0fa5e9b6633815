mod gpx;
mod tcx;
mod xml;

use crate::error::CodecError;
use crate::pipeline::aggregate::recompute_all;
use crate::types::activity::{Activity, FileFormat, Identity};

pub use gpx::GpxCodec;
pub use tcx::TcxCodec;

/// A two-way mapping between one XML dialect and the activity model.
pub trait Codec {
    /// One activity per track element; laps recomputed and ordered.
    fn import(&self, bytes: &[u8]) -> Result<Vec<Activity>, CodecError>;
    fn export(&self, activity: &Activity) -> Result<Vec<u8>, CodecError>;
}

pub fn import(bytes: &[u8], format: FileFormat) -> Result<Vec<Activity>, CodecError> {
    match format {
        FileFormat::Gpx => GpxCodec.import(bytes),
        FileFormat::Tcx => TcxCodec.import(bytes),
    }
}

pub fn export(activity: &Activity, format: FileFormat) -> Result<Vec<u8>, CodecError> {
    match format {
        FileFormat::Gpx => GpxCodec.export(activity),
        FileFormat::Tcx => TcxCodec.export(activity),
    }
}

/// Resolves a format by name, as used in export requests.
pub fn format_named(name: &str) -> Result<FileFormat, CodecError> {
    FileFormat::from_name(name).ok_or_else(|| CodecError::UnsupportedFormat(name.to_string()))
}

/// Restores model invariants on freshly parsed activities.
fn finish_import(mut activities: Vec<Activity>) -> Result<Vec<Activity>, CodecError> {
    if activities.is_empty() {
        return Err(CodecError::EmptyDocument);
    }
    for activity in &mut activities {
        for lap in &mut activity.laps {
            lap.sort_tracks();
            if let Some(start) = lap.tracks.first().and_then(|p| p.time()) {
                lap.identity = Identity::Time(start);
            }
        }
        activity.sort_laps();
        activity.renumber_laps();
        recompute_all(&mut activity.laps);
    }
    Ok(activities)
}

/// Hands out creation indexes to entities that carry no timestamp.
#[derive(Debug, Default)]
struct IndexCounter(u32);

impl IndexCounter {
    fn next(&mut self) -> u32 {
        let index = self.0;
        self.0 += 1;
        index
    }
}
