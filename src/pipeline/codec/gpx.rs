use rust_decimal::Decimal;

use super::xml::{self, at, attr, parse_time, parse_value, within, Node, XmlOut};
use super::{finish_import, Codec, IndexCounter};
use crate::error::CodecError;
use crate::types::activity::{Activity, FileFormat, Identity, Lap, Position, TrackPoint};

const GPX_NS: &str = "http://www.topografix.com/GPX/1/1";
const TPX_NS: &str = "http://www.garmin.com/xmlschemas/TrackPointExtension/v1";

/// GPX 1.1: `<trk>` per activity, `<trkseg>` per lap, `<trkpt>` per point.
pub struct GpxCodec;

#[derive(Default)]
struct GpxReader {
    activities: Vec<Activity>,
    creator: Option<String>,
    metadata_name: Option<String>,
    metadata_time: Option<String>,
    activity: Option<Activity>,
    lap: Option<Lap>,
    point: Option<PendingPoint>,
    point_indexes: IndexCounter,
}

struct PendingPoint {
    position: Position,
    time: Option<String>,
    altitude: Option<f64>,
    heart_rate: Option<u16>,
}

impl GpxReader {
    fn open(&mut self, path: &[String], attrs: &[(String, String)]) -> Result<(), CodecError> {
        match path.last().map(String::as_str) {
            Some("gpx") if path.len() == 1 => {
                self.creator = attr(attrs, "creator").map(str::to_string);
            }
            Some("trk") => {
                self.activity = Some(Activity::new(FileFormat::Gpx));
                self.point_indexes = IndexCounter::default();
            }
            Some("trkseg") => {
                if let Some(activity) = &self.activity {
                    self.lap = Some(Lap::new(
                        Identity::Index(activity.laps.len() as u32),
                        Vec::new(),
                    ));
                }
            }
            Some("trkpt") if self.lap.is_some() => {
                let lat = attr(attrs, "lat").ok_or_else(|| missing("trkpt", "lat"))?;
                let lon = attr(attrs, "lon").ok_or_else(|| missing("trkpt", "lon"))?;
                self.point = Some(PendingPoint {
                    position: Position::new(
                        parse_value::<Decimal>(lat, "lat")?,
                        parse_value::<Decimal>(lon, "lon")?,
                    ),
                    time: None,
                    altitude: None,
                    heart_rate: None,
                });
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, path: &[String], text: &str) -> Result<(), CodecError> {
        if let Some(point) = self.point.as_mut() {
            if at(path, &["trkpt", "ele"]) {
                point.altitude = Some(parse_value(text, "ele")?);
            } else if at(path, &["trkpt", "time"]) {
                point.time = Some(text.to_string());
            } else if at(path, &["hr"]) && within(path, "extensions") {
                point.heart_rate = Some(parse_value(text, "hr")?);
            }
            return Ok(());
        }

        if at(path, &["metadata", "name"]) {
            self.metadata_name = Some(text.to_string());
        } else if at(path, &["metadata", "time"]) {
            self.metadata_time = Some(text.to_string());
        } else if let Some(activity) = self.activity.as_mut() {
            if at(path, &["trk", "name"]) {
                activity.name = Some(text.to_string());
            } else if at(path, &["trk", "type"]) {
                activity.sport = Some(text.to_string());
            }
        }
        Ok(())
    }

    fn close(&mut self, path: &[String]) -> Result<(), CodecError> {
        match path.last().map(String::as_str) {
            Some("trkpt") => {
                if let (Some(pending), Some(lap)) = (self.point.take(), self.lap.as_mut()) {
                    let identity = match pending.time {
                        Some(time) => Identity::Time(parse_time(&time, "time")?),
                        None => Identity::Index(self.point_indexes.next()),
                    };
                    let mut point = TrackPoint::new(identity, pending.position);
                    point.altitude = pending.altitude;
                    point.heart_rate = pending.heart_rate;
                    lap.tracks.push(point);
                }
            }
            Some("trkseg") => {
                if let (Some(lap), Some(activity)) = (self.lap.take(), self.activity.as_mut()) {
                    activity.laps.push(lap);
                }
            }
            Some("trk") => {
                if let Some(mut activity) = self.activity.take() {
                    activity.device = self.creator.clone();
                    activity.date = self
                        .metadata_time
                        .as_deref()
                        .map(|time| parse_time(time, "metadata time"))
                        .transpose()?;
                    if activity.name.is_none() {
                        activity.name = self.metadata_name.clone();
                    }
                    self.activities.push(activity);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl Codec for GpxCodec {
    fn import(&self, bytes: &[u8]) -> Result<Vec<Activity>, CodecError> {
        let mut reader = GpxReader::default();
        xml::walk(bytes, "gpx", |path, node| match node {
            Node::Open(attrs) => reader.open(path, attrs),
            Node::Text(text) => reader.text(path, text),
            Node::Close => reader.close(path),
        })?;
        finish_import(reader.activities)
    }

    fn export(&self, activity: &Activity) -> Result<Vec<u8>, CodecError> {
        let mut out = XmlOut::new()?;

        let mut root = vec![("version", "1.1")];
        if let Some(device) = activity.device.as_deref() {
            root.push(("creator", device));
        }
        root.push(("xmlns", GPX_NS));
        root.push(("xmlns:gpxtpx", TPX_NS));
        out.open("gpx", &root)?;

        if let Some(date) = &activity.date {
            out.open("metadata", &[])?;
            out.leaf("time", &xml::format_time(date))?;
            out.close("metadata")?;
        }

        out.open("trk", &[])?;
        out.leaf_opt("name", activity.name.as_deref())?;
        out.leaf_opt("type", activity.sport.as_deref())?;
        for lap in &activity.laps {
            out.open("trkseg", &[])?;
            for point in &lap.tracks {
                write_point(&mut out, point)?;
            }
            out.close("trkseg")?;
        }
        out.close("trk")?;
        out.close("gpx")?;

        Ok(out.finish())
    }
}

fn write_point(out: &mut XmlOut, point: &TrackPoint) -> Result<(), CodecError> {
    let lat = point.position.latitude.to_string();
    let lon = point.position.longitude.to_string();
    out.open("trkpt", &[("lat", lat.as_str()), ("lon", lon.as_str())])?;
    out.leaf_opt("ele", point.altitude)?;
    out.leaf_opt("time", point.time().as_ref().map(xml::format_time))?;
    if let Some(hr) = point.heart_rate {
        out.open("extensions", &[])?;
        out.open("gpxtpx:TrackPointExtension", &[])?;
        out.leaf("gpxtpx:hr", &hr.to_string())?;
        out.close("gpxtpx:TrackPointExtension")?;
        out.close("extensions")?;
    }
    out.close("trkpt")
}

fn missing(element: &str, attribute: &str) -> CodecError {
    CodecError::MalformedDocument(format!("<{}> without {} attribute", element, attribute))
}
