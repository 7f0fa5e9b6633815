use rust_decimal::Decimal;

use super::xml::{self, at, attr, parse_time, parse_value, Node, XmlOut};
use super::{finish_import, Codec, IndexCounter};
use crate::error::CodecError;
use crate::types::activity::{Activity, FileFormat, Identity, Lap, Position, TrackPoint};

const TCD_NS: &str = "http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2";
const AX_NS: &str = "http://www.garmin.com/xmlschemas/ActivityExtension/v2";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Garmin TCX v2 with the ActivityExtension speed fields.
pub struct TcxCodec;

#[derive(Default)]
struct TcxReader {
    activities: Vec<Activity>,
    activity: Option<Activity>,
    lap: Option<Lap>,
    point: Option<PendingPoint>,
    point_indexes: IndexCounter,
}

#[derive(Default)]
struct PendingPoint {
    time: Option<String>,
    latitude: Option<Decimal>,
    longitude: Option<Decimal>,
    altitude: Option<f64>,
    distance: Option<f64>,
    speed: Option<f64>,
    heart_rate: Option<u16>,
}

impl TcxReader {
    fn open(&mut self, path: &[String], attrs: &[(String, String)]) -> Result<(), CodecError> {
        match path.last().map(String::as_str) {
            Some("Activity") => {
                let mut activity = Activity::new(FileFormat::Tcx);
                activity.sport = attr(attrs, "Sport").map(str::to_string);
                self.activity = Some(activity);
                self.point_indexes = IndexCounter::default();
            }
            Some("Lap") => {
                if let Some(activity) = &self.activity {
                    let identity = match attr(attrs, "StartTime") {
                        Some(start) => Identity::Time(parse_time(start, "StartTime")?),
                        None => Identity::Index(activity.laps.len() as u32),
                    };
                    self.lap = Some(Lap::new(identity, Vec::new()));
                }
            }
            Some("Trackpoint") if self.lap.is_some() => {
                self.point = Some(PendingPoint::default());
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, path: &[String], text: &str) -> Result<(), CodecError> {
        if let Some(point) = self.point.as_mut() {
            if at(path, &["Trackpoint", "Time"]) {
                point.time = Some(text.to_string());
            } else if at(path, &["Position", "LatitudeDegrees"]) {
                point.latitude = Some(parse_value(text, "LatitudeDegrees")?);
            } else if at(path, &["Position", "LongitudeDegrees"]) {
                point.longitude = Some(parse_value(text, "LongitudeDegrees")?);
            } else if at(path, &["Trackpoint", "AltitudeMeters"]) {
                point.altitude = Some(parse_value(text, "AltitudeMeters")?);
            } else if at(path, &["Trackpoint", "DistanceMeters"]) {
                point.distance = Some(parse_value(text, "DistanceMeters")?);
            } else if at(path, &["Trackpoint", "HeartRateBpm", "Value"]) {
                point.heart_rate = Some(parse_value(text, "HeartRateBpm")?);
            } else if at(path, &["TPX", "Speed"]) {
                point.speed = Some(parse_value(text, "Speed")?);
            }
            return Ok(());
        }

        // Lap totals are derived and get recomputed from the points.
        if let Some(lap) = self.lap.as_mut() {
            if at(path, &["Lap", "Calories"]) {
                lap.calories = Some(parse_value(text, "Calories")?);
            } else if at(path, &["Lap", "Intensity"]) {
                lap.intensity = Some(text.to_string());
            } else if at(path, &["Lap", "TriggerMethod"]) {
                lap.trigger_method = Some(text.to_string());
            }
            return Ok(());
        }

        if let Some(activity) = self.activity.as_mut() {
            if at(path, &["Activity", "Id"]) {
                activity.date = Some(parse_time(text, "Id")?);
            } else if at(path, &["Activity", "Notes"]) {
                activity.name = Some(text.to_string());
            } else if at(path, &["Activity", "Creator", "Name"]) {
                activity.device = Some(text.to_string());
            }
        }
        Ok(())
    }

    fn close(&mut self, path: &[String]) -> Result<(), CodecError> {
        match path.last().map(String::as_str) {
            Some("Trackpoint") => {
                if let (Some(pending), Some(lap)) = (self.point.take(), self.lap.as_mut()) {
                    let position = match (pending.latitude, pending.longitude) {
                        (Some(lat), Some(lng)) => Position::new(lat, lng),
                        (None, None) => return Ok(()),
                        _ => {
                            return Err(CodecError::MalformedDocument(
                                "<Position> needs both LatitudeDegrees and LongitudeDegrees"
                                    .to_string(),
                            ))
                        }
                    };
                    let identity = match pending.time {
                        Some(time) => Identity::Time(parse_time(&time, "Time")?),
                        None => Identity::Index(self.point_indexes.next()),
                    };
                    let mut point = TrackPoint::new(identity, position);
                    point.altitude = pending.altitude;
                    point.distance = pending.distance;
                    point.speed = pending.speed;
                    point.heart_rate = pending.heart_rate;
                    lap.tracks.push(point);
                }
            }
            Some("Lap") => {
                if let (Some(lap), Some(activity)) = (self.lap.take(), self.activity.as_mut()) {
                    activity.laps.push(lap);
                }
            }
            Some("Activity") => {
                if let Some(activity) = self.activity.take() {
                    self.activities.push(activity);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl Codec for TcxCodec {
    fn import(&self, bytes: &[u8]) -> Result<Vec<Activity>, CodecError> {
        let mut reader = TcxReader::default();
        xml::walk(bytes, "TrainingCenterDatabase", |path, node| match node {
            Node::Open(attrs) => reader.open(path, attrs),
            Node::Text(text) => reader.text(path, text),
            Node::Close => reader.close(path),
        })?;
        finish_import(reader.activities)
    }

    fn export(&self, activity: &Activity) -> Result<Vec<u8>, CodecError> {
        let mut out = XmlOut::new()?;
        out.open(
            "TrainingCenterDatabase",
            &[("xmlns", TCD_NS), ("xmlns:ns3", AX_NS), ("xmlns:xsi", XSI_NS)],
        )?;
        out.open("Activities", &[])?;

        match activity.sport.as_deref() {
            Some(sport) => out.open("Activity", &[("Sport", sport)])?,
            None => out.open("Activity", &[])?,
        }
        out.leaf_opt("Id", activity.date.as_ref().map(xml::format_time))?;
        for lap in &activity.laps {
            write_lap(&mut out, lap)?;
        }
        out.leaf_opt("Notes", activity.name.as_deref())?;
        if let Some(device) = activity.device.as_deref() {
            out.open("Creator", &[("xsi:type", "Device_t")])?;
            out.leaf("Name", device)?;
            out.close("Creator")?;
        }
        out.close("Activity")?;

        out.close("Activities")?;
        out.close("TrainingCenterDatabase")?;
        Ok(out.finish())
    }
}

fn write_lap(out: &mut XmlOut, lap: &Lap) -> Result<(), CodecError> {
    match lap.start_time() {
        Some(start) => out.open("Lap", &[("StartTime", xml::format_time(&start).as_str())])?,
        None => out.open("Lap", &[])?,
    }

    let stats = lap.stats();
    out.leaf_opt("TotalTimeSeconds", stats.total_time_seconds)?;
    out.leaf_opt("DistanceMeters", stats.distance_meters)?;
    out.leaf_opt("MaximumSpeed", stats.maximum_speed)?;
    out.leaf_opt("Calories", lap.calories)?;
    let average_hr = stats
        .average_heart_rate
        .filter(|&hr| hr > 0.0)
        .map(|hr| hr.round() as u16);
    write_bpm(out, "AverageHeartRateBpm", average_hr)?;
    write_bpm(out, "MaximumHeartRateBpm", stats.maximum_heart_rate)?;
    out.leaf_opt("Intensity", lap.intensity.as_deref())?;
    out.leaf_opt("TriggerMethod", lap.trigger_method.as_deref())?;

    if !lap.tracks.is_empty() {
        out.open("Track", &[])?;
        for point in &lap.tracks {
            write_point(out, point)?;
        }
        out.close("Track")?;
    }

    if let Some(avg_speed) = stats.average_speed {
        out.open("Extensions", &[])?;
        out.open("ns3:LX", &[])?;
        out.leaf("ns3:AvgSpeed", &avg_speed.to_string())?;
        out.close("ns3:LX")?;
        out.close("Extensions")?;
    }
    out.close("Lap")
}

fn write_point(out: &mut XmlOut, point: &TrackPoint) -> Result<(), CodecError> {
    out.open("Trackpoint", &[])?;
    out.leaf_opt("Time", point.time().as_ref().map(xml::format_time))?;
    out.open("Position", &[])?;
    out.leaf("LatitudeDegrees", &point.position.latitude.to_string())?;
    out.leaf("LongitudeDegrees", &point.position.longitude.to_string())?;
    out.close("Position")?;
    out.leaf_opt("AltitudeMeters", point.altitude)?;
    out.leaf_opt("DistanceMeters", point.distance)?;
    write_bpm(out, "HeartRateBpm", point.heart_rate)?;
    if let Some(speed) = point.speed {
        out.open("Extensions", &[])?;
        out.open("ns3:TPX", &[])?;
        out.leaf("ns3:Speed", &speed.to_string())?;
        out.close("ns3:TPX")?;
        out.close("Extensions")?;
    }
    out.close("Trackpoint")
}

/// `<name><Value>bpm</Value></name>`, skipped unless strictly positive.
fn write_bpm(out: &mut XmlOut, name: &str, bpm: Option<u16>) -> Result<(), CodecError> {
    match bpm.filter(|&bpm| bpm > 0) {
        Some(bpm) => {
            out.open(name, &[])?;
            out.leaf("Value", &bpm.to_string())?;
            out.close(name)
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::codec::GpxCodec;
    use rust_decimal_macros::dec;

    const SAMPLE_TCX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TrainingCenterDatabase xmlns="http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2"
    xmlns:ns3="http://www.garmin.com/xmlschemas/ActivityExtension/v2">
  <Activities>
    <Activity Sport="Running">
      <Id>2026-02-01T07:00:00Z</Id>
      <Lap StartTime="2026-02-01T07:00:00Z">
        <TotalTimeSeconds>999</TotalTimeSeconds>
        <DistanceMeters>999</DistanceMeters>
        <Calories>42</Calories>
        <Intensity>Active</Intensity>
        <TriggerMethod>Manual</TriggerMethod>
        <Track>
          <Trackpoint>
            <Time>2026-02-01T07:00:00Z</Time>
            <Position><LatitudeDegrees>45.500000</LatitudeDegrees><LongitudeDegrees>-122.500000</LongitudeDegrees></Position>
            <AltitudeMeters>100.5</AltitudeMeters>
            <HeartRateBpm><Value>120</Value></HeartRateBpm>
          </Trackpoint>
          <Trackpoint>
            <Time>2026-02-01T07:00:05Z</Time>
          </Trackpoint>
          <Trackpoint>
            <Time>2026-02-01T07:00:10Z</Time>
            <Position><LatitudeDegrees>45.500100</LatitudeDegrees><LongitudeDegrees>-122.500000</LongitudeDegrees></Position>
            <DistanceMeters>11.5</DistanceMeters>
            <HeartRateBpm><Value>126</Value></HeartRateBpm>
            <Extensions><ns3:TPX><ns3:Speed>1.15</ns3:Speed></ns3:TPX></Extensions>
          </Trackpoint>
        </Track>
      </Lap>
      <Lap StartTime="2026-02-01T07:00:20Z">
        <Track>
          <Trackpoint>
            <Time>2026-02-01T07:00:20Z</Time>
            <Position><LatitudeDegrees>45.500200</LatitudeDegrees><LongitudeDegrees>-122.500000</LongitudeDegrees></Position>
          </Trackpoint>
        </Track>
      </Lap>
      <Notes>Tempo run</Notes>
      <Creator><Name>Forerunner 265</Name></Creator>
    </Activity>
  </Activities>
</TrainingCenterDatabase>"#;

    #[test]
    fn imports_laps_and_trackpoints() {
        let activity = TcxCodec.import(SAMPLE_TCX.as_bytes()).unwrap().remove(0);
        assert_eq!(activity.sport.as_deref(), Some("Running"));
        assert_eq!(activity.name.as_deref(), Some("Tempo run"));
        assert_eq!(activity.device.as_deref(), Some("Forerunner 265"));
        assert_eq!(activity.laps.len(), 2);

        let lap = &activity.laps[0];
        assert_eq!(lap.calories, Some(42));
        assert_eq!(lap.intensity.as_deref(), Some("Active"));
        assert_eq!(lap.trigger_method.as_deref(), Some("Manual"));
        assert_eq!(lap.tracks.len(), 2, "positionless trackpoint is skipped");
        assert_eq!(
            lap.tracks[0].position,
            Position::new(dec!(45.5), dec!(-122.5))
        );
        assert_eq!(lap.stats().maximum_heart_rate, Some(126));
        assert_eq!(lap.stats().average_heart_rate, Some(123.0));
    }

    #[test]
    fn file_values_survive_and_totals_are_recomputed() {
        let activity = TcxCodec.import(SAMPLE_TCX.as_bytes()).unwrap().remove(0);
        let lap = &activity.laps[0];
        assert_eq!(lap.tracks[1].distance, Some(11.5));
        assert_eq!(lap.tracks[1].speed, Some(1.15));
        let distance = lap.stats().distance_meters.unwrap();
        assert!(distance > 10.0 && distance < 12.0);
        assert_eq!(lap.stats().total_time_seconds, Some(10.0));
    }

    #[test]
    fn export_skips_non_positive_heart_rate() {
        let mut activity = TcxCodec.import(SAMPLE_TCX.as_bytes()).unwrap().remove(0);
        activity.laps.truncate(1);
        for point in &mut activity.laps[0].tracks {
            point.heart_rate = None;
        }
        crate::pipeline::aggregate::recompute_all(&mut activity.laps);
        let xml = String::from_utf8(TcxCodec.export(&activity).unwrap()).unwrap();
        assert!(!xml.contains("HeartRateBpm"));
        assert!(xml.contains("<Calories>42</Calories>"));
        assert!(xml.contains(r#"<Lap StartTime="2026-02-01T07:00:00Z">"#));
        assert!(xml.contains("<ns3:AvgSpeed>"));
    }

    #[test]
    fn round_trip_preserves_activity() {
        let activity = TcxCodec.import(SAMPLE_TCX.as_bytes()).unwrap().remove(0);
        let exported = TcxCodec.export(&activity).unwrap();
        let reimported = TcxCodec.import(&exported).unwrap().remove(0);
        assert_eq!(reimported, activity);
    }

    #[test]
    fn gpx_round_trip_drops_lap_descriptors() {
        let activity = TcxCodec.import(SAMPLE_TCX.as_bytes()).unwrap().remove(0);
        let gpx = GpxCodec.export(&activity).unwrap();
        let reimported = GpxCodec.import(&gpx).unwrap().remove(0);

        assert_eq!(reimported.laps.len(), activity.laps.len());
        for (lap, original) in reimported.laps.iter().zip(&activity.laps) {
            assert_eq!(lap.calories, None);
            assert_eq!(lap.intensity, None);
            assert_eq!(lap.trigger_method, None);
            assert_eq!(lap.identity, original.identity);
            assert_eq!(lap.stats(), original.stats());

            let carried = |p: &TrackPoint| (p.identity, p.position, p.altitude, p.heart_rate);
            let points: Vec<_> = lap.tracks.iter().map(carried).collect();
            let expected: Vec<_> = original.tracks.iter().map(carried).collect();
            assert_eq!(points, expected);
        }
        assert_eq!(reimported.sport, activity.sport);
        assert_eq!(reimported.date, activity.date);
    }

    #[test]
    fn course_laps_without_point_times_split_in_order() {
        let tcx = r#"<TrainingCenterDatabase><Activities><Activity Sport="Biking">
            <Lap StartTime="2026-02-01T07:00:00Z"><Track>
              <Trackpoint><Position><LatitudeDegrees>45.000</LatitudeDegrees><LongitudeDegrees>7.0</LongitudeDegrees></Position></Trackpoint>
              <Trackpoint><Position><LatitudeDegrees>45.001</LatitudeDegrees><LongitudeDegrees>7.0</LongitudeDegrees></Position></Trackpoint>
              <Trackpoint><Position><LatitudeDegrees>45.002</LatitudeDegrees><LongitudeDegrees>7.0</LongitudeDegrees></Position></Trackpoint>
            </Track></Lap>
            <Lap StartTime="2026-02-01T07:10:00Z"><Track>
              <Trackpoint><Position><LatitudeDegrees>45.003</LatitudeDegrees><LongitudeDegrees>7.0</LongitudeDegrees></Position></Trackpoint>
            </Track></Lap>
          </Activity></Activities></TrainingCenterDatabase>"#;
        let activity = TcxCodec.import(tcx.as_bytes()).unwrap().remove(0);
        assert!(activity.is_ordered());

        let query = crate::pipeline::locate::PointQuery::by_index(dec!(45.001), dec!(7.0), 1);
        let split = crate::pipeline::edit::split_lap(&activity, &query).unwrap();
        assert_eq!(split.laps.len(), 3);
        assert_eq!(split.laps[1].identity, Identity::Index(1));
        assert!(split.laps[2].start_time().is_some());
        assert!(split.is_ordered());
    }

    #[test]
    fn gpx_document_is_rejected() {
        let err = TcxCodec
            .import(br#"<gpx version="1.1"><trk/></gpx>"#)
            .unwrap_err();
        assert!(matches!(err, CodecError::MalformedDocument(_)));
    }

    #[test]
    fn half_a_position_is_malformed() {
        let tcx = r#"<TrainingCenterDatabase><Activities><Activity><Lap><Track><Trackpoint>
            <Position><LatitudeDegrees>1.0</LatitudeDegrees></Position>
          </Trackpoint></Track></Lap></Activity></Activities></TrainingCenterDatabase>"#;
        let err = TcxCodec.import(tcx.as_bytes()).unwrap_err();
        assert!(matches!(err, CodecError::MalformedDocument(_)));
    }
}
