//! KML rendering of a mission payload.

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde_json::Value;

use super::{SectionError, SectionPayload};

const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";

/// A mission position in KML axis order.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    lon: f64,
    lat: f64,
    alt: f64,
}

impl Position {
    fn coordinates(&self) -> String {
        format!("{},{},{}", self.lon, self.lat, self.alt)
    }
}

/// Render the mission as a KML document: one path through every positioned
/// item (starting at the planned home when known) and one point per item.
pub fn mission_kml(mission: &SectionPayload) -> Result<String, SectionError> {
    let home = mission
        .get("plannedHomePosition")
        .and_then(Value::as_array)
        .and_then(|a| position_from(a, 0));

    let waypoints: Vec<(usize, Position)> = mission
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter_map(|(idx, item)| item_position(item).map(|p| (idx + 1, p)))
                .collect()
        })
        .unwrap_or_default();

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    let w = &mut writer;

    write(w, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let mut kml = BytesStart::new("kml");
    kml.push_attribute(("xmlns", KML_NAMESPACE));
    write(w, Event::Start(kml))?;
    write(w, Event::Start(BytesStart::new("Document")))?;
    text_element(w, "name", "Mission")?;

    let path: Vec<String> = home
        .iter()
        .chain(waypoints.iter().map(|(_, p)| p))
        .map(Position::coordinates)
        .collect();
    if !path.is_empty() {
        write(w, Event::Start(BytesStart::new("Placemark")))?;
        text_element(w, "name", "Flight path")?;
        write(w, Event::Start(BytesStart::new("LineString")))?;
        text_element(w, "tessellate", "1")?;
        text_element(w, "altitudeMode", "relativeToGround")?;
        text_element(w, "coordinates", &path.join(" "))?;
        write(w, Event::End(BytesEnd::new("LineString")))?;
        write(w, Event::End(BytesEnd::new("Placemark")))?;
    }

    if let Some(home) = home {
        point_placemark(w, "Home", home)?;
    }
    for (seq, position) in &waypoints {
        point_placemark(w, &seq.to_string(), *position)?;
    }

    write(w, Event::End(BytesEnd::new("Document")))?;
    write(w, Event::End(BytesEnd::new("kml")))?;

    String::from_utf8(writer.into_inner()).map_err(|e| SectionError::Kml(format!("UTF-8 error: {e}")))
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), SectionError> {
    writer
        .write_event(event)
        .map_err(|e| SectionError::Kml(e.to_string()))
}

fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<(), SectionError> {
    write(writer, Event::Start(BytesStart::new(name)))?;
    write(writer, Event::Text(BytesText::new(text)))?;
    write(writer, Event::End(BytesEnd::new(name)))
}

fn point_placemark(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    position: Position,
) -> Result<(), SectionError> {
    write(writer, Event::Start(BytesStart::new("Placemark")))?;
    text_element(writer, "name", name)?;
    write(writer, Event::Start(BytesStart::new("Point")))?;
    text_element(writer, "altitudeMode", "relativeToGround")?;
    text_element(writer, "coordinates", &position.coordinates())?;
    write(writer, Event::End(BytesEnd::new("Point")))?;
    write(writer, Event::End(BytesEnd::new("Placemark")))
}

/// `params[4..7]` of a simple item hold latitude, longitude and altitude.
/// Items at 0,0 carry no position.
fn item_position(item: &Value) -> Option<Position> {
    let params = item.get("params")?.as_array()?;
    let position = position_from(params, 4)?;
    if position.lat == 0.0 && position.lon == 0.0 {
        return None;
    }
    Some(position)
}

fn position_from(values: &[Value], offset: usize) -> Option<Position> {
    let lat = values.get(offset)?.as_f64()?;
    let lon = values.get(offset + 1)?.as_f64()?;
    let alt = values.get(offset + 2).and_then(Value::as_f64).unwrap_or(0.0);
    Some(Position { lon, lat, alt })
}
