//! Turn a house's pickup schedule into an iCalendar artifact.

use std::path::Path;

use anyhow::Result;
use chrono::NaiveDate;
use ical::{
    generator::{Emitter, IcalCalendar, IcalCalendarBuilder, IcalEvent, IcalEventBuilder, Property},
    ical_param, ical_property,
};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
    hierarchy::House,
    slug::{file_stem, slugify},
    upstream_client::value_as_name,
};

static PROD_ID: &str = "-//OZO Svoz Odpadu//CZ";
static TIMEZONE: &str = "Europe/Prague";
static FORMAT: &str = "%Y%m%d";
static SCHEDULE_FORMAT: &str = "%Y-%m-%d";
/// Format of the UTC `DTSTAMP` passed to [`build_calendar`].
pub static CHANGED_FORMAT: &str = "%Y%m%dT%H%M%SZ";
static TITLE_PREFIX: &str = "Svoz";

/// Labels upstream uses to mark holidays; they are not pickups.
static HOLIDAYS: [&str; 2] = ["velikonoce", "vánoce"];

static COLORS: [(&str, &str); 6] = [
    ("bio", "#8B4513"),
    ("papír", "#0000FF"),
    ("plasty", "#FFFF00"),
    ("směsný odpad", "#000000"),
    ("sklo", "#008000"),
    ("singlestream", "#FFA500"),
];

/// The schedule of one house as sent upstream: dates mapped to waste type labels.
pub type Schedule = Map<String, Value>;

/// A single pickup of one waste type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pickup {
    pub date: NaiveDate,
    pub label: String,
}

/// Flatten a schedule into pickups.
///
/// The labels of a date come either as the keys of a mapping or as a list. Dates which do
/// not parse and holiday markers are skipped without affecting the other entries.
pub fn pickups(schedule: &Schedule) -> Vec<Pickup> {
    let mut pickups = vec![];
    for (date, waste) in schedule {
        let Ok(date) = NaiveDate::parse_from_str(date, SCHEDULE_FORMAT) else {
            log::debug!("skipping schedule entry with date {date:?}");
            continue;
        };
        for label in labels(waste) {
            if is_holiday(&label) {
                continue;
            }
            pickups.push(Pickup { date, label });
        }
    }
    pickups
}

fn labels(waste: &Value) -> Vec<String> {
    match waste {
        Value::Object(map) => map.keys().cloned().collect(),
        Value::Array(list) => list.iter().filter_map(value_as_name).collect(),
        _ => vec![],
    }
}

pub fn is_holiday(label: &str) -> bool {
    HOLIDAYS.contains(&label.to_lowercase().as_str())
}

/// The display color of a waste type, if it has one.
pub fn color(label: &str) -> Option<&'static str> {
    let label = label.to_lowercase();
    COLORS
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, color)| *color)
}

/// Get a unique id for a pickup of one waste type on one date at one house.
///
/// Calendar applications rely on this to recognize re-imported events.
/// Changing this function is a breaking change!
pub fn uid(path: &str, date: NaiveDate, label: &str) -> String {
    let seed = format!("{path}_{date}_{label}");
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, seed.as_bytes()).to_string()
}

/// Escape a TEXT value: backslashes, semicolons, commas and line breaks.
pub fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(char) = chars.next() {
        match char {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\r' => {
                chars.next_if_eq(&'\n');
                escaped.push_str("\\n");
            }
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(char),
        }
    }
    escaped
}

pub fn title(house: &House) -> String {
    format!(
        "{TITLE_PREFIX} {}, {} {}",
        house.municipality, house.street, house.reference
    )
}

/// The artifact location of a house below `output_dir`.
///
/// Segments are always joined with `/`, since this string also seeds the event UIDs.
pub fn artifact_path(output_dir: &str, house: &House) -> String {
    format!(
        "{}/{}/{}/{}/{}.ics",
        output_dir.trim_end_matches('/'),
        slugify(&house.municipality),
        slugify(&house.district),
        slugify(&house.street),
        file_stem(&house.reference)
    )
}

/// Build the calendar of one house.
///
/// `changed` is a UTC timestamp in [`CHANGED_FORMAT`] and ends up as every event's `DTSTAMP`;
/// everything else only depends on the input.
pub fn build_calendar(
    title: &str,
    path: &str,
    schedule: &Schedule,
    changed: &str,
) -> IcalCalendar {
    let mut calendar = IcalCalendarBuilder::version("2.0")
        .gregorian()
        .prodid(PROD_ID)
        .build();
    calendar.properties.push(ical_property!("X-WR-CALNAME", escape_text(title)));
    calendar.properties.push(ical_property!("METHOD", "PUBLISH"));
    for pickup in pickups(schedule) {
        calendar.events.push(build_event(path, &pickup, changed));
    }
    calendar
}

fn build_event(path: &str, pickup: &Pickup, changed: &str) -> IcalEvent {
    let day = pickup.date.format(FORMAT).to_string();
    let text = escape_text(&pickup.label);
    let mut event = IcalEventBuilder::tzid(TIMEZONE)
        .uid(uid(path, pickup.date, &pickup.label))
        .changed_utc(changed)
        .one_day(day.clone())
        .set(ical_property!("SUMMARY", text.as_str()))
        .set(ical_property!("CATEGORIES", text.as_str()))
        .build();
    event
        .properties
        .push(ical_property!("DTEND", day, ical_param!("VALUE", "DATE")));
    if let Some(color) = color(&pickup.label) {
        event.properties.push(ical_property!("COLOR", color));
        event
            .properties
            .push(ical_property!("X-APPLE-CALENDAR-COLOR", color));
    }
    event
}

/// Write a calendar to `path`, replacing whatever is there.
pub async fn write_artifact(path: &str, calendar: &IcalCalendar) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, calendar.generate()).await?;
    Ok(())
}
