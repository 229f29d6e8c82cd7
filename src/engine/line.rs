//! Line classification from the rider-facing short name.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{Route, VehicleType};

/// Badge style and day-rollover behaviour of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Regular,
    Night,
    Substitute,
}

/// Night lines start with `6` or `9`, substitute lines with `7`.
///
/// Single-character names are always regular so lines `6`, `7` and `9`
/// keep plain badges.
pub fn classify(short_name: &str) -> LineKind {
    if short_name.chars().count() <= 1 {
        return LineKind::Regular;
    }
    if short_name.starts_with('6') || short_name.starts_with('9') {
        LineKind::Night
    } else if short_name.starts_with('7') {
        LineKind::Substitute
    } else {
        LineKind::Regular
    }
}

/// Published line families, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LineGroup {
    TramDay,
    TramSupport,
    TramKst,
    TramNight,
    TramSubstitute,
    TramCemetery,
    BusCity,
    BusAgglomeration,
    BusAgglomerationFast,
    BusCitySupport,
    BusCityFast,
    BusCityNight,
    BusSubstitute,
    BusCemetery,
    BusAgglomerationNight,
}

impl LineGroup {
    /// Family for a numeric line; `None` for non-numeric or unlisted numbers.
    pub fn of(short_name: &str, vehicle_type: VehicleType) -> Option<Self> {
        let number: u32 = short_name.trim().parse().ok()?;
        let group = match vehicle_type {
            VehicleType::Tram => match number {
                0..40 => LineGroup::TramDay,
                40..50 => LineGroup::TramSupport,
                50..60 => LineGroup::TramKst,
                60..70 => LineGroup::TramNight,
                70..80 => LineGroup::TramSubstitute,
                80..90 => LineGroup::TramCemetery,
                _ => return None,
            },
            VehicleType::Bus => match number {
                0..200 => LineGroup::BusCity,
                200..300 => LineGroup::BusAgglomeration,
                300..400 => LineGroup::BusAgglomerationFast,
                400..500 => LineGroup::BusCitySupport,
                500..600 => LineGroup::BusCityFast,
                600..700 => LineGroup::BusCityNight,
                700..800 => LineGroup::BusSubstitute,
                800..900 => LineGroup::BusCemetery,
                900..1000 => LineGroup::BusAgglomerationNight,
                _ => return None,
            },
        };
        Some(group)
    }

    pub fn label(&self) -> &'static str {
        match self {
            LineGroup::TramDay => "Day tram lines",
            LineGroup::TramSupport => "Support tram lines",
            LineGroup::TramKst => "KST tram lines",
            LineGroup::TramNight => "Night tram lines",
            LineGroup::TramSubstitute => "Substitute tram lines",
            LineGroup::TramCemetery => "Cemetery tram lines",
            LineGroup::BusCity => "City bus lines",
            LineGroup::BusAgglomeration => "Agglomeration bus lines",
            LineGroup::BusAgglomerationFast => "Fast agglomeration bus lines",
            LineGroup::BusCitySupport => "Support city bus lines",
            LineGroup::BusCityFast => "Fast city bus lines",
            LineGroup::BusCityNight => "Night city bus lines",
            LineGroup::BusSubstitute => "Substitute bus lines",
            LineGroup::BusCemetery => "Cemetery bus lines",
            LineGroup::BusAgglomerationNight => "Night agglomeration bus lines",
        }
    }
}

/// Buckets routes into families, each sorted by line number.
pub fn group_routes<'a>(
    routes: impl IntoIterator<Item = (&'a Route, VehicleType)>,
) -> BTreeMap<LineGroup, Vec<&'a Route>> {
    let mut groups: BTreeMap<LineGroup, Vec<&'a Route>> = BTreeMap::new();
    for (route, vehicle_type) in routes {
        if let Some(group) = LineGroup::of(&route.route_short_name, vehicle_type) {
            groups.entry(group).or_default().push(route);
        }
    }
    for routes in groups.values_mut() {
        routes.sort_by_key(|r| r.route_short_name.parse::<u32>().unwrap_or(u32::MAX));
    }
    groups
}
