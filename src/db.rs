use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, de::Error as _};

use crate::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(AppError::validation(format!("longitude {} out of range", self.lng)));
        }
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(AppError::validation(format!("latitude {} out of range", self.lat)));
        }
        Ok(())
    }
}

/// One-based day of a multi-day route.
///
/// Clients send it either as a number or as a numeric string (`"1"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Day(u32);

impl Day {
    pub const FIRST: Day = Day(1);

    pub fn new(day: u32) -> Result<Self, AppError> {
        if day == 0 {
            return Err(AppError::validation("day must be 1 or greater"));
        }
        Ok(Self(day))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for Day {
    fn default() -> Self {
        Self::FIRST
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<'de> Deserialize<'de> for Day {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u32),
            Text(String),
        }

        let day = match Raw::deserialize(deserializer)? {
            Raw::Number(day) => day,
            Raw::Text(text) => text
                .trim()
                .parse::<u32>()
                .map_err(|_| D::Error::custom(format!("day {text:?} is not a number")))?,
        };
        Day::new(day).map_err(D::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permissions {
    #[default]
    Private,
    Friends,
    Public,
}

impl Permissions {
    pub fn as_str(self) -> &'static str {
        match self {
            Permissions::Private => "private",
            Permissions::Friends => "friends",
            Permissions::Public => "public",
        }
    }
}

impl FromStr for Permissions {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Permissions::Private),
            "friends" => Ok(Permissions::Friends),
            "public" => Ok(Permissions::Public),
            other => Err(AppError::validation(format!("unknown permissions {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub id: String,
    pub lng_lat: LngLat,
    pub place_name: String,
    pub day: Day,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub route_id: String,
    pub route_name: String,
    pub permissions: Permissions,
    /// Markers keyed by day, each day in append order.
    pub markers: BTreeMap<Day, Vec<Marker>>,
}

impl Route {
    pub fn day(&self, day: Day) -> &[Marker] {
        self.markers.get(&day).map(Vec::as_slice).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRouteCollection {
    pub user_id: String,
    /// Creation order.
    pub paths: Vec<Route>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub room: String,
    pub user: String,
    pub message: String,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_accepts_numbers_and_numeric_strings() {
        assert_eq!(serde_json::from_str::<Day>("2").unwrap(), Day(2));
        assert_eq!(serde_json::from_str::<Day>("\"1\"").unwrap(), Day::FIRST);
        assert!(serde_json::from_str::<Day>("0").is_err());
        assert!(serde_json::from_str::<Day>("\"monday\"").is_err());
    }

    #[test]
    fn coordinates_out_of_range_are_rejected() {
        assert!(LngLat { lng: 121.5, lat: 25.2 }.validate().is_ok());
        assert!(LngLat { lng: 181.0, lat: 0.0 }.validate().is_err());
        assert!(LngLat { lng: 0.0, lat: f64::NAN }.validate().is_err());
    }
}
