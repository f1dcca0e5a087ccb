//! Stop and stop list types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error returned when a raw stop sequence fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    /// No stops were supplied.
    #[error("stop list must contain at least one stop")]
    EmptyStopList,

    /// The stop at `index` has a latitude or longitude out of range or non-finite.
    #[error("invalid coordinate at stop {index}")]
    InvalidCoordinate { index: usize },
}

/// A stop as received from a caller, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawStop {
    pub latitude: f64,
    pub longitude: f64,
}

impl RawStop {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A validated geographic waypoint.
///
/// Latitude is always within [-90, 90] and longitude within [-180, 180],
/// both finite. A `Stop` can only be obtained through [`Stop::new`] or
/// [`validate`], so holders can trust its coordinates.
///
/// # Examples
///
/// ```
/// use route_server::domain::Stop;
///
/// let stop = Stop::new(40.0, -73.0).unwrap();
/// assert_eq!(stop.latitude(), 40.0);
///
/// assert!(Stop::new(91.0, 0.0).is_none());
/// assert!(Stop::new(0.0, f64::NAN).is_none());
/// ```
#[derive(Clone, Copy, PartialEq, Serialize)]
pub struct Stop {
    latitude: f64,
    longitude: f64,
}

impl Stop {
    /// Build a stop, returning `None` if either coordinate is out of range.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let lat_ok = latitude.is_finite() && (-90.0..=90.0).contains(&latitude);
        let lng_ok = longitude.is_finite() && (-180.0..=180.0).contains(&longitude);

        (lat_ok && lng_ok).then_some(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl fmt::Debug for Stop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stop({}, {})", self.latitude, self.longitude)
    }
}

impl fmt::Display for Stop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.latitude, self.longitude)
    }
}

/// An ordered, non-empty sequence of stops.
///
/// The first stop is the first destination. Order is never changed and
/// duplicates are kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StopList(Vec<Stop>);

impl StopList {
    /// Number of stops (always at least one).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; present for API symmetry with collections.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Stop> {
        self.0.iter()
    }

    /// The final destination.
    pub fn last(&self) -> &Stop {
        // Non-empty by construction
        &self.0[self.0.len() - 1]
    }
}

impl<'a> IntoIterator for &'a StopList {
    type Item = &'a Stop;
    type IntoIter = std::slice::Iter<'a, Stop>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Validate a raw stop sequence into a [`StopList`].
///
/// Rejects empty input and reports the first stop whose coordinates are
/// out of range or non-finite.
pub fn validate(raw: &[RawStop]) -> Result<StopList, ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::EmptyStopList);
    }

    raw.iter()
        .enumerate()
        .map(|(index, s)| {
            Stop::new(s.latitude, s.longitude).ok_or(ValidationError::InvalidCoordinate { index })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(StopList)
}
