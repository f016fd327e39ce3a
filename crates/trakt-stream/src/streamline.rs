use serde::{Deserialize, Serialize};
use trakt_core::Point3;

/// Ordered 3-D polyline tracing a fiber tract.
///
/// `index` is the streamline's position in the input tractogram and is kept
/// through every stage for diagnostics. `properties` holds the TrackVis
/// per-streamline properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Streamline {
    pub index: usize,
    pub points: Vec<Point3>,
    pub properties: Vec<f32>,
}

impl Streamline {
    pub fn new(index: usize, points: Vec<Point3>) -> Self {
        Self {
            index,
            points,
            properties: Vec::new(),
        }
    }

    pub fn with_properties(mut self, properties: Vec<f32>) -> Self {
        self.properties = properties;
        self
    }

    /// A streamline with the same index and properties and new points.
    pub fn with_points(&self, points: Vec<Point3>) -> Self {
        Self {
            index: self.index,
            points,
            properties: self.properties.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Arc length: sum of distances between consecutive points.
    pub fn length(&self) -> f64 {
        self.points.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }
}

/// Total number of points over a set of streamlines.
pub fn total_points(streamlines: &[Streamline]) -> usize {
    streamlines.iter().map(Streamline::len).sum()
}
