//! Physical-to-voxel streamline transform with field-of-view clipping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use trakt_core::{shape3, Affine, Point3, Shape3};

use crate::error::{Result, TractError};
use crate::streamline::Streamline;

/// How points outside the target grid are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClipPolicy {
    /// Remove every outside point. An interior excursion becomes a straight
    /// jump between the points on either side of it.
    #[default]
    DropOutside,
    /// Keep only the longest run of consecutive inside points.
    LongestRun,
}

impl FromStr for ClipPolicy {
    type Err = TractError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "drop-outside" => Ok(Self::DropOutside),
            "longest-run" => Ok(Self::LongestRun),
            other => Err(TractError::invalid_configuration(format!(
                "unknown clip policy '{}', expected 'drop-outside' or 'longest-run'",
                other
            ))),
        }
    }
}

impl fmt::Display for ClipPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DropOutside => write!(f, "drop-outside"),
            Self::LongestRun => write!(f, "longest-run"),
        }
    }
}

/// Maps streamlines from physical millimetres into voxel indices of the
/// target grid and clips them to its field of view.
///
/// A point is inside iff every voxel coordinate lies in `[0, shape - 1]`.
/// Streamlines are never split; those left with fewer than two points are
/// dropped.
#[derive(Debug, Clone)]
pub struct StreamlineTransformer {
    to_voxel: Affine,
    shape: Shape3,
    policy: ClipPolicy,
}

impl StreamlineTransformer {
    pub fn new(target_affine: &Affine, shape: Shape3, policy: ClipPolicy) -> Result<Self> {
        shape3(&shape)?;
        let to_voxel = target_affine.inverse()?;
        Ok(Self { to_voxel, shape, policy })
    }

    pub fn shape(&self) -> Shape3 {
        self.shape
    }

    pub fn policy(&self) -> ClipPolicy {
        self.policy
    }

    /// Map a physical point to continuous voxel indices.
    pub fn to_voxel(&self, point: &Point3) -> Point3 {
        self.to_voxel.transform_point(point)
    }

    /// Whether a voxel-space point lies inside the grid.
    pub fn in_fov(&self, voxel: &Point3) -> bool {
        (0..3).all(|axis| voxel[axis] >= 0.0 && voxel[axis] <= (self.shape[axis] - 1) as f64)
    }

    /// Transform one streamline and clip it.
    pub fn transform(&self, streamline: &Streamline) -> Option<Streamline> {
        let points = streamline.points.iter().map(|p| self.to_voxel(p)).collect();
        self.clip(&streamline.with_points(points))
    }

    /// Transform a set of streamlines, keeping input order and dropping
    /// those that leave the field of view.
    pub fn transform_all(&self, streamlines: &[Streamline]) -> Vec<Streamline> {
        streamlines.iter().filter_map(|s| self.transform(s)).collect()
    }

    /// Clip a streamline that is already in voxel space.
    pub fn clip(&self, streamline: &Streamline) -> Option<Streamline> {
        let inside: Vec<bool> = streamline.points.iter().map(|p| self.in_fov(p)).collect();

        let kept: Vec<Point3> = match self.policy {
            ClipPolicy::DropOutside => {
                let first = inside.iter().position(|&b| b);
                let last = inside.iter().rposition(|&b| b);
                if let (Some(first), Some(last)) = (first, last) {
                    let gaps = inside[first..=last].iter().filter(|&&b| !b).count();
                    if gaps > 0 {
                        tracing::debug!(
                            "Streamline {}: joining across {} interior point(s) outside the field of view",
                            streamline.index,
                            gaps
                        );
                    }
                }
                streamline
                    .points
                    .iter()
                    .zip(&inside)
                    .filter(|(_, inside)| **inside)
                    .map(|(p, _)| *p)
                    .collect()
            }
            ClipPolicy::LongestRun => {
                let run = longest_run(&inside);
                streamline.points[run].to_vec()
            }
        };

        if kept.len() < 2 {
            return None;
        }
        Some(streamline.with_points(kept))
    }
}

/// Range of the longest run of `true` values (first one on ties).
fn longest_run(flags: &[bool]) -> std::ops::Range<usize> {
    let mut best = 0..0;
    let mut start = None;
    for (n, &flag) in flags.iter().chain(std::iter::once(&false)).enumerate() {
        match (flag, start) {
            (true, None) => start = Some(n),
            (false, Some(s)) => {
                if n - s > best.len() {
                    best = s..n;
                }
                start = None;
            }
            _ => {}
        }
    }
    best
}
