//! Differential head kinematics.
//!
//! Two neck servos share the load of a head plate: raising both lifts
//! the head, raising one and lowering the other tilts it. The transform
//! shrinks the height range by the maximum tilt offset so that any
//! combination of height and tilt keeps both servos inside the position
//! bracket.

use aves_common::range::convert_range;
use tracing::{debug, trace};

/// Left/right neck servo positions for one head pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadPosition {
    pub left: u16,
    pub right: u16,
}

/// The paired-servo head transform.
#[derive(Debug, Clone)]
pub struct DifferentialHead {
    position_min: u16,
    position_max: u16,
    head_offset_max: i64,
}

impl DifferentialHead {
    /// Build from the creature's offset fraction and position bracket.
    pub fn new(head_offset_max_percent: f64, position_min: u16, position_max: u16) -> Self {
        let head_offset_max =
            ((position_max - position_min) as f64 * head_offset_max_percent).round() as i64;
        debug!("differential head: head_offset_max = {head_offset_max}");
        Self {
            position_min,
            position_max,
            head_offset_max,
        }
    }

    /// Compress a raw height position into the tilt-safe band.
    pub fn to_head_height(&self, y: u16) -> u16 {
        convert_range(
            y as i64,
            self.position_min as i64,
            self.position_max as i64,
            self.position_min as i64 + self.head_offset_max / 2,
            self.position_max as i64 - self.head_offset_max / 2,
        ) as u16
    }

    /// Map a raw tilt position into a signed offset.
    pub fn to_head_tilt(&self, x: u16) -> i32 {
        convert_range(
            x as i64,
            self.position_min as i64,
            self.position_max as i64,
            1 - self.head_offset_max / 2,
            self.head_offset_max / 2,
        ) as i32
    }

    /// Combine a compressed height and a signed tilt into the servo pair.
    pub fn position(&self, height: u16, tilt: i32) -> HeadPosition {
        let left = height as i32 - tilt;
        let right = height as i32 + tilt;
        trace!("head position: height {height}, tilt {tilt} -> left {left}, right {right}");

        debug_assert!(left >= self.position_min as i32 && left <= self.position_max as i32);
        debug_assert!(right >= self.position_min as i32 && right <= self.position_max as i32);

        HeadPosition {
            left: left as u16,
            right: right as u16,
        }
    }

    pub fn head_offset_max(&self) -> i64 {
        self.head_offset_max
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
