//! The parrot rig.
//!
//! Differential neck pair plus rotate, lean, and beak joints. The chest
//! and stand inputs are declared so the show data is validated, but
//! their actuators live on the stepper bus, which this controller does
//! not drive.

use aves_common::range::input_to_position;

use crate::creature::head::DifferentialHead;
use crate::input::InputFrame;
use crate::servo::ServoBank;

pub(super) const REQUIRED_INPUTS: &[&str] = &[
    "head_height",
    "head_tilt",
    "neck_rotate",
    "body_lean",
    "beak",
    "chest",
    "stand_rotate",
];

pub(super) const REQUIRED_SERVOS: &[&str] =
    &["neck_left", "neck_right", "neck_rotate", "body_lean", "beak"];

/// Map one frame of inputs onto the parrot's servos.
pub(super) fn map(head: &DifferentialHead, inputs: &InputFrame, bank: &mut ServoBank) {
    if let (Some(height), Some(tilt)) = (inputs.byte("head_height"), inputs.byte("head_tilt")) {
        let h = head.to_head_height(input_to_position(height));
        let t = head.to_head_tilt(input_to_position(tilt));
        let pose = head.position(h, t);
        let _ = bank.request("neck_left", pose.left);
        let _ = bank.request("neck_right", pose.right);
    }

    for (input, servo) in [
        ("neck_rotate", "neck_rotate"),
        ("body_lean", "body_lean"),
        ("beak", "beak"),
    ] {
        if let Some(value) = inputs.byte(input) {
            let _ = bank.request(servo, input_to_position(value));
        }
    }
}
