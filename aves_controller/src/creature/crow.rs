//! The crow rig.
//!
//! Same differential head as the parrot but a smaller joint set: the
//! crow has no body lean, and its beak rides the head assembly.

use aves_common::range::input_to_position;

use crate::creature::head::DifferentialHead;
use crate::input::InputFrame;
use crate::servo::ServoBank;

pub(super) const REQUIRED_INPUTS: &[&str] =
    &["head_height", "head_tilt", "neck_rotate", "beak"];

pub(super) const REQUIRED_SERVOS: &[&str] = &["neck_left", "neck_right", "neck_rotate", "beak"];

/// Map one frame of inputs onto the crow's servos.
pub(super) fn map(head: &DifferentialHead, inputs: &InputFrame, bank: &mut ServoBank) {
    if let (Some(height), Some(tilt)) = (inputs.byte("head_height"), inputs.byte("head_tilt")) {
        let h = head.to_head_height(input_to_position(height));
        let t = head.to_head_tilt(input_to_position(tilt));
        let pose = head.position(h, t);
        let _ = bank.request("neck_left", pose.left);
        let _ = bank.request("neck_right", pose.right);
    }

    for (input, servo) in [("neck_rotate", "neck_rotate"), ("beak", "beak")] {
        if let Some(value) = inputs.byte(input) {
            let _ = bank.request(servo, input_to_position(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servo::{DefaultPosition, OutputLocation, Servo};

    #[test]
    fn maps_all_four_joints() {
        let head = DifferentialHead::new(0.4, 0, 1023);
        let mut bank = ServoBank::new();
        for (i, id) in REQUIRED_SERVOS.iter().enumerate() {
            bank.insert(
                Servo::new(
                    *id,
                    *id,
                    OutputLocation::Pwm {
                        module: 'A',
                        header: i as u8,
                    },
                    1000,
                    2000,
                    0.0,
                    false,
                    50,
                    DefaultPosition::Center,
                )
                .unwrap(),
            )
            .unwrap();
        }
        let inputs = InputFrame::from_values(
            [
                ("head_height", 0u16),
                ("head_tilt", 128),
                ("neck_rotate", 255),
                ("beak", 0),
            ]
            .map(|(k, v)| (k.to_string(), v)),
        );
        map(&head, &inputs, &mut bank);
        assert_eq!(bank.get("neck_rotate").unwrap().position(), 1023);
        assert_eq!(bank.get("beak").unwrap().position(), 0);
        // Head at the bottom of its band, tilt one count off center.
        assert_eq!(bank.get("neck_left").unwrap().position(), 203);
        assert_eq!(bank.get("neck_right").unwrap().position(), 205);
    }
}
