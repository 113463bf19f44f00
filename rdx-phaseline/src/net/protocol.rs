//! Wire format: one ASCII datagram per message, no acknowledgment.
//!
//! | Message   | Payload                                  |
//! |-----------|------------------------------------------|
//! | start     | `/start`                                 |
//! | end       | `/end`                                   |
//! | vibration | `/vibration {intensity:.2} {frequency:.2}` |

use crate::haptics::HapticFrame;

/// A control message for the haptic device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HapticMessage {
    Start,
    End,
    Vibration(HapticFrame),
}

impl HapticMessage {
    /// Builds a vibration message: the frame is clamped to `[0, 1]` first and
    /// only then scaled by the multipliers.
    pub fn vibration(frame: HapticFrame, intensity_multiplier: f32, frequency_multiplier: f32) -> Self {
        let clamped = frame.clamped();
        HapticMessage::Vibration(HapticFrame {
            intensity: clamped.intensity * intensity_multiplier,
            frequency: clamped.frequency * frequency_multiplier,
        })
    }

    /// Short name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            HapticMessage::Start => "start",
            HapticMessage::End => "end",
            HapticMessage::Vibration(_) => "vibration",
        }
    }

    pub fn encode(&self) -> String {
        match self {
            HapticMessage::Start => "/start".to_string(),
            HapticMessage::End => "/end".to_string(),
            HapticMessage::Vibration(frame) => {
                format!("/vibration {:.2} {:.2}", frame.intensity, frame.frequency)
            }
        }
    }
}

impl std::fmt::Display for HapticMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_messages_have_fixed_payloads() {
        assert_eq!(HapticMessage::Start.encode(), "/start");
        assert_eq!(HapticMessage::End.encode(), "/end");
    }

    #[test]
    fn vibration_uses_two_decimals() {
        let msg = HapticMessage::vibration(HapticFrame::new(0.123, 0.5), 1.0, 1.0);
        assert_eq!(msg.encode(), "/vibration 0.12 0.50");
        assert_eq!(
            HapticMessage::Vibration(HapticFrame::ZERO).to_string(),
            "/vibration 0.00 0.00"
        );
    }

    #[test]
    fn clamping_happens_before_scaling() {
        let msg = HapticMessage::vibration(HapticFrame::new(3.0, -1.0), 2.0, 0.5);
        assert_eq!(msg.encode(), "/vibration 2.00 0.00");
    }
}
