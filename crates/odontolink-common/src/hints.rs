//! Hint tags attached to tokens and mentions.
//!
//! Hints are plain strings on the wire so upstream producers can add tags
//! this crate does not know about. The constants below are the ones the
//! linker itself reads.

pub const DEVICE: &str = "device_hint";
pub const IMPLANT: &str = "implant_hint";
pub const MATERIAL: &str = "material_hint";
pub const FINDING: &str = "finding_hint";
pub const DIMENSION: &str = "dimension_hint";

/// Hints that mark a device-like mention eligible for bundling.
pub fn is_device_like(hint: &str) -> bool {
    hint == DEVICE || hint == IMPLANT
}
