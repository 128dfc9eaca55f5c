//! Test fixtures shared by the use-case and API tests.
//!
//! - [`Seeded`] builds a small cave world in the in-memory store
//! - image helpers produce real PNG/JPEG bytes of a given size
//! - layout helpers produce valid template layouts
//! - [`RecordingQueue`] stands in for the SQLite job queue
//! - [`ScriptedVision`] stands in for the vision service

mod queue_mocks;
mod seeded;
mod vision_mocks;

pub use queue_mocks::RecordingQueue;
pub use seeded::Seeded;
pub use vision_mocks::{FakeScan, ScriptedVision};

use std::io::Cursor;

use chrono::{DateTime, TimeZone, Utc};
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use serde_json::json;

/// Fixed start of time for deterministic tests.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0)
        .single()
        .expect("valid fixture timestamp")
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageOutputFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageOutputFormat::Jpeg(80))
}

fn encode(width: u32, height: u32, format: ImageOutputFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
        .write_to(&mut Cursor::new(&mut bytes), format)
        .expect("encode fixture image");
    bytes
}

/// A location choice layout with room for four options.
pub fn location_choice_layout() -> serde_json::Value {
    json!({
        "code_region": { "x": 36.0, "y": 36.0, "width": 240.0, "height": 24.0 },
        "first_option": { "x": 48.0, "y": 200.0, "width": 14.0, "height": 14.0 },
        "option_spacing": 28.0,
        "max_options": 4
    })
}

pub fn join_game_layout() -> serde_json::Value {
    json!({
        "code_region": { "x": 36.0, "y": 36.0, "width": 240.0, "height": 24.0 },
        "name": { "x": 48.0, "y": 160.0, "width": 400.0, "height": 30.0 },
        "email": { "x": 48.0, "y": 220.0, "width": 400.0, "height": 30.0 },
        "postal_address": { "x": 48.0, "y": 280.0, "width": 400.0, "height": 90.0 }
    })
}
