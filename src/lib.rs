//! Board Calibrator
//!
//! Finds a physical game board in a camera feed and computes the
//! camera-to-screen transform once the board has been held still long enough:
//! - Throttled frame delivery from a camera (nokhwa) or a simulated source
//! - Two-stage recognition: corner markers, then the board pattern
//! - Stability acceptance with brightness feedback
//! - nalgebra homography from camera quad to screen quad

pub mod board;
pub mod calibration;
pub mod camera;
pub mod config;
pub mod geometry;
pub mod recognition;
pub mod simulation;
