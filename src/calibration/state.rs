//! Calibration states, transitions, and the brightness hint.

use crate::config::AcceptanceConfig;

/// State of the board calibrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    /// No calibration requested yet.
    Uncalibrated,
    /// Collecting stable recognitions.
    Calibrating,
    /// Transform published. Stays here until the next `start_find_bounds`.
    Calibrated,
}

impl CalibrationState {
    pub fn is_calibrated(&self) -> bool {
        matches!(self, CalibrationState::Calibrated)
    }

    pub fn is_calibrating(&self) -> bool {
        matches!(self, CalibrationState::Calibrating)
    }
}

impl std::fmt::Display for CalibrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalibrationState::Uncalibrated => write!(f, "Uncalibrated"),
            CalibrationState::Calibrating => write!(f, "Calibrating"),
            CalibrationState::Calibrated => write!(f, "Calibrated"),
        }
    }
}

/// A state change, as reported to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: CalibrationState,
    pub to: CalibrationState,
}

/// Direction the brightness hint moves on the next failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrightnessDirection {
    Darker,
    Brighter,
}

/// Adaptive brightness for the on-screen border, nudged on every failed frame.
///
/// Sweeps between the dark and bright limits, reversing at each end, so a
/// board that is only visible at some exposure is eventually hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrightnessHint {
    value: f32,
    direction: BrightnessDirection,
    step: f32,
    dark: f32,
    bright: f32,
}

impl BrightnessHint {
    /// Full brightness, moving darker.
    pub fn neutral(config: &AcceptanceConfig) -> Self {
        Self {
            value: config.brightness_bright,
            direction: BrightnessDirection::Darker,
            step: config.brightness_step,
            dark: config.brightness_dark,
            bright: config.brightness_bright,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn direction(&self) -> BrightnessDirection {
        self.direction
    }

    pub fn limits(&self) -> (f32, f32) {
        (self.dark, self.bright)
    }

    /// Move one step; clamp at a limit and reverse.
    pub fn step(&mut self) {
        match self.direction {
            BrightnessDirection::Brighter => {
                self.value += self.step;
                if self.value >= self.bright {
                    self.value = self.bright;
                    self.direction = BrightnessDirection::Darker;
                }
            }
            BrightnessDirection::Darker => {
                self.value -= self.step;
                if self.value <= self.dark {
                    self.value = self.dark;
                    self.direction = BrightnessDirection::Brighter;
                }
            }
        }
    }
}
