//! Line weighting and the heat colour scale.

use std::fmt;

/// How a line's count is turned into an intensity and a printed label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Weighting {
    /// Share of all samples of the clock: `count / total`, printed as a percentage
    #[default]
    Percentage,
    /// Estimated time on the line: `count / rate` seconds, intensity relative
    /// to the hottest line of the file
    Duration,
}

impl Weighting {
    pub fn name(self) -> &'static str {
        match self {
            Weighting::Percentage => "percentage",
            Weighting::Duration => "duration",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "percentage" => Some(Weighting::Percentage),
            "duration" => Some(Weighting::Duration),
            _ => None,
        }
    }

    /// Narrowest label this weighting produces
    pub fn label_width(self) -> usize {
        match self {
            Weighting::Percentage => 6,
            Weighting::Duration => 7,
        }
    }
}

/// An `#rrggbb` background colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// Saturation in [0, 255] for an intensity in [0, 1]
pub fn saturation(intensity: f64) -> u8 {
    if intensity.is_nan() {
        return 0;
    }
    (intensity.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Heat colour: white at 0, pure red at 1. Red stays at max while green
/// and blue drop together.
pub fn heat(intensity: f64) -> Rgb {
    let k = saturation(intensity);
    Rgb(0xff, 0xff - k, 0xff - k)
}

/// Scale applied to the lines of one file
#[derive(Debug, Clone, Copy)]
pub struct Scale {
    pub weighting: Weighting,
    /// Sample total of the clock
    pub total: u64,
    /// Highest count of any line in the file
    pub file_max: u64,
    pub samples_per_second: u32,
}

impl Scale {
    pub fn intensity(&self, count: u64) -> f64 {
        let denominator = match self.weighting {
            Weighting::Percentage => self.total,
            Weighting::Duration => self.file_max,
        };
        if denominator == 0 {
            return 0.0;
        }
        (count as f64 / denominator as f64).min(1.0)
    }

    /// Unpadded label printed in front of a sampled line
    pub fn label(&self, count: u64) -> String {
        match self.weighting {
            Weighting::Percentage => {
                let percent = if self.total == 0 {
                    0.0
                } else {
                    (100.0 * count as f64 / self.total as f64).min(100.0)
                };
                format!("{:>5.1}%", percent)
            }
            Weighting::Duration => {
                let seconds = count as f64 / self.samples_per_second.max(1) as f64;
                format!("{:>6.2}s", seconds)
            }
        }
    }
}
