//! Mapping from UI slider positions to filter levels.

use crate::native::FilterParam;
use std::fmt;
use std::str::FromStr;

/// One slider of the beauty UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Smooth,
    Whiteness,
    FaceThin,
    BigEye,
    LipstickBlend,
}

impl Control {
    pub const ALL: [Control; 5] = [
        Control::Smooth,
        Control::Whiteness,
        Control::FaceThin,
        Control::BigEye,
        Control::LipstickBlend,
    ];

    /// Slider position divided into a level.
    pub fn divisor(self) -> f32 {
        match self {
            Control::Smooth => 10.0,
            Control::Whiteness => 10.0,
            Control::FaceThin => 200.0,
            Control::BigEye => 100.0,
            Control::LipstickBlend => 10.0,
        }
    }

    /// Level for a slider position.
    pub fn level(self, progress: i32) -> f32 {
        progress as f32 / self.divisor()
    }

    pub fn param(self) -> FilterParam {
        match self {
            Control::Smooth => FilterParam::SmoothLevel,
            Control::Whiteness => FilterParam::WhiteLevel,
            Control::FaceThin => FilterParam::ThinLevel,
            Control::BigEye => FilterParam::BigeyeLevel,
            Control::LipstickBlend => FilterParam::BlendLevel,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Control::Smooth => "smooth",
            Control::Whiteness => "whiteness",
            Control::FaceThin => "thin",
            Control::BigEye => "bigeye",
            Control::LipstickBlend => "lipstick",
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Control {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Control::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<_> = Control::ALL.iter().map(|c| c.name()).collect();
                format!("unknown control '{}', expected one of {}", s, names.join(", "))
            })
    }
}
