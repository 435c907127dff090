//! Selector for the pitch detection algorithm.
//!
//! Only the detection stage looks at this value; conversion and feedback
//! behave the same whichever detector produced a sample.

use anyhow::{Error, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Detection strategy. There is no dynamic wavelet detector; settings that
/// name one fail to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PitchDetectionAlgorithm {
    /// McLeod pitch method (normalized square difference)
    #[default]
    McLeod,
    /// YIN cumulative mean normalized difference
    Yin,
    /// YIN followed by FFT peak refinement
    FftYin,
    /// Average magnitude difference function
    Amdf,
}

impl PitchDetectionAlgorithm {
    pub const ALL: [PitchDetectionAlgorithm; 4] = [
        PitchDetectionAlgorithm::McLeod,
        PitchDetectionAlgorithm::Yin,
        PitchDetectionAlgorithm::FftYin,
        PitchDetectionAlgorithm::Amdf,
    ];

    /// Human readable name for menus.
    pub fn display_name(self) -> &'static str {
        match self {
            PitchDetectionAlgorithm::McLeod => "McLeod (MPM)",
            PitchDetectionAlgorithm::Yin => "Yin",
            PitchDetectionAlgorithm::FftYin => "FFT + Yin",
            PitchDetectionAlgorithm::Amdf => "AMDF",
        }
    }

    /// Short identifier accepted by [`FromStr`], e.g. "fft-yin".
    pub fn id(self) -> &'static str {
        match self {
            PitchDetectionAlgorithm::McLeod => "mcleod",
            PitchDetectionAlgorithm::Yin => "yin",
            PitchDetectionAlgorithm::FftYin => "fft-yin",
            PitchDetectionAlgorithm::Amdf => "amdf",
        }
    }
}

impl fmt::Display for PitchDetectionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for PitchDetectionAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|a| a.id().eq_ignore_ascii_case(wanted) || a.display_name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|a| a.id()).collect();
                anyhow!("unknown pitch detection algorithm '{s}' (expected one of: {})", known.join(", "))
            })
    }
}
