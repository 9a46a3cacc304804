//! Feature presets and reference points.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Sample of a trajectory a feature is read from.
///
/// Naming follows the established feature vocabulary: `Entry` is the
/// trajectory's *last* sample and `Start` its *first*. This is the opposite of
/// the clustering engine's entry/exit (first/last); stored feature tables
/// depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferencePoint {
    /// Code `e`: index n - 1.
    Entry,
    /// Code `s`: index 0.
    Start,
    /// Code `m`: index n / 2.
    Mid,
}

impl ReferencePoint {
    pub fn from_code(code: char) -> Result<Self> {
        match code {
            'e' => Ok(Self::Entry),
            's' => Ok(Self::Start),
            'm' => Ok(Self::Mid),
            other => Err(Error::UnknownReferencePoint(other)),
        }
    }

    pub fn code(self) -> char {
        match self {
            Self::Entry => 'e',
            Self::Start => 's',
            Self::Mid => 'm',
        }
    }

    /// Index of this point in a trajectory of `n > 0` samples.
    #[inline]
    pub fn index(self, n: usize) -> usize {
        match self {
            Self::Entry => n - 1,
            Self::Start => 0,
            Self::Mid => n / 2,
        }
    }
}

/// Which field groups a feature vector contains.
///
/// Groups are always emitted in the fixed order entry-position,
/// entry-velocity, entry-acceleration, start-position, mid-position, two
/// scalars each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureSpec {
    pub entry_position: bool,
    pub entry_velocity: bool,
    pub entry_acceleration: bool,
    pub start_position: bool,
    pub mid_position: bool,
}

impl FeatureSpec {
    /// `Re`: entry position only.
    pub const RE: Self = Self {
        entry_position: true,
        entry_velocity: false,
        entry_acceleration: false,
        start_position: false,
        mid_position: false,
    };

    /// `ReVe`: entry position and velocity.
    pub const RE_VE: Self = Self {
        entry_velocity: true,
        ..Self::RE
    };

    /// `ReVeRs`: entry position and velocity plus start position.
    pub const RE_VE_RS: Self = Self {
        start_position: true,
        ..Self::RE_VE
    };

    /// Parse a preset name.
    ///
    /// Besides the named presets any concatenation of the tokens `Re`, `Ve`,
    /// `Ae`, `Rs` and `Rm` is accepted: R/V/A select position, velocity or
    /// acceleration and the lowercase letter is the reference point code.
    pub fn parse(name: &str) -> Result<Self> {
        let chars: Vec<char> = name.chars().collect();
        if chars.is_empty() || chars.len() % 2 != 0 {
            return Err(Error::UnknownFeaturePreset(name.to_string()));
        }

        let mut spec = Self::default();
        for pair in chars.chunks(2) {
            let point = ReferencePoint::from_code(pair[1])?;
            let flag = match (pair[0], point) {
                ('R', ReferencePoint::Entry) => &mut spec.entry_position,
                ('V', ReferencePoint::Entry) => &mut spec.entry_velocity,
                ('A', ReferencePoint::Entry) => &mut spec.entry_acceleration,
                ('R', ReferencePoint::Start) => &mut spec.start_position,
                ('R', ReferencePoint::Mid) => &mut spec.mid_position,
                _ => return Err(Error::UnknownFeaturePreset(name.to_string())),
            };
            *flag = true;
        }
        Ok(spec)
    }

    /// Number of enabled field groups.
    pub fn groups(&self) -> usize {
        [
            self.entry_position,
            self.entry_velocity,
            self.entry_acceleration,
            self.start_position,
            self.mid_position,
        ]
        .iter()
        .filter(|on| **on)
        .count()
    }

    /// Vector length produced by this spec.
    pub fn len(&self) -> usize {
        2 * self.groups()
    }

    pub fn is_empty(&self) -> bool {
        self.groups() == 0
    }
}

impl FromStr for FeatureSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for FeatureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens = [
            (self.entry_position, "Re"),
            (self.entry_velocity, "Ve"),
            (self.entry_acceleration, "Ae"),
            (self.start_position, "Rs"),
            (self.mid_position, "Rm"),
        ];
        for (on, token) in tokens {
            if on {
                f.write_str(token)?;
            }
        }
        Ok(())
    }
}
