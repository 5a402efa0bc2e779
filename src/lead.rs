//! The twelve standard ECG leads and their two canonical print orderings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Lead {
    I,
    II,
    III,
    AVR,
    AVL,
    AVF,
    V1,
    V2,
    V3,
    V4,
    V5,
    V6,
}

impl Lead {
    pub fn name(self) -> &'static str {
        match self {
            Lead::I => "I",
            Lead::II => "II",
            Lead::III => "III",
            Lead::AVR => "aVR",
            Lead::AVL => "aVL",
            Lead::AVF => "aVF",
            Lead::V1 => "V1",
            Lead::V2 => "V2",
            Lead::V3 => "V3",
            Lead::V4 => "V4",
            Lead::V5 => "V5",
            Lead::V6 => "V6",
        }
    }

    /// Printed order, column order in the CSV header (spec.md §6), and
    /// iteration order for lookups that don't care about presentation.
    pub const STANDARD: [Lead; 12] = [
        Lead::I,
        Lead::II,
        Lead::III,
        Lead::AVR,
        Lead::AVL,
        Lead::AVF,
        Lead::V1,
        Lead::V2,
        Lead::V3,
        Lead::V4,
        Lead::V5,
        Lead::V6,
    ];

    /// Cabrera presentation order: aVR is printed inverted at its slot.
    pub const CABRERA: [Lead; 12] = [
        Lead::AVL,
        Lead::I,
        Lead::AVR,
        Lead::II,
        Lead::AVF,
        Lead::III,
        Lead::V1,
        Lead::V2,
        Lead::V3,
        Lead::V4,
        Lead::V5,
        Lead::V6,
    ];
}

impl fmt::Display for Lead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Lead {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "I" => Ok(Lead::I),
            "II" => Ok(Lead::II),
            "III" => Ok(Lead::III),
            "aVR" | "AVR" => Ok(Lead::AVR),
            "aVL" | "AVL" => Ok(Lead::AVL),
            "aVF" | "AVF" => Ok(Lead::AVF),
            "V1" => Ok(Lead::V1),
            "V2" => Ok(Lead::V2),
            "V3" => Ok(Lead::V3),
            "V4" => Ok(Lead::V4),
            "V5" => Ok(Lead::V5),
            "V6" => Ok(Lead::V6),
            other => Err(format!("unrecognised lead name '{other}'")),
        }
    }
}

impl TryFrom<String> for Lead {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Lead> for String {
    fn from(lead: Lead) -> Self {
        lead.name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cabrera_inverts_aVR_position_only() {
        let standard_idx = Lead::STANDARD.iter().position(|&l| l == Lead::AVR).unwrap();
        let cabrera_idx = Lead::CABRERA.iter().position(|&l| l == Lead::AVR).unwrap();
        assert_ne!(standard_idx, cabrera_idx);
    }

    #[test]
    fn round_trips_through_display_and_from_str() {
        for lead in Lead::STANDARD {
            let parsed: Lead = lead.name().parse().unwrap();
            assert_eq!(parsed, lead);
        }
    }

    #[test]
    fn round_trips_through_json() {
        for lead in Lead::STANDARD {
            let json = serde_json::to_string(&lead).unwrap();
            let back: Lead = serde_json::from_str(&json).unwrap();
            assert_eq!(back, lead);
        }
    }
}
