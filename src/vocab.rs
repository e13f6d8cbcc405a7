//! Shared data-sharing vocabulary
//!
//! The data types, purposes and receiver roles used by every agent prompt,
//! every ledger row and the consent evaluator. Labels are rendered from
//! these enums so the lists stay byte-identical everywhere they appear.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

/// Category of patient data that a consent or regulation can cover
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataType {
    ClinicalNotes,
    LabResults,
    Genomic,
    MentalHealth,
    PersonalHealthRecords,
    MedicalHistory,
    All,
}

impl DataType {
    /// Every data type, in ledger-code order
    pub const ALL: [DataType; 7] = [
        DataType::ClinicalNotes,
        DataType::LabResults,
        DataType::Genomic,
        DataType::MentalHealth,
        DataType::PersonalHealthRecords,
        DataType::MedicalHistory,
        DataType::All,
    ];

    /// Every concrete data type ("All Data Types" excluded)
    pub const CONCRETE: [DataType; 6] = [
        DataType::ClinicalNotes,
        DataType::LabResults,
        DataType::Genomic,
        DataType::MentalHealth,
        DataType::PersonalHealthRecords,
        DataType::MedicalHistory,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DataType::ClinicalNotes => "Clinical Notes & Diagnosis",
            DataType::LabResults => "Lab & Test Results",
            DataType::Genomic => "Genomic Data",
            DataType::MentalHealth => "Mental Health Data",
            DataType::PersonalHealthRecords => "PHRs",
            DataType::MedicalHistory => "Medical History",
            DataType::All => "All Data Types",
        }
    }

    /// Numeric code used by the consent contract
    pub fn code(self) -> u8 {
        match self {
            DataType::ClinicalNotes => 1,
            DataType::LabResults => 2,
            DataType::Genomic => 3,
            DataType::MentalHealth => 4,
            DataType::PersonalHealthRecords => 5,
            DataType::MedicalHistory => 6,
            DataType::All => 7,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.code() == code)
    }

    /// Parse a label leniently (case, surrounding whitespace, the
    /// "PHRs (e.g. Device Records)" long form)
    pub fn from_label(label: &str) -> Option<Self> {
        let wanted = normalize(label);
        if wanted.starts_with("phrs") {
            return Some(DataType::PersonalHealthRecords);
        }
        Self::ALL.into_iter().find(|d| normalize(d.label()) == wanted)
    }

    /// Expand "All Data Types" into the concrete types
    pub fn expand(self) -> Vec<DataType> {
        match self {
            DataType::All => Self::CONCRETE.to_vec(),
            other => vec![other],
        }
    }

    /// Render a ledger code the way the consent lookups present it
    pub fn describe_code(code: u8) -> String {
        match Self::from_code(code) {
            Some(d) => d.label().to_string(),
            None => format!("Unknown({})", code),
        }
    }
}

/// Reason a receiver wants the data
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Purpose {
    Treatment,
    Research,
    InsuranceClaim,
    ClinicalTrial,
    CommercialUse,
    All,
}

impl Purpose {
    pub const ALL: [Purpose; 6] = [
        Purpose::Treatment,
        Purpose::Research,
        Purpose::InsuranceClaim,
        Purpose::ClinicalTrial,
        Purpose::CommercialUse,
        Purpose::All,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Purpose::Treatment => "Treatment",
            Purpose::Research => "Research",
            Purpose::InsuranceClaim => "Insurance Claim",
            Purpose::ClinicalTrial => "Clinical Trial",
            Purpose::CommercialUse => "Commercial Use",
            Purpose::All => "All Purposes",
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Purpose::Treatment => 1,
            Purpose::Research => 2,
            Purpose::InsuranceClaim => 3,
            Purpose::ClinicalTrial => 4,
            Purpose::CommercialUse => 5,
            Purpose::All => 6,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.code() == code)
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let wanted = normalize(label);
        Self::ALL.into_iter().find(|p| normalize(p.label()) == wanted)
    }

    /// Whether a consent listing `self` covers the requested purpose
    pub fn covers(self, requested: Purpose) -> bool {
        self == Purpose::All || self == requested
    }

    pub fn describe_code(code: u8) -> String {
        match Self::from_code(code) {
            Some(p) => p.label().to_string(),
            None => format!("Unknown({})", code),
        }
    }
}

/// Class of organisation receiving patient data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiverRole {
    Hospital,
    ResearchLab,
    InsuranceCompany,
}

impl ReceiverRole {
    pub const ALL: [ReceiverRole; 3] = [
        ReceiverRole::Hospital,
        ReceiverRole::ResearchLab,
        ReceiverRole::InsuranceCompany,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ReceiverRole::Hospital => "hospital",
            ReceiverRole::ResearchLab => "research lab",
            ReceiverRole::InsuranceCompany => "insurance company",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let wanted = normalize(label).replace(['_', '-'], " ");
        match wanted.as_str() {
            "hospital" => Some(ReceiverRole::Hospital),
            "research lab" | "researchlab" | "lab" => Some(ReceiverRole::ResearchLab),
            "insurance company" | "insurance" => Some(ReceiverRole::InsuranceCompany),
            _ => None,
        }
    }
}

/// Strictest patient consent a regulation asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ConsentRequirement {
    None,
    #[default]
    Broad,
    Specific,
    Explicit,
}

impl ConsentRequirement {
    pub fn label(self) -> &'static str {
        match self {
            ConsentRequirement::None => "None",
            ConsentRequirement::Broad => "Broad",
            ConsentRequirement::Specific => "Specific",
            ConsentRequirement::Explicit => "Explicit",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match normalize(label).as_str() {
            "none" => Some(ConsentRequirement::None),
            "broad" => Some(ConsentRequirement::Broad),
            "specific" => Some(ConsentRequirement::Specific),
            "explicit" => Some(ConsentRequirement::Explicit),
            _ => None,
        }
    }
}

/// Comma-separated list of every data type label, for prompts
pub fn data_type_list() -> String {
    DataType::ALL.iter().map(|d| d.label()).collect::<Vec<_>>().join(", ")
}

/// Comma-separated list of every purpose label, for prompts
pub fn purpose_list() -> String {
    Purpose::ALL.iter().map(|p| p.label()).collect::<Vec<_>>().join(", ")
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

macro_rules! vocab_serde {
    ($ty:ident, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.label())
            }
        }

        // LLM-authored arguments carry either the label or the ledger code
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct V;

                impl<'de> Visitor<'de> for V {
                    type Value = $ty;

                    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        write!(f, "a {} label or code", $what)
                    }

                    fn visit_str<E: de::Error>(self, v: &str) -> Result<$ty, E> {
                        $ty::from_label(v)
                            .ok_or_else(|| E::custom(format!("unknown {}: {}", $what, v)))
                    }

                    fn visit_u64<E: de::Error>(self, v: u64) -> Result<$ty, E> {
                        u8::try_from(v)
                            .ok()
                            .and_then($ty::from_code)
                            .ok_or_else(|| E::custom(format!("unknown {} code: {}", $what, v)))
                    }

                    fn visit_i64<E: de::Error>(self, v: i64) -> Result<$ty, E> {
                        u64::try_from(v)
                            .map_err(|_| E::custom(format!("negative {} code", $what)))
                            .and_then(|v| self.visit_u64(v))
                    }

                    // `2.0` is a code, `2.5` is not
                    fn visit_f64<E: de::Error>(self, v: f64) -> Result<$ty, E> {
                        if v.fract() == 0.0 && (0.0..=f64::from(u8::MAX)).contains(&v) {
                            self.visit_u64(v as u64)
                        } else {
                            Err(E::custom(format!("unknown {} code: {}", $what, v)))
                        }
                    }
                }

                deserializer.deserialize_any(V)
            }
        }
    };
}

vocab_serde!(DataType, "data type");
vocab_serde!(Purpose, "purpose");

impl fmt::Display for ReceiverRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for ConsentRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
