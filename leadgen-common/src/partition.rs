//! Segment partitions of lead storage
//!
//! Every lead lives in exactly one partition. The set is fixed at build time
//! and [`Partition::ALL`] is also the lookup order when an email is searched
//! across partitions.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    /// Independent financial advisors and wealth managers
    Partners,
    /// High-net-worth individuals
    Hni,
    /// Ultra-high-net-worth individuals
    Uhni,
    MassAffluent,
}

impl Partition {
    /// All partitions in lookup order
    pub const ALL: [Partition; 4] = [
        Partition::Partners,
        Partition::Hni,
        Partition::Uhni,
        Partition::MassAffluent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Partners => "partners",
            Partition::Hni => "hni",
            Partition::Uhni => "uhni",
            Partition::MassAffluent => "mass_affluent",
        }
    }

    /// Position in lookup order (lower is searched first)
    pub fn rank(&self) -> i64 {
        match self {
            Partition::Partners => 0,
            Partition::Hni => 1,
            Partition::Uhni => 2,
            Partition::MassAffluent => 3,
        }
    }

    /// File name used by the upstream pipeline for this partition's export
    pub fn legacy_file_name(&self) -> String {
        format!("{}_leads.json", self.as_str())
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Partition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Partition::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown partition: '{}'", s)))
    }
}
