// shared-types-rs/src/department.rs
// Departments a guest request can be routed to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Fixed set of departments. The serialized names are part of the wire
/// contract between the intake gateway and the work-order consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Department {
    Housekeeping,
    #[serde(rename = "Room Service")]
    RoomService,
    #[serde(rename = "Front Desk")]
    FrontDesk,
    #[serde(rename = "IT")]
    It,
    General,
}

impl Department {
    pub const ALL: [Department; 5] = [
        Department::Housekeeping,
        Department::RoomService,
        Department::FrontDesk,
        Department::It,
        Department::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Housekeeping => "Housekeeping",
            Department::RoomService => "Room Service",
            Department::FrontDesk => "Front Desk",
            Department::It => "IT",
            Department::General => "General",
        }
    }
}

impl Default for Department {
    fn default() -> Self {
        Department::General
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown department: {0}")]
pub struct UnknownDepartment(pub String);

impl FromStr for Department {
    type Err = UnknownDepartment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Department::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| UnknownDepartment(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_names_match_display() {
        for dept in Department::ALL {
            let json = serde_json::to_string(&dept).unwrap();
            assert_eq!(json, format!("\"{}\"", dept.as_str()));
            assert_eq!(dept.as_str().parse::<Department>().unwrap(), dept);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!("Spa".parse::<Department>().is_err());
        assert!(serde_json::from_str::<Department>("\"room service\"").is_err());
    }
}
