//! Shared data model: catalog enums and the session snapshots.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Machine difficulty as reported by the lab platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Insane,
}

impl Difficulty {
    pub const ALL: [Self; 4] = [Self::Easy, Self::Medium, Self::Hard, Self::Insane];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "Easy",
            Self::Medium => "Medium",
            Self::Hard => "Hard",
            Self::Insane => "Insane",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown difficulty: {s}"))
    }
}

/// Tag grouping used by the filter dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TagCategory {
    #[serde(rename = "Category")]
    Category,
    #[serde(rename = "Area of Interest")]
    AreaOfInterest,
    #[serde(rename = "Vulnerabilities")]
    Vulnerabilities,
}

impl TagCategory {
    /// Stored and wire representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "Category",
            Self::AreaOfInterest => "Area of Interest",
            Self::Vulnerabilities => "Vulnerabilities",
        }
    }
}

impl fmt::Display for TagCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagCategory {
    type Err = String;

    /// Accepts the stored names plus the short forms `area` and `vulnerability`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "category" => Ok(Self::Category),
            "area" | "area of interest" => Ok(Self::AreaOfInterest),
            "vulnerability" | "vulnerabilities" => Ok(Self::Vulnerabilities),
            _ => Err(format!("unknown tag category: {s}")),
        }
    }
}

/// Which capture flag a submission proved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnType {
    User,
    Root,
}

impl OwnType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Root => "root",
        }
    }
}

impl fmt::Display for OwnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "root" => Ok(Self::Root),
            _ => Err(format!("unknown own type: {s}")),
        }
    }
}

/// Lifecycle action on a lab machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineAction {
    Start,
    Stop,
    Reset,
}

impl MachineAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Reset => "reset",
        }
    }
}

impl fmt::Display for MachineAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the machine currently running for this account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveBox {
    pub id: i64,
    pub name: String,
    pub difficulty: Difficulty,
    pub os: String,
    pub user_owned: bool,
    pub root_owned: bool,
    /// Only some account tiers get the address back from the API.
    pub ip: Option<String>,
}

impl ActiveBox {
    pub const fn is_owned(&self, own_type: OwnType) -> bool {
        match own_type {
            OwnType::User => self.user_owned,
            OwnType::Root => self.root_owned,
        }
    }
}

/// Snapshot of the VPN assignment for this account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveVpn {
    pub id: i64,
    pub name: String,
    /// Tunnel address, present only while connected.
    pub ip: Option<String>,
    /// `host:port` of the connected endpoint.
    pub address: Option<String>,
}

/// Account information from the lab platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub name: String,
    pub can_access_vip: bool,
}
