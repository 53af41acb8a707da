use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use std::{convert::TryFrom, fmt, str::FromStr};

use crate::key::KeyPart;

/// Avalanche centers whose products this crate knows how to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AvalancheCenterId {
    #[serde(rename = "NWAC")]
    Nwac,
    #[serde(rename = "SNFAC")]
    Snfac,
    #[serde(rename = "PAC")]
    Pac,
    #[serde(rename = "CAIC")]
    Caic,
    #[serde(rename = "BTAC")]
    Btac,
    #[serde(rename = "CBAC")]
    Cbac,
    #[serde(rename = "SAC")]
    Sac,
    #[serde(rename = "MWAC")]
    Mwac,
}

impl AvalancheCenterId {
    pub fn as_str(&self) -> &'static str {
        match self {
            AvalancheCenterId::Nwac => "NWAC",
            AvalancheCenterId::Snfac => "SNFAC",
            AvalancheCenterId::Pac => "PAC",
            AvalancheCenterId::Caic => "CAIC",
            AvalancheCenterId::Btac => "BTAC",
            AvalancheCenterId::Cbac => "CBAC",
            AvalancheCenterId::Sac => "SAC",
            AvalancheCenterId::Mwac => "MWAC",
        }
    }

    pub const fn all() -> &'static [AvalancheCenterId] {
        &[
            AvalancheCenterId::Nwac,
            AvalancheCenterId::Snfac,
            AvalancheCenterId::Pac,
            AvalancheCenterId::Caic,
            AvalancheCenterId::Btac,
            AvalancheCenterId::Cbac,
            AvalancheCenterId::Sac,
            AvalancheCenterId::Mwac,
        ]
    }
}

impl fmt::Display for AvalancheCenterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for AvalancheCenterId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let upper = value.to_uppercase();

        AvalancheCenterId::all()
            .iter()
            .copied()
            .find(|id| id.as_str() == upper)
            .ok_or_else(|| {
                let supported: Vec<&str> = AvalancheCenterId::all().iter().map(|id| id.as_str()).collect();
                anyhow::anyhow!(
                    "Unknown avalanche center '{value}'. Supported centers: {}.",
                    supported.join(", ")
                )
            })
    }
}

impl FromStr for AvalancheCenterId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AvalancheCenterId::try_from(s)
    }
}

/// The point in time a forecast is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedTime {
    Latest,
    At(DateTime<Utc>),
}

impl RequestedTime {
    /// Midnight UTC at the start of `date`.
    pub fn on(date: NaiveDate) -> Self {
        RequestedTime::At(date.and_time(chrono::NaiveTime::MIN).and_utc())
    }

    pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            RequestedTime::Latest => now,
            RequestedTime::At(at) => *at,
        }
    }

    /// Nominal forecast date: every instant of one UTC day maps to the same
    /// date, so they share a cache entry.
    pub fn key_part(&self) -> KeyPart {
        match self {
            RequestedTime::Latest => KeyPart::from("latest"),
            RequestedTime::At(at) => KeyPart::from(at.date_naive()),
        }
    }
}

/// Valid absence of data: the service answered, but there is nothing there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotFound {
    #[serde(rename = "notFound")]
    pub what: String,
}

impl NotFound {
    pub fn new(what: impl Into<String>) -> Self {
        Self { what: what.into() }
    }
}

/// ATOM / RFC 3339 rendering with an explicit `+00:00` offset.
pub fn to_atom(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}
