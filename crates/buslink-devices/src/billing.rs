//! Season-dependent tiered energy billing.
//!
//! Converts a monthly energy reading into a monetary amount. The rate
//! table is external configuration, loaded once and read-only for the
//! lifetime of the process.

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// One billing bracket, active once usage exceeds `min_kw`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateTier {
    pub min_kw: f64,
    pub price_per_kw: f64,
}

/// Billing season, selected by calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Summer,
    Winter,
}

impl Season {
    /// Months June through September are summer; everything else is
    /// winter.
    pub fn from_month(month: u32) -> Self {
        if (6..=9).contains(&month) {
            Self::Summer
        } else {
            Self::Winter
        }
    }
}

/// External rate configuration: one tier table per season, each
/// ordered ascending by `min_kw`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillConfig {
    #[serde(default)]
    pub summer_rates: Vec<RateTier>,
    #[serde(default)]
    pub winter_rates: Vec<RateTier>,
}

impl BillConfig {
    /// Parse the external JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, DeviceError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The tier table for a season.
    pub fn rates(&self, season: Season) -> &[RateTier] {
        match season {
            Season::Summer => &self.summer_rates,
            Season::Winter => &self.winter_rates,
        }
    }

    /// Price per kW for a reading: the last tier whose `min_kw` the
    /// reading exceeds.
    ///
    /// Scans for the first tier with `reading < min_kw` and takes the
    /// previous one; a reading at or above every threshold takes the
    /// last tier. A reading below even the first threshold also falls
    /// back to the last tier. An empty table yields `None`: no charge
    /// is computed.
    pub fn tier_price(&self, season: Season, reading: f64) -> Option<f64> {
        let rates = self.rates(season);
        match rates.iter().position(|tier| reading < tier.min_kw) {
            Some(0) | None => rates.last().map(|tier| tier.price_per_kw),
            Some(i) => Some(rates[i - 1].price_per_kw),
        }
    }

    /// Bill for a monthly reading: the matched tier's rate applied to
    /// the entire reading (flat-tier, not progressive).
    pub fn bill(&self, month: u32, reading: f64) -> Option<f64> {
        let price = self.tier_price(Season::from_month(month), reading)?;
        Some(price * reading)
    }
}
