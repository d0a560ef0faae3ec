#![deny(warnings)]

//! Market model for Flip Your Destiny.
//!
//! This module provides validated utilities for:
//! - Rate profiles: per-asset annual base rates plus optional noise bands
//! - Yearly growth with multiplicative uniform noise from a pluggable source
//! - Event-card shocks and their impact preview
//! - Return on investment

use destiny_core::{AssetClass, AssetMap, AssetPortfolio, EventCard, RiskLevel};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// Errors produced by market-model helpers.
#[derive(Debug, Error, PartialEq)]
pub enum EconError {
    /// Annual rate must be finite and > -1 so holdings never go negative.
    #[error("invalid base rate for {asset}: {rate}")]
    InvalidRate { asset: AssetClass, rate: f64 },
    /// Noise band half-width must be in [0, 1).
    #[error("invalid noise band for {asset}: {band}")]
    InvalidBand { asset: AssetClass, band: f64 },
    /// Profiles need a name to be selectable.
    #[error("rate profile name must not be empty")]
    EmptyName,
}

/// Annual base rates and optional noise bands for every asset.
///
/// A band `b` draws a factor uniformly from `[1 - b, 1 + b]` each year;
/// `None` means the asset grows at its base rate exactly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateProfile {
    pub name: String,
    /// Fractions, e.g. `0.05` for 5% a year.
    pub base_rates: AssetMap<f64>,
    #[serde(default)]
    pub bands: AssetMap<Option<f64>>,
}

/// One row of the rates table shown during setup.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateRow {
    pub asset: AssetClass,
    pub base_rate_pct: f64,
    pub band_pct: Option<f64>,
    pub risk: RiskLevel,
}

impl RateProfile {
    pub fn validate(&self) -> Result<(), EconError> {
        if self.name.trim().is_empty() {
            return Err(EconError::EmptyName);
        }
        for (asset, &rate) in self.base_rates.iter() {
            if !rate.is_finite() || rate <= -1.0 {
                return Err(EconError::InvalidRate { asset, rate });
            }
        }
        for (asset, band) in self.bands.iter() {
            if let Some(band) = *band {
                if !band.is_finite() || !(0.0..1.0).contains(&band) {
                    return Err(EconError::InvalidBand { asset, band });
                }
            }
        }
        Ok(())
    }

    /// Whether any asset is randomized under this profile.
    pub fn is_stochastic(&self) -> bool {
        self.bands.iter().any(|(_, b)| b.is_some())
    }

    pub fn rows(&self) -> Vec<RateRow> {
        AssetClass::ALL
            .into_iter()
            .map(|asset| RateRow {
                asset,
                base_rate_pct: self.base_rates[asset] * 100.0,
                band_pct: self.bands[asset].map(|b| b * 100.0),
                risk: asset.risk(),
            })
            .collect()
    }
}

/// Source of the yearly multiplicative noise factors.
pub trait ReturnSource {
    /// Factor for `asset` in `[1 - band, 1 + band]`.
    fn factor(&mut self, asset: AssetClass, band: f64) -> f64;
}

/// Uniform noise drawn from a ChaCha stream.
#[derive(Clone, Debug)]
pub struct SampledReturns {
    rng: ChaCha8Rng,
}

impl SampledReturns {
    /// Reproducible stream for a fixed seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Fresh stream seeded from OS entropy, once per process.
    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }
}

impl ReturnSource for SampledReturns {
    fn factor(&mut self, _asset: AssetClass, band: f64) -> f64 {
        if band <= 0.0 {
            return 1.0;
        }
        self.rng.gen_range((1.0 - band)..=(1.0 + band))
    }
}

/// Noise-free source: every factor is exactly 1.0.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlatReturns;

impl ReturnSource for FlatReturns {
    fn factor(&mut self, _asset: AssetClass, _band: f64) -> f64 {
        1.0
    }
}

/// Growth multipliers for one year: `(1 + rate) * noise`.
pub fn growth_factors<R: ReturnSource + ?Sized>(
    profile: &RateProfile,
    returns: &mut R,
) -> AssetMap<f64> {
    AssetMap::from_fn(|asset| {
        let base = 1.0 + profile.base_rates[asset];
        match profile.bands[asset] {
            Some(band) => base * returns.factor(asset, band),
            None => base,
        }
    })
}

/// Grow every holding by one simulated year.
pub fn grow_one_year<R: ReturnSource + ?Sized>(
    portfolio: &mut AssetPortfolio,
    profile: &RateProfile,
    returns: &mut R,
) {
    let factors = growth_factors(profile, returns);
    trace!(?factors, "yearly growth factors");
    portfolio.scale(&factors);
}

/// Apply an event card's shock to every holding.
pub fn apply_shock(portfolio: &mut AssetPortfolio, card: &EventCard) {
    let factors = AssetMap::from_fn(|asset| card.multiplier(asset));
    portfolio.scale(&factors);
}

/// Whether a shock raises, lowers or leaves a holding unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImpactDirection {
    Gain,
    Loss,
    Flat,
}

impl ImpactDirection {
    pub fn from_pct(pct: f64) -> Self {
        if pct > 0.0 {
            ImpactDirection::Gain
        } else if pct < 0.0 {
            ImpactDirection::Loss
        } else {
            ImpactDirection::Flat
        }
    }

    pub fn arrow(self) -> &'static str {
        match self {
            ImpactDirection::Gain => "▲",
            ImpactDirection::Loss => "▼",
            ImpactDirection::Flat => "-",
        }
    }
}

/// Projected effect of a card on one holding.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Impact {
    pub pct: f64,
    /// Signed change in currency: `value * pct / 100`.
    pub amount: f64,
    pub direction: ImpactDirection,
}

/// Preview a card against the current holdings without applying it.
pub fn impact_preview(portfolio: &AssetPortfolio, card: &EventCard) -> AssetMap<Impact> {
    AssetMap::from_fn(|asset| {
        let pct = card.impacts[asset];
        Impact {
            pct,
            amount: portfolio.get(asset) * (pct / 100.0),
            direction: ImpactDirection::from_pct(pct),
        }
    })
}

/// Percentage change of `current` against `start`. Zero when `start <= 0`.
pub fn roi_pct(start: f64, current: f64) -> f64 {
    if start <= 0.0 || !start.is_finite() {
        return 0.0;
    }
    (current - start) / start * 100.0
}
