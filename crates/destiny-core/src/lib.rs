#![deny(warnings)]

//! Core domain models and invariants for Flip Your Destiny.
//!
//! This crate defines the serializable types shared by the market model,
//! the game engine and the persistence layer, together with validation
//! helpers that guard the allocation and catalog invariants.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Index, IndexMut};
use thiserror::Error;

/// Last simulated year of a game.
pub const FINAL_YEAR: u32 = 30;
/// Years simulated by a single time jump.
pub const DECADE_YEARS: u32 = 10;
/// Allowed distance (in percentage points) between a plan's sum and 100.
pub const PLAN_TOLERANCE_PCT: f64 = 0.1;
/// Capital handed to a new player unless configured otherwise.
pub const DEFAULT_STARTING_CAPITAL: f64 = 1_000_000.0;

/// The five investable asset classes, in display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    /// High-dividend equity.
    DividendYield,
    /// US treasury bonds.
    USBond,
    /// Taiwan-listed equity.
    TWStock,
    /// Cash deposits.
    Cash,
    /// Cryptocurrency.
    Crypto,
}

impl AssetClass {
    /// All asset classes in their fixed order.
    pub const ALL: [AssetClass; 5] = [
        AssetClass::DividendYield,
        AssetClass::USBond,
        AssetClass::TWStock,
        AssetClass::Cash,
        AssetClass::Crypto,
    ];

    /// Short stable identifier, used in logs and exported records.
    pub fn key(self) -> &'static str {
        match self {
            AssetClass::DividendYield => "Dividend",
            AssetClass::USBond => "USBond",
            AssetClass::TWStock => "TWStock",
            AssetClass::Cash => "Cash",
            AssetClass::Crypto => "Crypto",
        }
    }

    /// Human-readable name for tables and prompts.
    pub fn display_name(self) -> &'static str {
        match self {
            AssetClass::DividendYield => "Dividend Yield",
            AssetClass::USBond => "US Bonds",
            AssetClass::TWStock => "Taiwan Stocks",
            AssetClass::Cash => "Cash",
            AssetClass::Crypto => "Crypto",
        }
    }

    /// Qualitative risk shown next to the base rates.
    pub fn risk(self) -> RiskLevel {
        match self {
            AssetClass::DividendYield => RiskLevel::Low,
            AssetClass::USBond => RiskLevel::VeryLow,
            AssetClass::TWStock => RiskLevel::MediumHigh,
            AssetClass::Cash => RiskLevel::None,
            AssetClass::Crypto => RiskLevel::VeryHigh,
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Risk label of an asset class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    None,
    VeryLow,
    Low,
    MediumHigh,
    VeryHigh,
}

impl RiskLevel {
    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::None => "none",
            RiskLevel::VeryLow => "very low",
            RiskLevel::Low => "low",
            RiskLevel::MediumHigh => "medium-high",
            RiskLevel::VeryHigh => "very high",
        }
    }
}

/// A value for every asset class. All five slots always exist.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetMap<T> {
    pub dividend: T,
    pub us_bond: T,
    pub tw_stock: T,
    pub cash: T,
    pub crypto: T,
}

impl<T> AssetMap<T> {
    /// Build a map by evaluating `f` once per asset, in order.
    pub fn from_fn(mut f: impl FnMut(AssetClass) -> T) -> Self {
        Self {
            dividend: f(AssetClass::DividendYield),
            us_bond: f(AssetClass::USBond),
            tw_stock: f(AssetClass::TWStock),
            cash: f(AssetClass::Cash),
            crypto: f(AssetClass::Crypto),
        }
    }

    /// Iterate `(asset, value)` pairs in the fixed asset order.
    pub fn iter(&self) -> impl Iterator<Item = (AssetClass, &T)> + '_ {
        AssetClass::ALL.into_iter().map(move |a| (a, &self[a]))
    }

    pub fn map<U>(&self, mut f: impl FnMut(AssetClass, &T) -> U) -> AssetMap<U> {
        AssetMap::from_fn(|a| f(a, &self[a]))
    }
}

impl<T: Copy> AssetMap<T> {
    /// Same value for every asset.
    pub fn splat(value: T) -> Self {
        Self::from_fn(|_| value)
    }
}

impl AssetMap<f64> {
    pub fn sum(&self) -> f64 {
        self.iter().map(|(_, v)| *v).sum()
    }
}

impl<T> Index<AssetClass> for AssetMap<T> {
    type Output = T;

    fn index(&self, asset: AssetClass) -> &T {
        match asset {
            AssetClass::DividendYield => &self.dividend,
            AssetClass::USBond => &self.us_bond,
            AssetClass::TWStock => &self.tw_stock,
            AssetClass::Cash => &self.cash,
            AssetClass::Crypto => &self.crypto,
        }
    }
}

impl<T> IndexMut<AssetClass> for AssetMap<T> {
    fn index_mut(&mut self, asset: AssetClass) -> &mut T {
        match asset {
            AssetClass::DividendYield => &mut self.dividend,
            AssetClass::USBond => &mut self.us_bond,
            AssetClass::TWStock => &mut self.tw_stock,
            AssetClass::Cash => &mut self.cash,
            AssetClass::Crypto => &mut self.crypto,
        }
    }
}

/// Validation errors for domain invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Player name is empty after trimming.
    #[error("player name must not be empty")]
    EmptyName,
    /// Allocation percentages do not add up to 100.
    #[error("allocation must sum to 100% (got {0:.1}%)")]
    PlanSum(f64),
    /// A single percentage is outside [0, 100].
    #[error("{asset} allocation {value}% is outside [0, 100]")]
    PercentOutOfRange { asset: AssetClass, value: f64 },
    /// Numeric field must be finite.
    #[error("non-finite numeric value encountered")]
    NonFinite,
    /// Starting capital must be strictly positive.
    #[error("starting capital must be > 0 (got {0})")]
    NonPositiveCapital(f64),
    /// Asset values are never negative.
    #[error("{0} holding must not be negative")]
    NegativeHolding(AssetClass),
    /// Event card codes are exactly three visible characters.
    #[error("invalid event card code: {0:?}")]
    InvalidCardCode(String),
    /// Card codes are unique within a catalog.
    #[error("duplicate event card code: {0}")]
    DuplicateCardCode(String),
    /// Card needs a display name.
    #[error("event card {0} has no name")]
    EmptyCardName(String),
    /// An impact of -100% or below would wipe out or invert a holding.
    #[error("event card {code} impact on {asset} must be > -100% (got {pct}%)")]
    ImpactOutOfRange {
        code: String,
        asset: AssetClass,
        pct: f64,
    },
}

/// Percentages (0..=100) per asset, chosen by the player.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AllocationPlan(AssetMap<f64>);

impl AllocationPlan {
    /// Wrap raw percentages. Call [`AllocationPlan::validate`] before use.
    pub fn new(percentages: AssetMap<f64>) -> Self {
        Self(percentages)
    }

    /// Percentages in asset order: dividend, bond, stock, cash, crypto.
    pub fn from_percentages(p: [f64; 5]) -> Self {
        Self(AssetMap::from_fn(|a| p[a as usize]))
    }

    /// Twenty percent in every asset.
    pub fn equal() -> Self {
        Self(AssetMap::splat(20.0))
    }

    pub fn get(&self, asset: AssetClass) -> f64 {
        self.0[asset]
    }

    pub fn percentages(&self) -> &AssetMap<f64> {
        &self.0
    }

    pub fn sum(&self) -> f64 {
        self.0.sum()
    }

    /// Check range of every entry and that the total is 100 ± 0.1.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (asset, &value) in self.0.iter() {
            if !value.is_finite() {
                return Err(ValidationError::NonFinite);
            }
            if !(0.0..=100.0).contains(&value) {
                return Err(ValidationError::PercentOutOfRange { asset, value });
            }
        }
        let sum = self.sum();
        if (sum - 100.0).abs() > PLAN_TOLERANCE_PCT {
            return Err(ValidationError::PlanSum(sum));
        }
        Ok(())
    }
}

/// Monetary holdings per asset. Values are never negative, including
/// values read back from a snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AssetMap<f64>", into = "AssetMap<f64>")]
pub struct AssetPortfolio(AssetMap<f64>);

impl TryFrom<AssetMap<f64>> for AssetPortfolio {
    type Error = ValidationError;

    fn try_from(values: AssetMap<f64>) -> Result<Self, Self::Error> {
        Self::from_values(values)
    }
}

impl From<AssetPortfolio> for AssetMap<f64> {
    fn from(portfolio: AssetPortfolio) -> Self {
        portfolio.0
    }
}

impl AssetPortfolio {
    pub fn zero() -> Self {
        Self(AssetMap::splat(0.0))
    }

    /// Build from raw values, rejecting negative or non-finite entries.
    pub fn from_values(values: AssetMap<f64>) -> Result<Self, ValidationError> {
        for (asset, &v) in values.iter() {
            if !v.is_finite() {
                return Err(ValidationError::NonFinite);
            }
            if v < 0.0 {
                return Err(ValidationError::NegativeHolding(asset));
            }
        }
        Ok(Self(values))
    }

    /// Split `total` across assets by a validated plan.
    ///
    /// Shares are normalised by the plan's own sum so the resulting total
    /// equals `total` even when the plan is inside the tolerance but not
    /// exactly 100.
    pub fn allocate(total: f64, plan: &AllocationPlan) -> Self {
        let sum = plan.sum();
        if sum <= 0.0 {
            return Self::zero();
        }
        Self(AssetMap::from_fn(|a| (total * plan.get(a) / sum).max(0.0)))
    }

    pub fn get(&self, asset: AssetClass) -> f64 {
        self.0[asset]
    }

    pub fn values(&self) -> &AssetMap<f64> {
        &self.0
    }

    pub fn total(&self) -> f64 {
        self.0.sum()
    }

    /// Share of the total held in each asset, in percent. Zero when empty.
    pub fn shares(&self) -> AssetMap<f64> {
        let total = self.total();
        self.0.map(|_, v| if total > 0.0 { v / total * 100.0 } else { 0.0 })
    }

    /// Multiply every holding by its factor. Results are floored at zero.
    pub fn scale(&mut self, factors: &AssetMap<f64>) {
        for asset in AssetClass::ALL {
            self.0[asset] = (self.0[asset] * factors[asset]).max(0.0);
        }
    }
}

/// Scripted market shock identified by a three-character code.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventCard {
    pub code: String,
    pub name: String,
    pub description: String,
    /// Percent change per asset, e.g. `100.0` doubles a holding.
    pub impacts: AssetMap<f64>,
}

impl EventCard {
    /// Multiplier applied to an asset when the card is accepted.
    pub fn multiplier(&self, asset: AssetClass) -> f64 {
        1.0 + self.impacts[asset] / 100.0
    }
}

/// Validate the shape of a card code.
pub fn validate_card_code(code: &str) -> Result<(), ValidationError> {
    if code.chars().count() != 3 || code.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidCardCode(code.to_string()));
    }
    Ok(())
}

/// Validate a single event card.
pub fn validate_event_card(card: &EventCard) -> Result<(), ValidationError> {
    validate_card_code(&card.code)?;
    if card.name.trim().is_empty() {
        return Err(ValidationError::EmptyCardName(card.code.clone()));
    }
    for (asset, &pct) in card.impacts.iter() {
        if !pct.is_finite() {
            return Err(ValidationError::NonFinite);
        }
        if pct <= -100.0 {
            return Err(ValidationError::ImpactOutOfRange {
                code: card.code.clone(),
                asset,
                pct,
            });
        }
    }
    Ok(())
}

/// Read-only table of event cards keyed by code.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventCatalog {
    cards: BTreeMap<String, EventCard>,
}

impl EventCatalog {
    /// Validate every card and index them by code.
    pub fn new(cards: Vec<EventCard>) -> Result<Self, ValidationError> {
        let mut map = BTreeMap::new();
        for card in cards {
            validate_event_card(&card)?;
            if map.contains_key(&card.code) {
                return Err(ValidationError::DuplicateCardCode(card.code));
            }
            map.insert(card.code.clone(), card);
        }
        Ok(Self { cards: map })
    }

    pub fn get(&self, code: &str) -> Option<&EventCard> {
        self.cards.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.cards.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Cards ordered by code.
    pub fn iter(&self) -> impl Iterator<Item = &EventCard> + '_ {
        self.cards.values()
    }
}

/// Portfolio snapshot at the end of one simulated year.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub year: u32,
    pub total: f64,
    pub values: AssetMap<f64>,
}

impl HistoryEntry {
    pub fn from_portfolio(year: u32, portfolio: &AssetPortfolio) -> Self {
        Self {
            year,
            total: portfolio.total(),
            values: *portfolio.values(),
        }
    }
}

/// Append-only yearly history. Only the latest entry may be amended.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_entry(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    /// Overwrite values and total of the latest entry after a shock.
    /// Returns `false` when the history is empty.
    pub fn amend_latest(&mut self, portfolio: &AssetPortfolio) -> bool {
        match self.entries.last_mut() {
            Some(last) => {
                last.values = *portfolio.values();
                last.total = portfolio.total();
                true
            }
            None => false,
        }
    }

    /// Overwrite only the values of the latest entry; its total is kept.
    /// Returns `false` when the history is empty.
    pub fn redistribute_latest(&mut self, portfolio: &AssetPortfolio) -> bool {
        match self.entries.last_mut() {
            Some(last) => {
                last.values = *portfolio.values();
                true
            }
            None => false,
        }
    }

    pub fn first(&self) -> Option<&HistoryEntry> {
        self.entries.first()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One drawn event card, as shown in the end-of-game log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawnCard {
    pub year: u32,
    pub code: String,
    pub name: String,
}

impl fmt::Display for DrawnCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Year {}: [{}] {}", self.year, self.code, self.name)
    }
}

/// Badge awarded on the final summary, by total ROI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoiTier {
    BankruptClub,
    SteadySaver,
    SeasonedInvestor,
    FreedomRocket,
    InvestingLegend,
}

impl RoiTier {
    pub fn from_roi(roi_pct: f64) -> Self {
        if roi_pct < 0.0 {
            RoiTier::BankruptClub
        } else if roi_pct < 200.0 {
            RoiTier::SteadySaver
        } else if roi_pct < 600.0 {
            RoiTier::SeasonedInvestor
        } else if roi_pct < 1200.0 {
            RoiTier::FreedomRocket
        } else {
            RoiTier::InvestingLegend
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            RoiTier::BankruptClub => "Bankrupt Club",
            RoiTier::SteadySaver => "Steady Saver",
            RoiTier::SeasonedInvestor => "Seasoned Investor",
            RoiTier::FreedomRocket => "Freedom Rocket",
            RoiTier::InvestingLegend => "Investing Legend",
        }
    }

    pub fn blurb(self) -> &'static str {
        match self {
            RoiTier::BankruptClub => "Black swans ate your principal.",
            RoiTier::SteadySaver => "You beat the ledger, but not real inflation.",
            RoiTier::SeasonedInvestor => "Solid work: most retirement goals look like this.",
            RoiTier::FreedomRocket => "Sharp calls. Your wealth grew at a startling pace.",
            RoiTier::InvestingLegend => "More than tenfold in thirty years.",
        }
    }
}

/// Label used for allocation snapshots, e.g. `Year 10`.
pub fn year_label(year: u32) -> String {
    format!("Year {year}")
}

/// Trim a player name and reject it when empty.
pub fn validate_player_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(trimmed.to_string())
}

/// Starting capital must be finite and strictly positive.
pub fn validate_capital(capital: f64) -> Result<(), ValidationError> {
    if !capital.is_finite() {
        return Err(ValidationError::NonFinite);
    }
    if capital <= 0.0 {
        return Err(ValidationError::NonPositiveCapital(capital));
    }
    Ok(())
}
