use crate::EngineError;
use destiny_core::{
    validate_capital, validate_player_name, year_label, AllocationPlan, AssetClass, AssetMap,
    AssetPortfolio, DrawnCard, History, RoiTier, DECADE_YEARS, DEFAULT_STARTING_CAPITAL, FINAL_YEAR,
};
use destiny_econ::roi_pct;
use persistence::load_snapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::warn;

/// Where a game currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Login,
    Setup,
    AwaitingTimeJump,
    AwaitingEventCode,
    AwaitingRebalance,
    Finished,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Login => "login",
            Stage::Setup => "setup",
            Stage::AwaitingTimeJump => "awaiting time jump",
            Stage::AwaitingEventCode => "awaiting event code",
            Stage::AwaitingRebalance => "awaiting rebalance",
            Stage::Finished => "finished",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One line of the holdings table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Holding {
    pub asset: AssetClass,
    pub value: f64,
    /// Percent of the current total; zero when the total is zero.
    pub share_pct: f64,
}

/// All state of one player's game.
///
/// Only [`crate::Engine`] transitions produce new sessions; the fields are
/// readable but private so callers cannot skip a rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    pub(crate) stage: Stage,
    pub(crate) year: u32,
    pub(crate) player: String,
    pub(crate) starting_capital: f64,
    pub(crate) portfolio: AssetPortfolio,
    pub(crate) history: History,
    pub(crate) plans: BTreeMap<u32, AllocationPlan>,
    pub(crate) drawn_cards: Vec<DrawnCard>,
    pub(crate) feedback: Option<String>,
    pub(crate) persisted: bool,
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new()
    }
}

impl GameSession {
    /// A blank session waiting for a player name.
    pub fn new() -> Self {
        Self {
            stage: Stage::Login,
            year: 0,
            player: String::new(),
            starting_capital: DEFAULT_STARTING_CAPITAL,
            portfolio: AssetPortfolio::zero(),
            history: History::new(),
            plans: BTreeMap::new(),
            drawn_cards: Vec::new(),
            feedback: None,
            persisted: false,
        }
    }

    /// Read a saved session and check that it could have been reached by
    /// playing: see [`GameSession::validate`].
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let session: Self = load_snapshot(path)?;
        session.validate().map_err(|e| {
            warn!(path = %path.display(), error = %e, "snapshot rejected");
            e
        })?;
        Ok(session)
    }

    /// Cross-field checks for sessions that did not come from a transition.
    ///
    /// The year is a decade mark no later than the final year and agrees
    /// with the stage, the history holds one entry per elapsed year plus
    /// year 0 and ends on the current holdings, and one card has been drawn
    /// per completed decade.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.year > FINAL_YEAR || self.year % DECADE_YEARS != 0 {
            let why = format!("year {} is not a decade mark within {FINAL_YEAR} years", self.year);
            return Err(corrupt(why));
        }
        let decades = (self.year / DECADE_YEARS) as usize;
        let (year_fits, cards) = match self.stage {
            Stage::Login | Stage::Setup => (self.year == 0, 0),
            Stage::AwaitingTimeJump => (self.year < FINAL_YEAR, decades),
            Stage::AwaitingEventCode => (self.year >= DECADE_YEARS, decades.saturating_sub(1)),
            Stage::AwaitingRebalance => (self.year >= DECADE_YEARS && self.year < FINAL_YEAR, decades),
            Stage::Finished => (self.year == FINAL_YEAR, decades),
        };
        if !year_fits {
            return Err(corrupt(format!("stage {} cannot be at year {}", self.stage, self.year)));
        }
        if self.drawn_cards.len() != cards {
            let why = format!("{} cards drawn by year {}", self.drawn_cards.len(), self.year);
            return Err(corrupt(why));
        }
        if self.stage == Stage::Login {
            return if self.history.is_empty() {
                Ok(())
            } else {
                Err(corrupt("history before login".into()))
            };
        }
        validate_player_name(&self.player)?;
        validate_capital(self.starting_capital)?;
        if self.stage == Stage::Setup {
            return if self.history.is_empty() {
                Ok(())
            } else {
                Err(corrupt("history before the initial allocation".into()))
            };
        }

        let entries = self.history.entries();
        if entries.len() != self.year as usize + 1 {
            let why = format!("{} history entries at year {}", entries.len(), self.year);
            return Err(corrupt(why));
        }
        for (i, entry) in entries.iter().enumerate() {
            if entry.year as usize != i || !entry.total.is_finite() {
                return Err(corrupt(format!("history entry {i} is out of place")));
            }
            AssetPortfolio::from_values(entry.values)?;
        }
        if entries.last().map(|e| &e.values) != Some(self.portfolio.values()) {
            return Err(corrupt("holdings differ from the latest history entry".into()));
        }
        Ok(())
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn year(&self) -> u32 {
        self.year
    }

    pub fn player(&self) -> &str {
        &self.player
    }

    pub fn starting_capital(&self) -> f64 {
        self.starting_capital
    }

    pub fn portfolio(&self) -> &AssetPortfolio {
        &self.portfolio
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn drawn_cards(&self) -> &[DrawnCard] {
        &self.drawn_cards
    }

    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Plan confirmed at `year` (0 for the initial allocation).
    pub fn plan_at(&self, year: u32) -> Option<&AllocationPlan> {
        self.plans.get(&year)
    }

    /// Confirmed plans labelled "Year 0", "Year 10", ...
    pub fn labeled_plans(&self) -> Vec<(String, &AllocationPlan)> {
        self.plans
            .iter()
            .map(|(year, plan)| (year_label(*year), plan))
            .collect()
    }

    pub fn current_total(&self) -> f64 {
        self.portfolio.total()
    }

    /// Percent change of the current total against the first history entry.
    pub fn roi_pct(&self) -> f64 {
        match self.history.first() {
            Some(first) => roi_pct(first.total, self.current_total()),
            None => 0.0,
        }
    }

    pub fn roi_tier(&self) -> RoiTier {
        RoiTier::from_roi(self.roi_pct())
    }

    pub fn years_remaining(&self) -> u32 {
        FINAL_YEAR.saturating_sub(self.year)
    }

    /// Elapsed share of the game in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        (f64::from(self.year) / f64::from(FINAL_YEAR)).clamp(0.0, 1.0)
    }

    pub fn holdings(&self) -> Vec<Holding> {
        let shares = self.portfolio.shares();
        AssetClass::ALL
            .iter()
            .map(|&asset| Holding {
                asset,
                value: self.portfolio.get(asset),
                share_pct: shares[asset],
            })
            .collect()
    }

    /// Current shares rounded to whole percent, used to prefill the
    /// rebalance form. The rounding remainder goes to the largest holding.
    pub fn suggested_plan(&self) -> AllocationPlan {
        if self.current_total() <= 0.0 {
            return AllocationPlan::equal();
        }
        let mut pct: AssetMap<f64> = self.portfolio.shares().map(|_, s| s.round());
        let remainder = 100.0 - pct.sum();
        if remainder != 0.0 {
            let largest = AssetClass::ALL
                .iter()
                .copied()
                .max_by(|a, b| pct[*a].total_cmp(&pct[*b]))
                .unwrap_or(AssetClass::Cash);
            pct[largest] = (pct[largest] + remainder).clamp(0.0, 100.0);
        }
        AllocationPlan::new(pct)
    }
}

fn corrupt(why: String) -> EngineError {
    EngineError::CorruptSession(why)
}
