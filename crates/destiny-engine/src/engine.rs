use crate::record::build_record;
use crate::{EngineError, GameSession, Stage};
use chrono::{Local, NaiveDateTime};
use destiny_core::{
    validate_capital, validate_player_name, AllocationPlan, AssetMap, AssetPortfolio, DrawnCard,
    EventCard, EventCatalog, History, HistoryEntry, DECADE_YEARS, FINAL_YEAR,
};
use destiny_econ::{apply_shock, grow_one_year, impact_preview, Impact, RateProfile, ReturnSource};
use persistence::RecordSink;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a card would do to the current holdings.
#[derive(Clone, Debug, PartialEq)]
pub struct EventPreview {
    pub card: EventCard,
    pub impacts: AssetMap<Impact>,
}

/// Game rules bound to one rate profile and card catalog.
///
/// Every transition takes the current session by reference and returns the
/// next one. On error the caller keeps the session it already has.
#[derive(Clone, Debug)]
pub struct Engine {
    profile: RateProfile,
    catalog: Arc<EventCatalog>,
}

fn require(session: &GameSession, expected: Stage) -> Result<(), EngineError> {
    if session.stage == expected {
        Ok(())
    } else {
        warn!(%expected, actual = %session.stage, "transition rejected");
        Err(EngineError::WrongStage {
            expected,
            actual: session.stage,
        })
    }
}

fn rejected<E: Display>(what: &'static str) -> impl FnOnce(E) -> E {
    move |e| {
        warn!(error = %e, "{what} rejected");
        e
    }
}

impl Engine {
    pub fn new(profile: RateProfile, catalog: Arc<EventCatalog>) -> Self {
        Self { profile, catalog }
    }

    pub fn profile(&self) -> &RateProfile {
        &self.profile
    }

    pub fn catalog(&self) -> &EventCatalog {
        &self.catalog
    }

    /// Login: attach a player name and move to setup.
    pub fn start_session(&self, session: &GameSession, name: &str) -> Result<GameSession, EngineError> {
        require(session, Stage::Login)?;
        let player = validate_player_name(name).map_err(rejected("player name"))?;
        let mut next = GameSession::new();
        next.player = player;
        next.stage = Stage::Setup;
        info!(player = %next.player, "session started");
        Ok(next)
    }

    /// Split the starting capital by `plan` and record year 0.
    ///
    /// Any plan summing to within 0.1 of 100 is accepted, and each holding
    /// is `capital * plan[k] / sum(plan)`, so the holdings always add up to
    /// `capital` exactly.
    pub fn confirm_initial_allocation(
        &self,
        session: &GameSession,
        plan: &AllocationPlan,
        capital: f64,
    ) -> Result<GameSession, EngineError> {
        require(session, Stage::Setup)?;
        validate_capital(capital).map_err(rejected("starting capital"))?;
        plan.validate().map_err(rejected("initial allocation"))?;

        let mut next = session.clone();
        next.starting_capital = capital;
        next.year = 0;
        next.portfolio = AssetPortfolio::allocate(capital, plan);
        next.history = History::new();
        next.history.append_entry(HistoryEntry {
            year: 0,
            total: capital,
            values: *next.portfolio.values(),
        });
        next.plans.clear();
        next.plans.insert(0, *plan);
        next.stage = Stage::AwaitingTimeJump;
        info!(player = %next.player, capital, "initial allocation confirmed");
        Ok(next)
    }

    /// Go back to setup before any time has passed. The name is kept.
    pub fn return_to_setup(&self, session: &GameSession) -> Result<GameSession, EngineError> {
        require(session, Stage::AwaitingTimeJump)?;
        if session.year != 0 {
            warn!(year = session.year, "return to setup rejected");
            return Err(EngineError::SetupClosed(session.year));
        }
        let mut next = GameSession::new();
        next.player = session.player.clone();
        next.stage = Stage::Setup;
        info!(player = %next.player, "returned to setup");
        Ok(next)
    }

    /// Simulate ten years, one history entry per year.
    pub fn advance_decade(
        &self,
        session: &GameSession,
        returns: &mut dyn ReturnSource,
    ) -> Result<GameSession, EngineError> {
        require(session, Stage::AwaitingTimeJump)?;
        let start = session.year;
        if start + DECADE_YEARS > FINAL_YEAR {
            warn!(year = start, "decade jump past the final year");
            return Err(EngineError::PastFinalYear(start));
        }
        let mut next = session.clone();
        for step in 1..=DECADE_YEARS {
            grow_one_year(&mut next.portfolio, &self.profile, &mut *returns);
            let year = start + step;
            next.history
                .append_entry(HistoryEntry::from_portfolio(year, &next.portfolio));
            debug!(year, total = next.portfolio.total(), "simulated year");
        }
        next.year = start + DECADE_YEARS;
        next.stage = Stage::AwaitingEventCode;
        info!(year = next.year, total = next.current_total(), "decade advanced");
        Ok(next)
    }

    /// Look up a card and project its effect. `None` for unknown codes.
    pub fn preview_event(&self, session: &GameSession, code: &str) -> Option<EventPreview> {
        let card = self.catalog.get(code.trim())?;
        Some(EventPreview {
            card: card.clone(),
            impacts: impact_preview(&session.portfolio, card),
        })
    }

    /// Apply a card's shock to every holding and log the draw.
    pub fn apply_event(&self, session: &GameSession, code: &str) -> Result<GameSession, EngineError> {
        require(session, Stage::AwaitingEventCode)?;
        let code = code.trim();
        let Some(card) = self.catalog.get(code) else {
            warn!(code, "unknown event card");
            return Err(EngineError::InvalidCard(code.to_string()));
        };

        let mut next = session.clone();
        apply_shock(&mut next.portfolio, card);
        next.drawn_cards.push(DrawnCard {
            year: next.year,
            code: card.code.clone(),
            name: card.name.clone(),
        });
        next.history.amend_latest(&next.portfolio);
        next.stage = if next.year >= FINAL_YEAR {
            Stage::Finished
        } else {
            Stage::AwaitingRebalance
        };
        info!(year = next.year, code, total = next.current_total(), stage = %next.stage, "event applied");
        Ok(next)
    }

    /// Redistribute the current total by `plan`. The total is unchanged.
    pub fn rebalance(&self, session: &GameSession, plan: &AllocationPlan) -> Result<GameSession, EngineError> {
        require(session, Stage::AwaitingRebalance)?;
        plan.validate().map_err(rejected("rebalance"))?;

        let mut next = session.clone();
        next.portfolio = AssetPortfolio::allocate(session.current_total(), plan);
        next.plans.insert(next.year, *plan);
        next.history.redistribute_latest(&next.portfolio);
        next.stage = Stage::AwaitingTimeJump;
        info!(year = next.year, "portfolio rebalanced");
        Ok(next)
    }

    /// Record the finished game once, stamped with the local time.
    pub fn finish_and_persist<S: RecordSink + ?Sized>(
        &self,
        session: &GameSession,
        feedback: &str,
        sink: &S,
    ) -> Result<GameSession, EngineError> {
        self.finish_and_persist_at(session, feedback, sink, Local::now().naive_local())
    }

    /// Like [`Engine::finish_and_persist`] with an explicit timestamp.
    /// Calling it again after a successful save does nothing.
    pub fn finish_and_persist_at<S: RecordSink + ?Sized>(
        &self,
        session: &GameSession,
        feedback: &str,
        sink: &S,
        recorded_at: NaiveDateTime,
    ) -> Result<GameSession, EngineError> {
        require(session, Stage::Finished)?;
        if session.persisted {
            debug!(player = %session.player, "record already saved");
            return Ok(session.clone());
        }
        let record = build_record(session, feedback, recorded_at);
        sink.append(&record).map_err(rejected("game record"))?;

        let mut next = session.clone();
        next.feedback = Some(feedback.to_string());
        next.persisted = true;
        info!(player = %next.player, final_total = record.final_total, "game record saved");
        Ok(next)
    }

    /// A fresh login-stage session.
    pub fn reset(&self) -> GameSession {
        info!("session reset");
        GameSession::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use destiny_core::{AssetClass, ValidationError};
    use destiny_econ::{FlatReturns, ImpactDirection, SampledReturns};
    use persistence::{decode_snapshot, encode_snapshot, GameRecord, PersistenceError};
    use proptest::prelude::*;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct MemorySink {
        records: RefCell<Vec<GameRecord>>,
    }

    impl RecordSink for MemorySink {
        fn append(&self, record: &GameRecord) -> Result<(), PersistenceError> {
            self.records.borrow_mut().push(record.clone());
            Ok(())
        }
    }

    /// Fails the first `failures` appends, then behaves like `MemorySink`.
    struct FlakySink {
        failures: Cell<u32>,
        inner: MemorySink,
    }

    impl RecordSink for FlakySink {
        fn append(&self, record: &GameRecord) -> Result<(), PersistenceError> {
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into());
            }
            self.inner.append(record)
        }
    }

    fn volatile() -> Engine {
        Engine::new(
            scenario::builtin_profile("volatile").unwrap(),
            scenario::default_catalog().unwrap(),
        )
    }

    fn no_growth() -> Engine {
        let profile = RateProfile {
            name: "zero".into(),
            base_rates: AssetMap::splat(0.0),
            bands: AssetMap::splat(None),
        };
        Engine::new(profile, scenario::default_catalog().unwrap())
    }

    fn allocated(engine: &Engine, plan: [f64; 5]) -> GameSession {
        let s = engine.start_session(&GameSession::new(), "Ava").unwrap();
        engine
            .confirm_initial_allocation(&s, &AllocationPlan::from_percentages(plan), 1_000_000.0)
            .unwrap()
    }

    fn play_to_end(engine: &Engine, returns: &mut dyn ReturnSource) -> GameSession {
        let mut s = allocated(engine, [20.0; 5]);
        for code in ["101", "102", "103"] {
            s = engine.advance_decade(&s, returns).unwrap();
            s = engine.apply_event(&s, code).unwrap();
            if s.stage() == Stage::AwaitingRebalance {
                s = engine.rebalance(&s, &AllocationPlan::equal()).unwrap();
            }
        }
        s
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-6 * b.abs().max(1.0)
    }

    #[test]
    fn login_then_equal_split() {
        let engine = volatile();
        let s = allocated(&engine, [20.0; 5]);
        assert_eq!(s.stage(), Stage::AwaitingTimeJump);
        assert_eq!(s.player(), "Ava");
        for asset in AssetClass::ALL {
            assert!(close(s.portfolio().get(asset), 200_000.0));
        }
        let first = s.history().first().unwrap();
        assert_eq!(first.year, 0);
        assert_eq!(first.total, 1_000_000.0);
        assert_eq!(s.labeled_plans()[0].0, "Year 0");
    }

    #[test]
    fn blank_name_is_rejected() {
        let engine = volatile();
        let err = engine.start_session(&GameSession::new(), "   ").unwrap_err();
        assert!(matches!(err, EngineError::Validation(ValidationError::EmptyName)));
    }

    #[test]
    fn flat_decade_compounds_base_rate() {
        let engine = volatile();
        let s = allocated(&engine, [20.0; 5]);
        let s = engine.advance_decade(&s, &mut FlatReturns).unwrap();
        assert_eq!(s.year(), 10);
        assert_eq!(s.history().len(), 11);
        assert_eq!(s.stage(), Stage::AwaitingEventCode);
        let expected = 200_000.0 * 1.05_f64.powi(10);
        assert!(close(s.portfolio().get(AssetClass::DividendYield), expected));
        assert_eq!(s.history().latest().unwrap().year, 10);
    }

    #[test]
    fn card_101_doubles_crypto() {
        let engine = no_growth();
        let s = allocated(&engine, [30.0, 30.0, 20.0, 10.0, 10.0]);
        let s = engine.advance_decade(&s, &mut FlatReturns).unwrap();
        assert!(close(s.portfolio().get(AssetClass::Crypto), 100_000.0));

        let preview = engine.preview_event(&s, "101").unwrap();
        assert_eq!(preview.impacts.crypto.direction, ImpactDirection::Gain);
        assert!(close(preview.impacts.crypto.amount, 100_000.0));

        let after = engine.apply_event(&s, "101").unwrap();
        assert!(close(after.portfolio().get(AssetClass::Crypto), 200_000.0));
        assert_eq!(after.stage(), Stage::AwaitingRebalance);
        assert_eq!(after.drawn_cards()[0].to_string(), format!("Year 10: [101] {}", preview.card.name));
        let latest = after.history().latest().unwrap();
        assert_eq!(after.history().len(), 11);
        assert!(close(latest.total, after.current_total()));
    }

    #[test]
    fn unknown_card_changes_nothing() {
        let engine = volatile();
        let s = allocated(&engine, [20.0; 5]);
        let s = engine.advance_decade(&s, &mut FlatReturns).unwrap();
        assert!(engine.preview_event(&s, "999").is_none());
        let before = s.clone();
        let err = engine.apply_event(&s, "999").unwrap_err();
        assert!(matches!(err, EngineError::InvalidCard(ref c) if c == "999"));
        assert_eq!(s, before);
        assert_eq!(s.stage(), Stage::AwaitingEventCode);
    }

    #[test]
    fn rebalance_summing_to_99_is_rejected() {
        let engine = volatile();
        let s = allocated(&engine, [20.0; 5]);
        let s = engine.advance_decade(&s, &mut FlatReturns).unwrap();
        let s = engine.apply_event(&s, "102").unwrap();
        let bad = AllocationPlan::from_percentages([20.0, 20.0, 20.0, 20.0, 19.0]);
        let err = engine.rebalance(&s, &bad).unwrap_err();
        assert!(matches!(err, EngineError::Validation(ValidationError::PlanSum(_))));
        assert_eq!(s.stage(), Stage::AwaitingRebalance);
    }

    #[test]
    fn full_game_finishes_on_third_event() {
        let engine = volatile();
        let mut rng = SampledReturns::seeded(2024);
        let s = play_to_end(&engine, &mut rng);
        assert_eq!(s.stage(), Stage::Finished);
        assert_eq!(s.year(), 30);
        assert_eq!(s.years_remaining(), 0);
        assert_eq!(s.progress(), 1.0);
        assert_eq!(s.history().len(), 31);
        assert_eq!(s.drawn_cards().len(), 3);
        assert_eq!(s.labeled_plans().len(), 3);
        assert!(matches!(
            engine.advance_decade(&s, &mut FlatReturns),
            Err(EngineError::WrongStage { expected: Stage::AwaitingTimeJump, actual: Stage::Finished })
        ));
    }

    #[test]
    fn finish_persists_exactly_once() {
        let engine = volatile();
        let s = play_to_end(&engine, &mut FlatReturns);
        let sink = MemorySink::default();
        let s = engine.finish_and_persist(&s, "great game", &sink).unwrap();
        assert!(s.is_persisted());
        assert_eq!(s.feedback(), Some("great game"));
        let s = engine.finish_and_persist(&s, "again", &sink).unwrap();
        assert_eq!(sink.records.borrow().len(), 1);
        assert_eq!(s.feedback(), Some("great game"));
    }

    #[test]
    fn failed_save_can_be_retried() {
        let engine = volatile();
        let s = play_to_end(&engine, &mut FlatReturns);
        let sink = FlakySink {
            failures: Cell::new(1),
            inner: MemorySink::default(),
        };
        let err = engine.finish_and_persist(&s, "fb", &sink).unwrap_err();
        assert!(matches!(err, EngineError::Persistence(_)));
        assert!(!s.is_persisted());
        let s = engine.finish_and_persist(&s, "fb", &sink).unwrap();
        assert!(s.is_persisted());
        assert_eq!(sink.inner.records.borrow().len(), 1);
    }

    #[test]
    fn record_summarises_the_game() {
        let engine = no_growth();
        let s = play_to_end(&engine, &mut FlatReturns);
        let at = chrono::NaiveDate::from_ymd_opt(2026, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let r = build_record(&s, "日記", at);
        assert_eq!(r.player, "Ava");
        assert_eq!(r.final_total, s.current_total().trunc() as i64);
        assert_eq!(r.event_cards.matches(" | ").count(), 2);
        assert!(r.event_cards.starts_with("Year 10: [101]"));
        let y0: serde_json::Value = serde_json::from_str(&r.allocation_year0).unwrap();
        assert_eq!(y0["crypto"], 20.0);
        assert!(!r.allocation_year20.is_empty());
        assert_eq!(r.feedback, "日記");
        assert_eq!(r.fields()[0], "2026-01-02 03:04:05");
    }

    #[test]
    fn missing_plans_are_blank_in_record() {
        let engine = volatile();
        let s = allocated(&engine, [20.0; 5]);
        let r = build_record(&s, "", Local::now().naive_local());
        assert!(!r.allocation_year0.is_empty());
        assert!(r.allocation_year10.is_empty());
        assert_eq!(r.roi_pct, rust_decimal::Decimal::ZERO);
    }

    #[test]
    fn wrong_stage_is_reported() {
        let engine = volatile();
        let s = engine.start_session(&GameSession::new(), "Ava").unwrap();
        let err = engine.advance_decade(&s, &mut FlatReturns).unwrap_err();
        assert!(matches!(
            err,
            EngineError::WrongStage { expected: Stage::AwaitingTimeJump, actual: Stage::Setup }
        ));
        assert!(engine.rebalance(&s, &AllocationPlan::equal()).is_err());
        assert!(engine.finish_and_persist(&s, "", &MemorySink::default()).is_err());
    }

    #[test]
    fn return_to_setup_only_at_year_zero() {
        let engine = volatile();
        let s = allocated(&engine, [20.0; 5]);
        let back = engine.return_to_setup(&s).unwrap();
        assert_eq!(back.stage(), Stage::Setup);
        assert_eq!(back.player(), "Ava");
        assert!(back.history().is_empty());
        assert_eq!(back.current_total(), 0.0);

        let mut s = engine.advance_decade(&s, &mut FlatReturns).unwrap();
        s = engine.apply_event(&s, "104").unwrap();
        s = engine.rebalance(&s, &AllocationPlan::equal()).unwrap();
        assert!(matches!(engine.return_to_setup(&s), Err(EngineError::SetupClosed(10))));
    }

    #[test]
    fn reset_starts_over() {
        let engine = volatile();
        let s = play_to_end(&engine, &mut FlatReturns);
        let fresh = engine.reset();
        assert_eq!(fresh.stage(), Stage::Login);
        assert_ne!(fresh, s);
        assert_eq!(fresh.roi_pct(), 0.0);
    }

    #[test]
    fn suggested_plan_reflects_shares() {
        let engine = no_growth();
        let s = allocated(&engine, [30.0, 30.0, 20.0, 10.0, 10.0]);
        let s = engine.advance_decade(&s, &mut FlatReturns).unwrap();
        let s = engine.apply_event(&s, "101").unwrap();
        let plan = s.suggested_plan();
        assert!(plan.validate().is_ok());
        let holdings = s.holdings();
        assert_eq!(holdings.len(), 5);
        let share_sum: f64 = holdings.iter().map(|h| h.share_pct).sum();
        assert!(close(share_sum, 100.0));
    }

    #[test]
    fn session_snapshot_resumes_mid_game() {
        let engine = volatile();
        let s = allocated(&engine, [10.0, 20.0, 30.0, 20.0, 20.0]);
        let s = engine.advance_decade(&s, &mut SampledReturns::seeded(9)).unwrap();
        let bytes = encode_snapshot(&s).unwrap();
        let back: GameSession = decode_snapshot(&bytes).unwrap();
        assert_eq!(back, s);
        assert!(engine.apply_event(&back, "105").is_ok());
    }

    #[test]
    fn near_hundred_plan_is_normalised_by_its_sum() {
        let engine = volatile();
        let s = allocated(&engine, [20.0, 20.0, 20.0, 20.0, 19.95]);
        assert!(close(s.current_total(), 1_000_000.0));
        assert!(close(s.portfolio().get(AssetClass::DividendYield), 1_000_000.0 * 20.0 / 99.95));
        assert!(close(s.portfolio().get(AssetClass::Crypto), 1_000_000.0 * 19.95 / 99.95));
    }

    #[test]
    fn decade_jump_past_final_year_is_refused() {
        let engine = volatile();
        let mut s = allocated(&engine, [20.0; 5]);
        for year in [25, FINAL_YEAR] {
            s.year = year;
            let err = engine.advance_decade(&s, &mut FlatReturns).unwrap_err();
            assert!(matches!(err, EngineError::PastFinalYear(y) if y == year), "{err}");
            assert_eq!(s.history().len(), 1);
        }
    }

    #[test]
    fn played_sessions_pass_validation() {
        let engine = volatile();
        let mut returns = SampledReturns::seeded(4);
        assert!(GameSession::new().validate().is_ok());
        let mut s = allocated(&engine, [10.0, 20.0, 30.0, 20.0, 20.0]);
        s.validate().unwrap();
        for code in ["104", "105", "106"] {
            s = engine.advance_decade(&s, &mut returns).unwrap();
            s.validate().unwrap();
            s = engine.apply_event(&s, code).unwrap();
            s.validate().unwrap();
            if s.stage() == Stage::AwaitingRebalance {
                s = engine.rebalance(&s, &AllocationPlan::equal()).unwrap();
                s.validate().unwrap();
            }
        }
        let done = engine.finish_and_persist(&s, "ok", &MemorySink::default()).unwrap();
        done.validate().unwrap();
    }

    #[test]
    fn snapshot_with_negative_holding_is_rejected() {
        let engine = volatile();
        let s = allocated(&engine, [20.0; 5]);
        let bytes = encode_snapshot(&s).unwrap();
        let needle = 200_000f64.to_le_bytes();
        let hits: Vec<usize> = bytes
            .windows(needle.len())
            .enumerate()
            .filter(|(_, w)| *w == needle)
            .map(|(i, _)| i)
            .collect();
        // Five holdings, then the same five values in the year-0 history entry.
        assert_eq!(hits.len(), 10);

        let mut in_portfolio = bytes.clone();
        in_portfolio[hits[0] + 7] |= 0x80;
        let err = decode_snapshot::<GameSession>(&in_portfolio).unwrap_err();
        assert!(matches!(err, PersistenceError::Snapshot(_)), "{err}");

        let mut in_history = bytes;
        in_history[hits[9] + 7] |= 0x80;
        let back: GameSession = decode_snapshot(&in_history).unwrap();
        assert!(matches!(
            back.validate(),
            Err(EngineError::Validation(ValidationError::NegativeHolding(AssetClass::Crypto)))
        ));
    }

    #[test]
    fn load_rejects_impossible_sessions() {
        let engine = volatile();
        let s = allocated(&engine, [20.0; 5]);
        let s = engine.advance_decade(&s, &mut FlatReturns).unwrap();
        let dir = std::env::temp_dir().join(format!("destiny-session-{}", std::process::id()));
        let path = dir.join("game.bin");

        persistence::save_snapshot(&path, &s).unwrap();
        assert_eq!(GameSession::load(&path).unwrap(), s);

        let mut off_mark = s.clone();
        off_mark.year = 15;
        persistence::save_snapshot(&path, &off_mark).unwrap();
        assert!(matches!(GameSession::load(&path), Err(EngineError::CorruptSession(_))));

        let mut beyond = s.clone();
        beyond.year = 40;
        assert!(matches!(beyond.validate(), Err(EngineError::CorruptSession(_))));

        let mut wrong_stage = s.clone();
        wrong_stage.stage = Stage::Finished;
        assert!(matches!(wrong_stage.validate(), Err(EngineError::CorruptSession(_))));

        let mut short_history = s.clone();
        short_history.year = 20;
        short_history.drawn_cards.push(DrawnCard {
            year: 10,
            code: "101".into(),
            name: "US Fed cuts rates by 3%".into(),
        });
        assert!(matches!(short_history.validate(), Err(EngineError::CorruptSession(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    proptest! {
        #[test]
        fn rebalance_conserves_total(
            weights in prop::array::uniform5(1.0f64..100.0),
            seed in any::<u64>(),
        ) {
            let engine = volatile();
            let s = allocated(&engine, [20.0; 5]);
            let s = engine.advance_decade(&s, &mut SampledReturns::seeded(seed)).unwrap();
            let s = engine.apply_event(&s, "106").unwrap();
            let sum: f64 = weights.iter().sum();
            let plan = AllocationPlan::from_percentages(weights.map(|w| w / sum * 100.0));
            let after = engine.rebalance(&s, &plan).unwrap();
            prop_assert!(close(after.current_total(), s.current_total()));
            prop_assert!(close(after.history().latest().unwrap().total, s.current_total()));
            prop_assert_eq!(after.history().len(), s.history().len());
        }

        #[test]
        fn history_grows_ten_per_decade(seed in any::<u64>(), decades in 1usize..=3) {
            let engine = volatile();
            let mut rng = SampledReturns::seeded(seed);
            let mut s = allocated(&engine, [20.0; 5]);
            for d in 0..decades {
                s = engine.advance_decade(&s, &mut rng).unwrap();
                s = engine.apply_event(&s, "107").unwrap();
                if d + 1 < 3 {
                    s = engine.rebalance(&s, &AllocationPlan::equal()).unwrap();
                }
            }
            prop_assert_eq!(s.history().len(), 1 + 10 * decades);
            prop_assert_eq!(s.year() as usize, 10 * decades);
            for entry in s.history().entries() {
                prop_assert!(entry.values.iter().all(|(_, v)| *v >= 0.0));
            }
        }

        #[test]
        fn off_target_plans_leave_setup_untouched(offset in 0.2f64..50.0, up in any::<bool>()) {
            let engine = volatile();
            let s = engine.start_session(&GameSession::new(), "Ava").unwrap();
            let delta = if up { offset } else { -offset };
            let plan = AllocationPlan::from_percentages([20.0, 20.0, 20.0, 20.0, 20.0 + delta]);
            let before = s.clone();
            prop_assert!(engine.confirm_initial_allocation(&s, &plan, 1_000_000.0).is_err());
            prop_assert_eq!(s, before);
        }
    }
}
