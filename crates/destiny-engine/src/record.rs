use crate::GameSession;
use chrono::NaiveDateTime;
use persistence::GameRecord;
use rust_decimal::Decimal;

/// Years whose allocation plans are written to the record.
const RECORDED_PLAN_YEARS: [u32; 3] = [0, 10, 20];

fn plan_json(session: &GameSession, year: u32) -> String {
    session
        .plan_at(year)
        .and_then(|plan| serde_json::to_string(plan.percentages()).ok())
        .unwrap_or_default()
}

/// Summarise a finished session as one persisted row.
pub fn build_record(session: &GameSession, feedback: &str, recorded_at: NaiveDateTime) -> GameRecord {
    let roi = Decimal::from_f64_retain(session.roi_pct())
        .unwrap_or_default()
        .round_dp(1);
    let [y0, y10, y20] = RECORDED_PLAN_YEARS.map(|year| plan_json(session, year));
    GameRecord {
        recorded_at,
        player: session.player().to_string(),
        final_total: session.current_total().trunc() as i64,
        roi_pct: roi,
        event_cards: session
            .drawn_cards()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" | "),
        allocation_year0: y0,
        allocation_year10: y10,
        allocation_year20: y20,
        feedback: feedback.to_string(),
    }
}
