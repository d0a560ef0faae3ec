//! Plain-text views of sessions, rates and cards.

use destiny_core::{AllocationPlan, AssetClass, EventCatalog};
use destiny_econ::RateProfile;
use destiny_engine::{EventPreview, GameSession};
use std::fmt::Write;

/// Whole currency units with thousands separators, e.g. `$1,234,567`.
pub fn money(value: f64) -> String {
    let n = value.trunc() as i64;
    let digits = n.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if n < 0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

pub fn plan_inline(plan: &AllocationPlan) -> String {
    AssetClass::ALL
        .iter()
        .map(|&a| format!("{}", plan.get(a)))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn rates(profile: &RateProfile) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Rate profile: {}", profile.name);
    let _ = writeln!(out, "{:<16}{:>10}{:>10}  {}", "Asset", "Rate", "Band", "Risk");
    for row in profile.rows() {
        let band = row
            .band_pct
            .map(|b| format!("±{b:.0}%"))
            .unwrap_or_else(|| "-".into());
        let _ = writeln!(
            out,
            "{:<16}{:>9.1}%{:>10}  {}",
            row.asset.display_name(),
            row.base_rate_pct,
            band,
            row.risk.label()
        );
    }
    out
}

pub fn cards(catalog: &EventCatalog) -> String {
    let mut out = String::new();
    let mut cards: Vec<_> = catalog.iter().collect();
    cards.sort_by(|a, b| a.code.cmp(&b.code));
    for card in cards {
        let impacts = AssetClass::ALL
            .iter()
            .map(|&a| format!("{} {:+}%", a.key(), card.impacts[a]))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(out, "[{}] {}\n      {}\n      {}", card.code, card.name, card.description, impacts);
    }
    out
}

pub fn holdings(session: &GameSession) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Year {} of 30 | total {} | ROI {:.1}% | {} years to go",
        session.year(),
        money(session.current_total()),
        session.roi_pct(),
        session.years_remaining()
    );
    for h in session.holdings() {
        let _ = writeln!(
            out,
            "  {:<16}{:>16}{:>8.1}%",
            h.asset.display_name(),
            money(h.value),
            h.share_pct
        );
    }
    out
}

pub fn preview(p: &EventPreview) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[{}] {}\n  {}", p.card.code, p.card.name, p.card.description);
    for (asset, impact) in p.impacts.iter() {
        let _ = writeln!(
            out,
            "  {:<16}{} {:>+6.0}%  {:>14}",
            asset.display_name(),
            impact.direction.arrow(),
            impact.pct,
            money(impact.amount)
        );
    }
    out
}

pub fn summary(session: &GameSession) -> String {
    let mut out = String::new();
    let tier = session.roi_tier();
    let _ = writeln!(out, "=== {}'s thirty years ===", session.player());
    let _ = writeln!(out, "Final total: {}", money(session.current_total()));
    let _ = writeln!(out, "ROI: {:.1}%", session.roi_pct());
    let _ = writeln!(out, "{}: {}", tier.title(), tier.blurb());
    let _ = writeln!(out, "Events:");
    for card in session.drawn_cards() {
        let _ = writeln!(out, "  {card}");
    }
    let _ = writeln!(out, "Plans:");
    for (label, plan) in session.labeled_plans() {
        let _ = writeln!(out, "  {label}: {}", plan_inline(plan));
    }
    out
}
