//! Report composition: turns one run's facts into the sectioned document the
//! delivery engine chunks and sends. Deterministic for identical input so
//! message snapshots are reproducible in tests.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use shelfwatch_common::TitleFact;

use crate::chunk::{Document, Section};
use crate::detector::RunOutcome;

const FOOTER: &str = "> shelfwatch automated catalog run";

/// Compose the release report for one run.
///
/// Layout: a count summary in the title, then one section per distinct
/// period — all New sections first, then all Published sections, periods in
/// lexicographic order within each group, items in insertion order.
pub fn compose(outcome: &RunOutcome, run_at: DateTime<Utc>) -> Document {
    let mut sections = Vec::new();

    for (period, facts) in by_period(&outcome.new_titles) {
        let items = facts
            .iter()
            .enumerate()
            .map(|(i, f)| format!("{}. {}", i + 1, f.title))
            .collect();
        sections.push(Section {
            heading: format!("## 📅 {period} · New listings"),
            items,
        });
    }

    for (period, facts) in by_period(&outcome.published_titles) {
        let items = facts
            .iter()
            .enumerate()
            .map(|(i, f)| {
                format!(
                    "{}. {} (listed {} → {})",
                    i + 1,
                    f.title,
                    f.first_seen,
                    f.last_seen
                )
            })
            .collect();
        sections.push(Section {
            heading: format!("## 📅 {period} · Now published"),
            items,
        });
    }

    Document {
        title: format!(
            "📚 {} — {} new, {} published",
            run_at.format("%Y-%m-%d %H:%M UTC"),
            outcome.new_titles.len(),
            outcome.published_titles.len()
        ),
        sections,
        footer: FOOTER.to_string(),
    }
}

/// One-line notice for runs that found nothing, listing the periods the
/// catalog currently covers. Sent only when explicitly enabled.
pub fn compose_quiet_notice(periods: &[String], run_at: DateTime<Utc>) -> Document {
    let listed = if periods.is_empty() {
        "none".to_string()
    } else {
        periods.join(", ")
    };
    Document {
        title: format!("📚 {} — no catalog changes", run_at.format("%Y-%m-%d %H:%M UTC")),
        sections: vec![Section {
            heading: "## Periods inspected".to_string(),
            items: vec![listed],
        }],
        footer: FOOTER.to_string(),
    }
}

/// Short failure notice posted best-effort before the process exits non-zero.
pub fn compose_failure_notice(error: &str, run_at: DateTime<Utc>) -> Document {
    Document {
        title: format!("⚠️ {} — catalog run failed", run_at.format("%Y-%m-%d %H:%M UTC")),
        sections: vec![Section {
            heading: "## Error".to_string(),
            items: vec![error.to_string()],
        }],
        footer: FOOTER.to_string(),
    }
}

/// Group facts by period label, lexicographically ordered, preserving the
/// facts' insertion order inside each group.
fn by_period(facts: &[TitleFact]) -> BTreeMap<&str, Vec<&TitleFact>> {
    let mut map: BTreeMap<&str, Vec<&TitleFact>> = BTreeMap::new();
    for fact in facts {
        map.entry(fact.period.as_str()).or_default().push(fact);
    }
    map
}
