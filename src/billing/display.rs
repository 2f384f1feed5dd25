//! Presentation helpers for plans and subscriptions

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::db::Subscription;

/// Format a price in cents as US dollars, dropping `.00` on whole amounts
///
/// Usage-based plans carry fractional cents (`"0.0100000000"`); those are
/// rounded to two decimals. Unparseable input is returned unchanged.
#[must_use]
pub fn format_price(price_in_cents: &str) -> String {
    let Ok(cents) = price_in_cents.trim().parse::<f64>() else {
        return price_in_cents.to_string();
    };
    let dollars = cents / 100.0;
    let sign = if dollars < 0.0 { "-" } else { "" };
    let dollars = dollars.abs();

    if dollars.fract().abs() < f64::EPSILON {
        format!("{sign}${}", group_thousands(&format!("{dollars:.0}")))
    } else {
        let fixed = format!("{dollars:.2}");
        let (whole, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
        format!("{sign}${}.{frac}", group_thousands(whole))
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Human-readable billing interval: `month`, `3 months`
#[must_use]
pub fn format_interval(interval: Option<&str>, count: Option<i64>) -> String {
    let interval = match interval {
        Some(i) if !i.is_empty() && i != "unknown" => i,
        _ => return String::new(),
    };
    match count {
        Some(n) if n > 1 => format!("{n} {interval}s"),
        _ => interval.to_string(),
    }
}

/// Whether a subscription still grants anything (not cancelled, expired or unpaid)
#[must_use]
pub fn is_valid_subscription(status: &str) -> bool {
    !matches!(status, "cancelled" | "expired" | "unpaid")
}

/// Order subscriptions for display: active first, paused before cancelled
pub fn sort_subscriptions(subs: &mut [Subscription]) {
    subs.sort_by(|a, b| display_order(&a.status, &b.status));
}

fn display_order(a: &str, b: &str) -> Ordering {
    match (a, b) {
        ("active", "active") => Ordering::Equal,
        ("active", _) => Ordering::Less,
        (_, "active") => Ordering::Greater,
        ("paused", "cancelled") => Ordering::Less,
        ("cancelled", "paused") => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// The renewal/expiry line shown under a subscription
///
/// Returns `None` when the subscription has neither a renewal nor a trial
/// end date.
#[must_use]
pub fn subscription_date_message(sub: &Subscription, now: DateTime<Utc>) -> Option<String> {
    if sub.renews_at.is_none() && sub.trial_ends_at.is_none() {
        return None;
    }

    if let Some(ends_at) = sub.ends_at {
        let verb = if ends_at < now { "Expired on" } else { "Expires on" };
        return Some(format!("{verb} {}", format_date(ends_at)));
    }

    if let Some(trial_end) = sub.trial_ends_at.filter(|t| *t > now) {
        return Some(format!("Ends on {}", format_date(trial_end)));
    }

    Some(match sub.renews_at {
        Some(renews_at) => format!("Renews on {}", format_date(renews_at)),
        None => "Renews on an unknown date".to_string(),
    })
}

/// `January 5, 2030`
#[must_use]
pub fn format_date(date: DateTime<Utc>) -> String {
    date.format("%B %-d, %Y").to_string()
}
