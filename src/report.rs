//! Human-readable alert reports, one message per pattern kind.
//!
//! Messages use the HTML parse mode of the messaging API: titles in `<b>`,
//! fixed-width metric lines in `<code>`. Detections are grouped by time
//! bucket and sorted inside each bucket by the figure that matters most for
//! that kind.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use crate::{
    AccumulationSignal, BarMetrics, BreakoutSignal, Detection, PatternKind, PumpSignal,
    SupportTouchSignal,
};

/// Quote volume in millions with two decimals
pub fn format_volume(volume: f64) -> String {
    format!("{:.2}", volume / 1_000_000.0)
}

/// Cut `text` to at most `max_chars` characters.
///
/// When a cut is needed it lands after the last complete line that fits, so
/// no `<code>` tag is left open. A single line longer than the limit is cut
/// mid-line on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };
    let head = &text[..cut];
    match head.rfind('\n') {
        Some(nl) if nl > 0 => head[..=nl].to_string(),
        _ => head.to_string(),
    }
}

/// Build one report per kind present in `fresh`, in [`PatternKind::ALL`] order.
pub fn build_reports(
    fresh: &[Detection],
    scan_duration: Duration,
    max_chars: usize,
    quote: &str,
) -> Vec<(PatternKind, String)> {
    PatternKind::ALL
        .into_iter()
        .filter_map(|kind| {
            build_report(kind, fresh, scan_duration, quote)
                .map(|text| (kind, truncate_chars(&text, max_chars)))
        })
        .collect()
}

/// Untruncated report for `kind`, or None if `detections` holds none of it.
pub fn build_report(
    kind: PatternKind,
    detections: &[Detection],
    scan_duration: Duration,
    quote: &str,
) -> Option<String> {
    let text = match kind {
        PatternKind::Pump => pump_report(
            detections
                .iter()
                .filter_map(|d| match d {
                    Detection::Pump(s) => Some(s),
                    _ => None,
                })
                .collect(),
            scan_duration,
            quote,
        ),
        PatternKind::Breakout => breakout_report(
            detections
                .iter()
                .filter_map(|d| match d {
                    Detection::Breakout(s) => Some(s),
                    _ => None,
                })
                .collect(),
            scan_duration,
            quote,
        ),
        PatternKind::SupportTouch => support_report(
            detections
                .iter()
                .filter_map(|d| match d {
                    Detection::SupportTouch(s) => Some(s),
                    _ => None,
                })
                .collect(),
            scan_duration,
            quote,
        ),
        PatternKind::Accumulation => accumulation_report(
            detections
                .iter()
                .filter_map(|d| match d {
                    Detection::Accumulation(s) => Some(s),
                    _ => None,
                })
                .collect(),
            scan_duration,
            quote,
        ),
    };
    (!text.is_empty()).then_some(text)
}

// ============================================================
// LAYOUT HELPERS
// ============================================================

/// Group by bucket, sort each group with `order`, oldest bucket first unless
/// `newest_first`.
fn grouped<'a, T>(
    items: Vec<&'a T>,
    bucket: impl Fn(&T) -> &str,
    newest_first: bool,
    order: impl Fn(&T, &T) -> Ordering,
) -> Vec<(String, Vec<&'a T>)> {
    let mut groups: BTreeMap<String, Vec<&'a T>> = BTreeMap::new();
    for item in items {
        groups.entry(bucket(item).to_string()).or_default().push(item);
    }
    let mut out: Vec<_> = groups
        .into_iter()
        .map(|(key, mut group)| {
            group.sort_by(|a, b| order(a, b));
            (key, group)
        })
        .collect();
    if newest_first {
        out.reverse();
    }
    out
}

fn header(out: &mut String, icon: &str, title: &str, scan_duration: Duration) {
    let _ = writeln!(out, "{icon} <b>{title}</b> {icon}");
    let _ = writeln!(out, "⏱ Scan: {:.2}s\n", scan_duration.as_secs_f64());
}

/// `SYMBOL  PCT  RSI   VM  VOL`
fn metrics_line(base: &str, m: &BarMetrics) -> String {
    let rsi = m
        .rsi
        .map(|r| format!("{r:.1}"))
        .unwrap_or_else(|| "N/A".to_string());
    format!(
        "{base:<6} {:5.2} {rsi:>4} {:4.1} {:<4}",
        m.pct,
        m.volume_multiple,
        format_volume(m.quote_volume)
    )
}

fn base<'a>(symbol: &'a crate::Symbol, quote: &str) -> &'a str {
    symbol.base(quote)
}

// ============================================================
// PER-KIND REPORTS
// ============================================================

fn pump_report(items: Vec<&PumpSignal>, scan_duration: Duration, quote: &str) -> String {
    if items.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    header(&mut out, "🔥", "PUMP ALERTS", scan_duration);

    let groups = grouped(items, |s| s.bucket.as_str(), true, |a, b| {
        b.metrics.pct.total_cmp(&a.metrics.pct)
    });
    for (bucket, group) in groups {
        let _ = writeln!(out, "  ⏰ {bucket} UTC");
        for s in group {
            let _ = writeln!(
                out,
                "📈 <code>{}</code>",
                metrics_line(base(&s.symbol, quote), &s.metrics)
            );
            let _ = writeln!(
                out,
                "   <code>       Last pump: {} candles ago</code>\n",
                s.candles_since_last_pump
            );
        }
    }
    out
}

fn breakout_report(items: Vec<&BreakoutSignal>, scan_duration: Duration, quote: &str) -> String {
    if items.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    header(&mut out, "🚀", "TREND BREAKOUT ALERTS", scan_duration);

    let groups = grouped(items, |s| s.bucket.as_str(), false, |a, b| {
        b.red_distance.total_cmp(&a.red_distance)
    });
    for (bucket, group) in groups {
        let _ = writeln!(out, "  ⏰ {bucket} UTC");
        for s in group {
            let _ = writeln!(
                out,
                "✅ <code>{}</code>",
                metrics_line(base(&s.symbol, quote), &s.metrics)
            );
            let _ = writeln!(
                out,
                "   <code>       🔴Old: ${:.5} (+{:.2}%)</code>",
                s.old_red_line, s.red_distance
            );
            let _ = writeln!(
                out,
                "   <code>       🟢New: ${:.5} (+{:.2}%)</code>\n",
                s.new_green_line, s.green_distance
            );
        }
    }
    out.push_str("💡 🔴Old = Last downtrend line (broke above it!)\n");
    out.push_str("💡 🟢New = New uptrend line (support now)\n");
    out
}

fn support_report(
    items: Vec<&SupportTouchSignal>,
    scan_duration: Duration,
    quote: &str,
) -> String {
    if items.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    header(&mut out, "🛡", "SUPPORT TOUCH ALERTS", scan_duration);

    let groups = grouped(items, |s| s.bucket.as_str(), false, |a, b| {
        a.distance_to_support.total_cmp(&b.distance_to_support)
    });
    for (bucket, group) in groups {
        let _ = writeln!(out, "  ⏰ {bucket} UTC");
        for s in group {
            let _ = writeln!(
                out,
                "🟡 <code>{}</code>",
                metrics_line(base(&s.symbol, quote), &s.metrics)
            );
            let _ = writeln!(
                out,
                "   <code>       🟢Support: ${:.5} (+{:.2}%)</code>",
                s.support, s.distance_to_support
            );
            let _ = writeln!(
                out,
                "   <code>       🔴Resist:  ${:.5} (+{:.2}%)</code>\n",
                s.resistance, s.distance_to_resistance
            );
        }
    }
    out
}

fn accumulation_report(
    items: Vec<&AccumulationSignal>,
    scan_duration: Duration,
    quote: &str,
) -> String {
    if items.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    header(&mut out, "🐋", "ACCUMULATION ALERTS", scan_duration);

    let groups = grouped(items, |s| s.bucket.as_str(), true, |a, b| {
        b.volume_ratio.total_cmp(&a.volume_ratio)
    });
    for (bucket, group) in groups {
        let _ = writeln!(out, "  ⏰ {bucket} UTC");
        for s in group {
            let _ = writeln!(
                out,
                "🔎 <code>{:<6} ${:.5} x{:4.1} min x{:.1} body {:.2}%</code>",
                base(&s.symbol, quote),
                s.price,
                s.volume_ratio,
                s.min_volume_ratio,
                s.max_body_pct
            );
        }
        out.push('\n');
    }
    out
}
