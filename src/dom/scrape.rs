use log::debug;
use scraper::{ElementRef, Html, Selector};

use super::locate;
use crate::assemble::normalize_whitespace;
use crate::{RawSegment, timestamp};

const TIME_CHILD_CSS: &str = "[data-start], .timestamp, .time, .segment-timestamp";

/// Scrape every rendered transcript segment in `markup`.
///
/// Timestamps are recovered from, in order: the node text (and removed from
/// it), the `aria-label`, a time-bearing child, and finally the node position
/// times `estimated_segment_seconds`, which is only a rough guess.
pub fn scrape_segments(markup: &str, estimated_segment_seconds: f64) -> Vec<RawSegment> {
    let doc = Html::parse_document(markup);
    let time_child = Selector::parse(TIME_CHILD_CSS).ok();

    let segments: Vec<RawSegment> = locate::best_segment_nodes(&doc)
        .into_iter()
        .enumerate()
        .filter_map(|(index, node)| scrape_node(node, index, time_child.as_ref(), estimated_segment_seconds))
        .collect();

    debug!("Scraped {} transcript segments", segments.len());
    segments
}

fn scrape_node(
    node: ElementRef<'_>,
    index: usize,
    time_child: Option<&Selector>,
    estimated_segment_seconds: f64,
) -> Option<RawSegment> {
    let mut text = normalize_whitespace(&node.text().collect::<Vec<_>>().join(" "));
    if text.is_empty() {
        return None;
    }

    let mut start = None;
    if let Some(found) = timestamp::find_in(&text) {
        text.replace_range(found.span, " ");
        text = normalize_whitespace(&text);
        start = Some(found.seconds);
    }

    let start = start
        .or_else(|| {
            node.value()
                .attr("aria-label")
                .and_then(timestamp::find_in)
                .map(|f| f.seconds)
        })
        .or_else(|| time_child.and_then(|sel| child_timestamp(node, sel)));

    if text.is_empty() {
        return None;
    }

    Some(match start {
        Some(seconds) => RawSegment::new(Some(seconds as f64), None, text),
        None => RawSegment::estimated(index as f64 * estimated_segment_seconds, text),
    })
}

fn child_timestamp(node: ElementRef<'_>, sel: &Selector) -> Option<u64> {
    node.select(sel).find_map(|child| {
        let text = child.text().collect::<String>();
        timestamp::find_in(&text).map(|f| f.seconds).or_else(|| {
            let attr = child.value().attr("data-start")?;
            timestamp::find_in(attr)
                .map(|f| f.seconds)
                .or_else(|| attr.trim().parse::<f64>().ok().map(timestamp::floor_seconds))
        })
    })
}
