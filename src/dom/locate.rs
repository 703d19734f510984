//! Ordered element-finding strategies over a page snapshot.
//!
//! Every function here parses the markup it is given and returns owned
//! results, so no parsed document is held across an await point.

use log::debug;
use scraper::{ElementRef, Html, Selector};

use super::page::NodeRef;

/// Extra condition an element must meet besides matching `css`.
/// Comparisons are case-insensitive substring checks.
#[derive(Debug, Clone, Copy)]
pub enum Needle {
    Any,
    Attr(&'static str, &'static str),
    Text(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct ElementLocator {
    pub css: &'static str,
    pub needle: Needle,
}

const fn any(css: &'static str) -> ElementLocator {
    ElementLocator { css, needle: Needle::Any }
}

const fn label(css: &'static str, needle: &'static str) -> ElementLocator {
    ElementLocator {
        css,
        needle: Needle::Attr("aria-label", needle),
    }
}

pub const TRANSCRIPT_TRIGGERS: &[ElementLocator] = &[
    label("button[aria-label]", "show transcript"),
    label("button[aria-label]", "transcript"),
    ElementLocator {
        css: "button[title]",
        needle: Needle::Attr("title", "transcript"),
    },
    any("[data-testid=\"transcript-button\"]"),
    label("ytd-button-renderer[aria-label]", "transcript"),
    any("ytd-video-description-transcript-section-renderer button"),
    any(".ytd-video-description-transcript-section-renderer button"),
];

pub const OVERFLOW_MENU_TRIGGERS: &[ElementLocator] = &[
    label("button[aria-label]", "more actions"),
    label("ytd-menu-renderer button[aria-label]", "more"),
    label("#description button[aria-label]", "more"),
    label("button[aria-label]", "more"),
];

pub const MENU_TRANSCRIPT_ITEMS: &[ElementLocator] = &[
    label("ytd-menu-service-item-renderer[aria-label]", "transcript"),
    label("tp-yt-paper-item[aria-label]", "transcript"),
    label("[role=\"menuitem\"][aria-label]", "transcript"),
    ElementLocator {
        css: "ytd-menu-service-item-renderer",
        needle: Needle::Text("transcript"),
    },
    ElementLocator {
        css: "ytd-menu-navigation-item-renderer",
        needle: Needle::Text("transcript"),
    },
];

pub const CLOSE_TRIGGERS: &[ElementLocator] = &[
    label("button[aria-label]", "close transcript"),
    label("button[aria-label]", "hide transcript"),
    any("[data-testid=\"transcript-close\"]"),
];

pub const CONTAINERS: &[ElementLocator] = &[
    any("#transcript-scrollbox"),
    any(".ytd-transcript-renderer"),
    any("[data-testid=\"transcript-container\"]"),
    any("ytd-transcript-renderer #body"),
    any("ytd-transcript-renderer .ytd-transcript-body-renderer"),
    any("#transcript .ytd-transcript-body-renderer"),
    any(".ytd-transcript-body-renderer"),
    any("ytd-transcript-segment-list-renderer"),
    any("#segments-container"),
    any(".transcript-segment-list"),
];

pub const SEGMENT_NODES: &[ElementLocator] = &[
    any("[data-testid=\"transcript-segment\"]"),
    any(".ytd-transcript-segment-renderer"),
    any(".segment-text"),
    any("ytd-transcript-segment-renderer"),
    any(".transcript-segment"),
];

/// Only consulted when none of [`SEGMENT_NODES`] matches anything
pub const SEGMENT_NODES_LAST_RESORT: &[ElementLocator] = &[any("[role=\"button\"][tabindex=\"0\"]")];

fn parse_selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(e) => {
            debug!("Unusable selector {css:?}: {e:?}");
            None
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

fn satisfies(el: &ElementRef<'_>, needle: Needle) -> bool {
    match needle {
        Needle::Any => true,
        Needle::Attr(attr, needle) => el.value().attr(attr).is_some_and(|v| contains_ci(v, needle)),
        Needle::Text(needle) => contains_ci(&el.text().collect::<String>(), needle),
    }
}

fn first_in(doc: &Html, locators: &[ElementLocator]) -> Option<NodeRef> {
    locators.iter().find_map(|loc| {
        let sel = parse_selector(loc.css)?;
        doc.select(&sel)
            .enumerate()
            .find(|(_, el)| satisfies(el, loc.needle))
            .map(|(index, _)| NodeRef::new(loc.css, index))
    })
}

/// First element matched by the first locator that matches anything
pub fn find_first(markup: &str, locators: &[ElementLocator]) -> Option<NodeRef> {
    let doc = Html::parse_document(markup);
    first_in(&doc, locators)
}

pub(crate) fn resolve<'a>(doc: &'a Html, node: &NodeRef) -> Option<ElementRef<'a>> {
    let sel = parse_selector(&node.selector)?;
    doc.select(&sel).nth(node.index)
}

fn count_in(scope: ElementRef<'_>, loc: &ElementLocator) -> usize {
    parse_selector(loc.css)
        .map(|sel| scope.select(&sel).filter(|el| satisfies(el, loc.needle)).count())
        .unwrap_or(0)
}

/// Largest number of segment nodes any single segment locator finds,
/// inside `within` when given, otherwise in the whole document.
pub fn segment_count(markup: &str, within: Option<&NodeRef>) -> usize {
    let doc = Html::parse_document(markup);
    let scope = match within {
        Some(node) => match resolve(&doc, node) {
            Some(el) => el,
            None => return 0,
        },
        None => doc.root_element(),
    };

    SEGMENT_NODES.iter().map(|loc| count_in(scope, loc)).max().unwrap_or(0)
}

/// Segment nodes from the locator that finds the most of them. Ties go to the
/// earlier locator. Falls back to [`SEGMENT_NODES_LAST_RESORT`] when nothing matches.
pub fn best_segment_nodes<'a>(doc: &'a Html) -> Vec<ElementRef<'a>> {
    let root = doc.root_element();
    let pick = |locators: &[ElementLocator]| -> Option<ElementLocator> {
        let mut best: Option<(ElementLocator, usize)> = None;
        for loc in locators {
            let n = count_in(root, loc);
            if n > 0 && best.is_none_or(|(_, max)| n > max) {
                best = Some((*loc, n));
            }
        }
        best.map(|(loc, n)| {
            debug!("Using segment selector {:?} which found {n} segments", loc.css);
            loc
        })
    };

    let Some(loc) = pick(SEGMENT_NODES).or_else(|| pick(SEGMENT_NODES_LAST_RESORT)) else {
        return Vec::new();
    };
    let Some(sel) = parse_selector(loc.css) else {
        return Vec::new();
    };
    root.select(&sel).filter(|el| satisfies(el, loc.needle)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_first_by_label_case_insensitive() {
        let html = r#"<button aria-label="Like">x</button><button aria-label="Show Transcript">t</button>"#;
        assert_eq!(
            find_first(html, TRANSCRIPT_TRIGGERS),
            Some(NodeRef::new("button[aria-label]", 1))
        );
    }

    #[test]
    fn test_find_first_respects_locator_order() {
        let html = r#"<div class="ytd-video-description-transcript-section-renderer"><button>open</button></div>
            <button title="Open transcript">t</button>"#;
        assert_eq!(find_first(html, TRANSCRIPT_TRIGGERS), Some(NodeRef::new("button[title]", 0)));
    }

    #[test]
    fn test_find_first_menu_item_by_text() {
        let html = r#"<ytd-menu-service-item-renderer>Save</ytd-menu-service-item-renderer>
            <ytd-menu-service-item-renderer><span>Show transcript</span></ytd-menu-service-item-renderer>"#;
        assert_eq!(
            find_first(html, MENU_TRANSCRIPT_ITEMS),
            Some(NodeRef::new("ytd-menu-service-item-renderer", 1))
        );
    }

    #[test]
    fn test_find_first_none() {
        assert!(find_first("<p>plain</p>", TRANSCRIPT_TRIGGERS).is_none());
        assert!(find_first("", CONTAINERS).is_none());
    }

    #[test]
    fn test_segment_count_scoped() {
        let html = r#"<div id="transcript-scrollbox">
                <div class="transcript-segment">a</div><div class="transcript-segment">b</div>
            </div>
            <div class="transcript-segment">outside</div>"#;
        let container = NodeRef::new("#transcript-scrollbox", 0);
        assert_eq!(segment_count(html, Some(&container)), 2);
        assert_eq!(segment_count(html, None), 3);
        assert_eq!(segment_count(html, Some(&NodeRef::new("#missing", 0))), 0);
    }

    #[test]
    fn test_best_segment_nodes_prefers_larger_match() {
        let html = r#"<div data-testid="transcript-segment">0:01 a</div>
            <div class="transcript-segment">0:01 a</div><div class="transcript-segment">0:02 b</div>"#;
        let doc = Html::parse_document(html);
        assert_eq!(best_segment_nodes(&doc).len(), 2);
    }

    #[test]
    fn test_best_segment_nodes_last_resort() {
        let html = r#"<div role="button" tabindex="0">0:01 a</div><div role="button" tabindex="0">0:02 b</div>"#;
        let doc = Html::parse_document(html);
        assert_eq!(best_segment_nodes(&doc).len(), 2);

        let doc = Html::parse_document("<p>nothing</p>");
        assert!(best_segment_nodes(&doc).is_empty());
    }
}
