//! Year discovery from the site's year index page

use crate::OpinionType;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::collections::BTreeSet;

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("static selector is valid"));

/// Years linked from the index page for `opinion_type`'s court level, most recent first.
///
/// A year link points at a `byYear` listing for the court level and its text,
/// ignoring `|` separators, is exactly four digits.
pub fn parse_available_years(html: &str, opinion_type: OpinionType) -> Vec<u16> {
    let document = Html::parse_document(html);
    let level = format!("crtLevel={}", opinion_type.court_level());

    let years: BTreeSet<u16> = document
        .select(&LINK_SELECTOR)
        .filter(|a| {
            a.value()
                .attr("href")
                .is_some_and(|href| href.contains("byYear") && href.contains(&level))
        })
        .filter_map(|a| {
            let text: String = a.text().collect::<String>().replace('|', "");
            let text = text.trim();
            (text.len() == 4 && text.chars().all(|c| c.is_ascii_digit()))
                .then(|| text.parse().ok())
                .flatten()
        })
        .collect();

    years.into_iter().rev().collect()
}
