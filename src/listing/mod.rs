//! Listing page parsing
//!
//! Turns one year-listing page into ordered [`ListedCase`] values. The page is a
//! plain HTML table; Supreme Court pages have four columns and Court of Appeals
//! pages five (a division column after the case number). The layout is probed
//! per page rather than assumed from the partition because some historical
//! pages deviate.

use crate::{CaseRecord, Division, DownloadStatus, Month, OpinionType};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub mod urls;
pub mod years;

pub use urls::{filename_token, SiteUrls};
pub use years::parse_available_years;

static ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tr").expect("static selector is valid"));
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("static selector is valid"));

/// Listing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListingError {
    /// A table row that looks like data but cannot be read
    #[error("malformed listing row {row}: {reason}")]
    MalformedListing {
        /// Row index within the page (0-based, counting every `<tr>`)
        row: usize,
        /// What was wrong with it
        reason: String,
    },

    /// A case info URL without a usable filename token
    #[error("malformed listing url {url}: {reason}")]
    MalformedListingUrl {
        /// The offending URL
        url: String,
        /// What was wrong with it
        reason: String,
    },

    /// A file date whose month cannot be determined
    #[error("unparseable file date: {0:?}")]
    UnparseableDate(String),
}

/// Result type for listing operations
pub type ListingResult<T> = Result<T, ListingError>;

/// Partition and year a listing page was fetched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingContext {
    /// Partition
    pub opinion_type: OpinionType,
    /// Listing year
    pub year: u16,
}

/// Table layout detected on a listing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutVariant {
    /// date | case number | title | contains
    SupremeCourt,
    /// date | case number | division | title | contains
    Appeals,
}

impl LayoutVariant {
    /// Probe a row's cells: five or more cells with a roman-numeral third cell is
    /// the appellate layout.
    fn probe(cells: &[String]) -> Self {
        if cells.len() >= 5 && cells[2].parse::<Division>().is_ok() {
            Self::Appeals
        } else {
            Self::SupremeCourt
        }
    }

    /// Layout of one row on a page whose layout is `page`.
    ///
    /// On an appellate page every five-cell row keeps the division column, even
    /// when its division cell is blank or unusual.
    fn for_row(page: Self, cells: &[String]) -> Self {
        match page {
            Self::Appeals if cells.len() >= 5 => Self::Appeals,
            _ => Self::probe(cells),
        }
    }

    fn title_column(&self) -> usize {
        match self {
            Self::SupremeCourt => 2,
            Self::Appeals => 3,
        }
    }

    fn contains_column(&self) -> usize {
        self.title_column() + 1
    }
}

/// Position of a case within its year: `(year, month group, case within group)`.
///
/// Month groups are the consecutive runs of rows sharing a month, in page order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListingPosition {
    /// Listing year
    pub year: u16,
    /// Ordinal of the month group within the year page
    pub month_index: u32,
    /// Ordinal of the case within its month group
    pub case_index: u32,
}

impl ListingPosition {
    /// Whether this position lies at or before `checkpoint` within the same year.
    pub fn covered_by(&self, checkpoint: Option<ListingPosition>) -> bool {
        match checkpoint {
            Some(cp) => {
                cp.year == self.year
                    && (self.month_index, self.case_index) <= (cp.month_index, cp.case_index)
            }
            None => false,
        }
    }
}

/// A parsed listing row and its position.
#[derive(Debug, Clone, PartialEq)]
pub struct ListedCase {
    /// Partially filled record
    pub record: CaseRecord,
    /// Position in the page
    pub position: ListingPosition,
}

/// A row that was skipped because it could not be read.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedRow {
    /// Row index within the page
    pub row: usize,
    /// Why it was skipped
    pub error: ListingError,
}

/// Parsed listing page.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    /// Layout detected on the page, `None` for a page without data rows
    pub layout: Option<LayoutVariant>,
    /// Cases in document order
    pub cases: Vec<ListedCase>,
    /// Data-looking rows that were skipped
    pub malformed: Vec<MalformedRow>,
}

struct RawRow {
    index: usize,
    cells: Vec<String>,
    case_href: Option<String>,
    case_number: String,
}

/// Parse one year-listing page.
///
/// `urls` resolves the relative case links against the site base. A page with no
/// data rows yields an empty [`ListingPage`].
pub fn parse_listing(html: &str, context: ListingContext, urls: &SiteUrls) -> ListingPage {
    let document = Html::parse_document(html);
    let mut raw_rows = Vec::new();

    for (index, row) in document.select(&ROW_SELECTOR).enumerate() {
        let cells: Vec<ElementRef> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "td")
            .collect();
        if cells.len() < 4 {
            continue;
        }

        let link = cells[1].select(&LINK_SELECTOR).next();
        let case_number = link.map(|a| element_text(&a)).unwrap_or_default();
        let case_href = link.and_then(|a| a.value().attr("href")).map(str::to_string);
        if case_number.is_empty() || case_href.as_deref().map_or(true, |h| h.trim().is_empty()) {
            continue;
        }

        raw_rows.push(RawRow {
            index,
            cells: cells.iter().map(element_text).collect(),
            case_href,
            case_number,
        });
    }

    if raw_rows.is_empty() {
        debug!(year = context.year, opinion_type = %context.opinion_type, "Listing page has no data rows");
        return ListingPage::default();
    }
    let layout = if raw_rows
        .iter()
        .any(|raw| LayoutVariant::probe(&raw.cells) == LayoutVariant::Appeals)
    {
        LayoutVariant::Appeals
    } else {
        LayoutVariant::SupremeCourt
    };
    if (layout == LayoutVariant::Appeals) != context.opinion_type.expects_division() {
        warn!(
            year = context.year,
            opinion_type = %context.opinion_type,
            ?layout,
            "Listing layout differs from the partition's usual layout"
        );
    }

    let mut page = ListingPage {
        layout: Some(layout),
        ..ListingPage::default()
    };
    let mut grouper = MonthGrouper::new(context.year);

    for raw in raw_rows {
        let row_layout = LayoutVariant::for_row(layout, &raw.cells);
        match build_record(&raw, row_layout, context, urls) {
            Ok(record) => {
                let position = grouper.next(record.month);
                page.cases.push(ListedCase { record, position });
            }
            Err(error) => {
                warn!(row = raw.index, year = context.year, %error, "Skipping malformed listing row");
                page.malformed.push(MalformedRow {
                    row: raw.index,
                    error,
                });
            }
        }
    }

    debug!(
        year = context.year,
        opinion_type = %context.opinion_type,
        cases = page.cases.len(),
        malformed = page.malformed.len(),
        "Parsed listing page"
    );
    page
}

fn build_record(
    raw: &RawRow,
    layout: LayoutVariant,
    context: ListingContext,
    urls: &SiteUrls,
) -> ListingResult<CaseRecord> {
    let cells = &raw.cells;
    if cells.len() <= layout.contains_column() {
        return Err(ListingError::MalformedListing {
            row: raw.index,
            reason: format!("expected {} cells, found {}", layout.contains_column() + 1, cells.len()),
        });
    }

    let file_date = cells[0].clone();
    let month = Month::from_file_date(&file_date)?;

    let href = raw.case_href.as_deref().unwrap_or_default();
    let case_info_url = urls.resolve(href)?;

    let division = match layout {
        LayoutVariant::Appeals if context.opinion_type.expects_division() => cells[2].parse().ok(),
        _ => None,
    };

    Ok(CaseRecord {
        opinion_type: context.opinion_type,
        publication_status: context.opinion_type.publication_status(),
        year: context.year,
        month,
        file_date,
        case_number: raw.case_number.clone(),
        division,
        case_title: strip_title_marker(&cells[layout.title_column()]),
        file_contains: cells[layout.contains_column()].clone(),
        case_info_url,
        document_url: None,
        local_filename: None,
        download_status: DownloadStatus::Pending,
        scraped_at: None,
    })
}

/// Assigns `(month_index, case_index)` while walking rows in page order.
struct MonthGrouper {
    year: u16,
    current: Option<Month>,
    month_index: u32,
    case_index: u32,
}

impl MonthGrouper {
    fn new(year: u16) -> Self {
        Self {
            year,
            current: None,
            month_index: 0,
            case_index: 0,
        }
    }

    fn next(&mut self, month: Month) -> ListingPosition {
        match self.current {
            None => self.current = Some(month),
            Some(current) if current == month => self.case_index += 1,
            Some(_) => {
                self.current = Some(month);
                self.month_index += 1;
                self.case_index = 0;
            }
        }
        ListingPosition {
            year: self.year,
            month_index: self.month_index,
            case_index: self.case_index,
        }
    }
}

/// Visible text of an element with whitespace runs collapsed.
fn element_text(element: &ElementRef) -> String {
    normalize_ws(&element.text().collect::<String>())
}

fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Titles of some cases carry a leading `*` marker.
fn strip_title_marker(title: &str) -> String {
    title.trim_start_matches('*').trim_start().to_string()
}
