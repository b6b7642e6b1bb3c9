//! Site URL templates and document URL derivation

use super::{ListingError, ListingResult};
use crate::OpinionType;
use reqwest::Url;

/// Default site base.
pub const DEFAULT_BASE_URL: &str = "https://www.courts.wa.gov";

/// Builds every URL the archiver requests from one configured base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteUrls {
    base: Url,
}

impl SiteUrls {
    /// Create from a base such as `https://www.courts.wa.gov`.
    pub fn new(base: &str) -> ListingResult<Self> {
        let base = Url::parse(base.trim_end_matches('/')).map_err(|e| {
            ListingError::MalformedListingUrl {
                url: base.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { base })
    }

    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    /// Page linking every year that has opinions.
    pub fn year_index(&self) -> String {
        format!("{}/opinions/index.cfm?fa=opinions.displayAll", self.base())
    }

    /// Listing page of one partition and year.
    pub fn listing(&self, opinion_type: OpinionType, year: u16) -> String {
        format!(
            "{}/opinions/index.cfm?fa=opinions.byYear&fileYear={}&crtLevel={}&pubStatus={}",
            self.base(),
            year,
            opinion_type.court_level(),
            opinion_type.publication_status().code()
        )
    }

    /// PDF document for a numeric case id.
    pub fn document(&self, numeric_id: &str) -> String {
        format!("{}/opinions/pdf/{}.pdf", self.base(), numeric_id)
    }

    /// Printer-friendly information sheet for a filename token.
    pub fn info_sheet(&self, token: &str) -> String {
        format!(
            "{}/opinions/index.cfm?fa=opinions.showOpinionTextOnly&filename={}&printOnly=y",
            self.base(),
            token
        )
    }

    /// Resolve a (possibly relative) href against the base.
    pub fn resolve(&self, href: &str) -> ListingResult<String> {
        self.base
            .join(href.trim())
            .map(String::from)
            .map_err(|e| ListingError::MalformedListingUrl {
                url: href.to_string(),
                reason: e.to_string(),
            })
    }

    /// Derive the PDF URL from a case info URL.
    ///
    /// `...&filename=1025866MAJ` becomes `{base}/opinions/pdf/1025866.pdf`.
    pub fn derive_document_url(&self, case_info_url: &str) -> ListingResult<String> {
        let token = filename_token(case_info_url)?;
        let numeric_id = numeric_case_id(&token).map_err(|reason| {
            ListingError::MalformedListingUrl {
                url: case_info_url.to_string(),
                reason,
            }
        })?;
        Ok(self.document(numeric_id))
    }
}

/// Extract the `filename` query parameter of a case info URL.
pub fn filename_token(case_info_url: &str) -> ListingResult<String> {
    let url = Url::parse(case_info_url).map_err(|e| ListingError::MalformedListingUrl {
        url: case_info_url.to_string(),
        reason: e.to_string(),
    })?;
    url.query_pairs()
        .find(|(key, _)| key == "filename")
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ListingError::MalformedListingUrl {
            url: case_info_url.to_string(),
            reason: "no filename parameter".to_string(),
        })
}

/// Split a filename token into its numeric case id, dropping the content-type
/// suffix (`MAJ`, `CON`, `DIS`, `ORD`, `PER`, ...).
///
/// The suffix must be absent or two to three ASCII letters. Longer suffixes are
/// rejected rather than guessed at.
pub fn numeric_case_id(token: &str) -> Result<&str, String> {
    let split = token
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_alphabetic())
        .last()
        .map_or(token.len(), |(i, _)| i);
    let (digits, suffix) = token.split_at(split);

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("case id {digits:?} is not numeric"));
    }
    match suffix.len() {
        0 | 2 | 3 => Ok(digits),
        n => Err(format!("unexpected {n}-letter suffix {suffix:?}")),
    }
}
