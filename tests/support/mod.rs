//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use court_opinion_archiver::downloader::PoliteDelay;
use court_opinion_archiver::fetcher::{
    FetchError, FetchRequest, FetchResponse, FetchResult, PageFetcher, RetryPolicy,
};
use court_opinion_archiver::pipeline::PipelineConfig;
use court_opinion_archiver::shutdown::SharedShutdown;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub const BASE: &str = "https://courts.test";

/// In-memory [`PageFetcher`] answering from scripted responses.
///
/// Each URL first drains its queue of one-shot responses, then falls back to
/// its standing response, then to 404.
#[derive(Default)]
pub struct ScriptedFetcher {
    queued: Mutex<HashMap<String, VecDeque<FetchResult<FetchResponse>>>>,
    standing: Mutex<HashMap<String, FetchResponse>>,
    log: Mutex<Vec<(String, Instant)>>,
    /// Requested when a URL is fetched, to simulate Ctrl+C mid-run.
    trip: Mutex<Option<(String, SharedShutdown)>>,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Always answer `url` with `body` and status 200.
    pub fn page(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.respond(url, FetchResponse::ok(body));
    }

    /// Always answer `url` with `response`.
    pub fn respond(&self, url: impl Into<String>, response: FetchResponse) {
        self.standing.lock().unwrap().insert(url.into(), response);
    }

    /// Answer the next requests of `url` with `responses`, in order.
    pub fn script(&self, url: impl Into<String>, responses: Vec<FetchResult<FetchResponse>>) {
        self.queued
            .lock()
            .unwrap()
            .entry(url.into())
            .or_default()
            .extend(responses);
    }

    /// Request shutdown as soon as `url` is fetched.
    pub fn trip_shutdown_on(&self, url: impl Into<String>, shutdown: SharedShutdown) {
        *self.trip.lock().unwrap() = Some((url.into(), shutdown));
    }

    /// Every requested URL, in order.
    pub fn requests(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
    }

    /// How often `url` was requested.
    pub fn count(&self, url: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|(u, _)| u == url).count()
    }

    /// When `url` was requested.
    pub fn times(&self, url: &str) -> Vec<Instant> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, t)| *t)
            .collect()
    }

    /// Requests for PDF documents.
    pub fn document_requests(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|u| u.contains("/opinions/pdf/"))
            .collect()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> FetchResult<FetchResponse> {
        self.log
            .lock()
            .unwrap()
            .push((request.url.clone(), Instant::now()));

        if let Some((url, shutdown)) = self.trip.lock().unwrap().as_ref() {
            if *url == request.url {
                shutdown.request_shutdown();
            }
        }

        if let Some(next) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&request.url)
            .and_then(VecDeque::pop_front)
        {
            return next;
        }
        match self.standing.lock().unwrap().get(&request.url) {
            Some(response) => Ok(response.clone()),
            None => Ok(FetchResponse::status(404)),
        }
    }
}

/// A transient network failure.
pub fn timeout() -> FetchResult<FetchResponse> {
    Err(FetchError::transient(
        court_opinion_archiver::fetcher::RetryErrorType::NetworkTimeout,
        "operation timed out",
    ))
}

/// One listing row.
#[derive(Debug, Clone)]
pub struct Row {
    pub date: &'static str,
    pub number: &'static str,
    pub division: Option<&'static str>,
    pub title: &'static str,
    pub contains: &'static str,
    pub token: &'static str,
}

impl Row {
    pub fn supreme(date: &'static str, number: &'static str, token: &'static str, title: &'static str) -> Self {
        Self {
            date,
            number,
            division: None,
            title,
            contains: "Majority Opinion",
            token,
        }
    }

    pub fn appeals(
        date: &'static str,
        number: &'static str,
        division: &'static str,
        token: &'static str,
        title: &'static str,
    ) -> Self {
        Self {
            date,
            number,
            division: Some(division),
            title,
            contains: "Published Opinion",
            token,
        }
    }

    /// Absolute case info URL as the parser resolves it.
    pub fn info_url(&self) -> String {
        format!(
            "{BASE}/opinions/index.cfm?fa=opinions.showOpinion&filename={}",
            self.token
        )
    }

    /// Derived PDF URL.
    pub fn pdf_url(&self) -> String {
        let digits: String = self.token.chars().take_while(char::is_ascii_digit).collect();
        format!("{BASE}/opinions/pdf/{digits}.pdf")
    }
}

/// A listing page in the site's table layout.
pub fn listing_html(rows: &[Row]) -> String {
    let mut html = String::from(
        "<html><body><table class=\"opinions\">\
         <tr><th>File Date</th><th>Case Number</th><th>Case Title</th><th>File Contains</th></tr>",
    );
    for row in rows {
        html.push_str("<tr>");
        html.push_str(&format!("<td>{}</td>", row.date));
        html.push_str(&format!(
            "<td><a href=\"/opinions/index.cfm?fa=opinions.showOpinion&amp;filename={}\">{}</a></td>",
            row.token, row.number
        ));
        if let Some(division) = row.division {
            html.push_str(&format!("<td>{division}</td>"));
        }
        html.push_str(&format!("<td>{}</td><td>{}</td>", row.title, row.contains));
        html.push_str("</tr>");
    }
    html.push_str("</table></body></html>");
    html
}

/// Year index linking `years` for the Supreme Court and Court of Appeals.
pub fn year_index_html(supreme: &[u16], appeals: &[u16]) -> String {
    let mut html = String::from("<html><body>");
    for year in supreme {
        html.push_str(&format!(
            "<a href=\"/opinions/index.cfm?fa=opinions.byYear&fileYear={year}&crtLevel=S&pubStatus=PUB\">{year}</a> | "
        ));
    }
    for year in appeals {
        html.push_str(&format!(
            "<a href=\"/opinions/index.cfm?fa=opinions.byYear&fileYear={year}&crtLevel=A&pubStatus=PUB\">{year}</a> | "
        ));
    }
    html.push_str("</body></html>");
    html
}

/// Configuration for tests: no polite delay, tiny backoff, writes under `root`.
pub fn test_config(root: &Path) -> PipelineConfig {
    PipelineConfig::new(root)
        .with_base_url(BASE)
        .with_polite_delay(PoliteDelay::none())
        .with_retry(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
        })
}

/// Bytes of a small fake PDF.
pub fn pdf(tag: &str) -> Vec<u8> {
    format!("%PDF-1.4\n% {tag}\n%%EOF\n").into_bytes()
}

/// Orchestrator over `fetcher` with its own shutdown coordinator.
pub fn orchestrator(
    config: PipelineConfig,
    fetcher: Arc<ScriptedFetcher>,
) -> (court_opinion_archiver::pipeline::Orchestrator, SharedShutdown) {
    let shutdown = court_opinion_archiver::shutdown::ShutdownCoordinator::shared();
    let orchestrator = court_opinion_archiver::pipeline::Orchestrator::with_fetcher(config, fetcher)
        .unwrap()
        .with_shutdown(shutdown.clone());
    (orchestrator, shutdown)
}

/// Rows of a partition's `metadata.csv`, empty when it does not exist.
pub fn metadata_rows(
    root: &Path,
    opinion_type: court_opinion_archiver::OpinionType,
) -> Vec<court_opinion_archiver::output::MetadataRow> {
    let layout = court_opinion_archiver::output::PartitionLayout::new(root, opinion_type);
    court_opinion_archiver::output::csv::read_rows(layout.metadata_path()).unwrap()
}
