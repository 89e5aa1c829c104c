//! Retailer page scraping via Firecrawl
//!
//! A single `/v1/search` call restricted to known fashion retailers returns
//! page markdown; reviews are recovered from the markdown line by line.

use super::text::{
    classify_api_message, classify_status, classify_transport, parse_rating_text,
    parse_review_date,
};
use super::SourceError;
use crate::review::{Query, RawRating, RawReview};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::OnceLock;
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "https://api.firecrawl.dev";

pub const DEFAULT_SITES: &[&str] = &[
    "amazon.com",
    "nordstrom.com",
    "macys.com",
    "zappos.com",
    "asos.com",
    "revolve.com",
    "fashionnova.com",
];

const MIN_LINE_CHARS: usize = 20;
const MAX_RATING_LINE_CHARS: usize = 40;

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Vec<ScrapedPage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScrapedPage {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub markdown: Option<String>,
}

fn date_line_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:reviewed|posted|written)\b.*?([A-Z][a-z]+\.?\s+\d{1,2},\s+\d{4})")
            .expect("valid regex")
    })
}

fn helpful_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+)\s+(?:people|persons?|users?|customers?)\s+found\s+this\s+helpful")
            .expect("valid regex")
    })
}

fn rating_line(line: &str) -> Option<RawRating> {
    if line.chars().count() > MAX_RATING_LINE_CHARS {
        return None;
    }
    let lower = line.to_lowercase();
    let looks_like_rating = line.contains('★')
        || lower.contains("star")
        || lower.contains("out of")
        || lower.starts_with("rating")
        || lower.starts_with("rated");
    if !looks_like_rating {
        return None;
    }
    parse_rating_text(line)
}

#[derive(Default)]
struct ReviewBlock {
    lines: Vec<String>,
    rating: Option<RawRating>,
    date: Option<chrono::NaiveDate>,
    verified: bool,
    helpful_votes: u32,
}

impl ReviewBlock {
    fn has_content(&self) -> bool {
        !self.lines.is_empty()
    }

    fn into_review(self, source_id: &str, page: &ScrapedPage) -> Option<RawReview> {
        let text = self.lines.join("\n");
        if text.chars().count() <= MIN_LINE_CHARS {
            return None;
        }

        let mut review = RawReview::new(source_id, text)
            .verified(self.verified)
            .with_helpful_votes(self.helpful_votes)
            .with_origin(page.title.clone().unwrap_or_else(|| "Firecrawl".to_string()));
        if let Some(rating) = self.rating {
            review = review.with_rating(rating);
        }
        if let Some(date) = self.date {
            review = review.with_timestamp(date);
        }
        if let Some(url) = &page.url {
            review = review.with_purchase_url(url.clone());
        }
        Some(review)
    }
}

/// Recovers individual reviews from a scraped page
///
/// A short rating line (`4.0 out of 5 stars`, `★★★★☆`) opens a new review,
/// as do headings and horizontal rules. Date, verified-purchase and
/// helpful-vote lines annotate the open review; other lines longer than 20
/// characters become its text.
pub fn parse_review_markdown(source_id: &str, page: &ScrapedPage) -> Vec<RawReview> {
    let Some(markdown) = page.markdown.as_deref() else {
        return Vec::new();
    };

    let mut reviews = Vec::new();
    let mut block = ReviewBlock::default();

    for raw_line in markdown.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rating) = rating_line(line) {
            if block.has_content() {
                reviews.extend(std::mem::take(&mut block).into_review(source_id, page));
            }
            block.rating = Some(rating);
            continue;
        }

        if line.starts_with('#') || line.starts_with("---") || line.starts_with("***") {
            if block.has_content() {
                reviews.extend(std::mem::take(&mut block).into_review(source_id, page));
            }
            continue;
        }

        if let Some(caps) = date_line_pattern().captures(line) {
            block.date = parse_review_date(&caps[1]);
            continue;
        }

        if let Some(caps) = helpful_pattern().captures(line) {
            block.helpful_votes = caps[1].parse().unwrap_or(0);
            continue;
        }

        let lower = line.to_lowercase();
        if lower.contains("verified purchase") || lower.contains("verified buyer") {
            block.verified = true;
            if line.chars().count() <= MAX_RATING_LINE_CHARS {
                continue;
            }
        }

        if line.starts_with("![") || line.starts_with("http") || is_link_only(line) {
            continue;
        }

        if line.chars().count() > MIN_LINE_CHARS {
            block.lines.push(line.to_string());
        }
    }

    if block.has_content() {
        reviews.extend(block.into_review(source_id, page));
    }
    reviews
}

fn is_link_only(line: &str) -> bool {
    line.starts_with('[') && line.ends_with(')') && line.contains("](")
}

/// Builds the site-restricted search query
pub fn search_query(query: &str, sites: &[String]) -> String {
    let filter = sites
        .iter()
        .map(|s| format!("site:{}", s))
        .collect::<Vec<_>>()
        .join(" OR ");
    if filter.is_empty() {
        format!("{} reviews", query)
    } else {
        format!("{} reviews {}", query, filter)
    }
}

/// Parses a Firecrawl search response into reviews
pub fn parse_search_response(
    source_id: &str,
    payload: serde_json::Value,
) -> Result<Vec<RawReview>, SourceError> {
    let response: SearchResponse = serde_json::from_value(payload)
        .map_err(|e| SourceError::ParseFailure(format!("firecrawl search: {}", e)))?;

    if !response.success {
        let message = response
            .error
            .unwrap_or_else(|| "search reported failure".to_string());
        return Err(classify_api_message(&message));
    }

    Ok(response
        .data
        .iter()
        .flat_map(|page| parse_review_markdown(source_id, page))
        .collect())
}

/// Review pages scraped from fashion retailers
#[derive(Clone)]
pub struct SiteScrapeAdapter {
    id: String,
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    sites: Vec<String>,
    page_limit: u32,
}

impl SiteScrapeAdapter {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            id: "firecrawl-scrape".to_string(),
            http,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            sites: DEFAULT_SITES.iter().map(|s| s.to_string()).collect(),
            page_limit: 5,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_sites(mut self, sites: Vec<String>) -> Self {
        self.sites = sites;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn fetch(&self, query: &Query) -> Result<Vec<RawReview>, SourceError> {
        let url = format!("{}/v1/search", self.base_url.trim_end_matches('/'));
        let body = json!({
            "query": search_query(query.as_str(), &self.sites),
            "limit": self.page_limit,
            "scrapeOptions": {
                "formats": ["markdown"],
                "onlyMainContent": true
            }
        });
        debug!(source = %self.id, "Searching retailer review pages");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let payload = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| classify_transport(&e))?;
        let reviews = parse_search_response(&self.id, payload)?;
        info!(source = %self.id, count = reviews.len(), "Parsed scraped reviews");
        Ok(reviews)
    }
}

impl std::fmt::Debug for SiteScrapeAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteScrapeAdapter")
            .field("id", &self.id)
            .field("base_url", &self.base_url)
            .field("sites", &self.sites)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
# Customer reviews

4.0 out of 5 stars
Reviewed in the United States on March 3, 2024
Verified Purchase
The fabric is soft and drapes beautifully, but it runs small in the bust.
I sized up and it was perfect.
12 people found this helpful

![photo](https://img/1.jpg)

★★☆☆☆
Colour faded after the second wash, very disappointed with the quality.
[Report](https://example.com/report)

---
Shipping was quick.
"#;

    fn page() -> ScrapedPage {
        ScrapedPage {
            url: Some("https://www.nordstrom.com/s/wrap-dress".into()),
            title: Some("Nordstrom".into()),
            markdown: Some(PAGE.into()),
        }
    }

    #[test]
    fn test_parse_review_markdown_splits_reviews() {
        let reviews = parse_review_markdown("firecrawl-scrape", &page());
        assert_eq!(reviews.len(), 2);

        let first = &reviews[0];
        assert!(first.text.contains("runs small in the bust"));
        assert!(first.text.contains("I sized up"));
        assert_eq!(first.rating.unwrap().canonical(), Some(4.0));
        assert!(first.verified);
        assert_eq!(first.helpful_votes, 12);
        assert_eq!(
            first.timestamp,
            chrono::NaiveDate::from_ymd_opt(2024, 3, 3)
        );
        assert_eq!(first.origin.as_deref(), Some("Nordstrom"));
        assert_eq!(
            first.purchase_url.as_deref(),
            Some("https://www.nordstrom.com/s/wrap-dress")
        );

        let second = &reviews[1];
        assert!(second.text.starts_with("Colour faded"));
        assert_eq!(second.rating.unwrap().canonical(), Some(2.0));
        assert!(!second.verified);
    }

    #[test]
    fn test_parse_review_markdown_empty_page() {
        let page = ScrapedPage::default();
        assert!(parse_review_markdown("s", &page).is_empty());
    }

    #[test]
    fn test_search_query_includes_sites() {
        let sites = vec!["asos.com".to_string(), "zappos.com".to_string()];
        assert_eq!(
            search_query("chelsea boots", &sites),
            "chelsea boots reviews site:asos.com OR site:zappos.com"
        );
    }

    #[test]
    fn test_parse_search_response_failure() {
        let payload = serde_json::json!({"success": false, "error": "Unauthorized: invalid token"});
        assert!(matches!(
            parse_search_response("s", payload),
            Err(SourceError::AuthInvalid(_))
        ));
    }

    #[test]
    fn test_parse_search_response_success() {
        let payload = serde_json::json!({
            "success": true,
            "data": [{"url": "https://asos.com/p", "title": "ASOS", "markdown": PAGE}]
        });
        let reviews = parse_search_response("firecrawl-scrape", payload).unwrap();
        assert_eq!(reviews.len(), 2);
        assert!(reviews.iter().all(|r| r.origin.as_deref() == Some("ASOS")));
    }
}
