//! Shopping search adapter backed by SerpAPI
//!
//! Two requests per run: a `google_shopping` search to find the listing that
//! best matches the query, then a `google_product` lookup for that listing's
//! reviews. The response parsing is kept in pure functions so it can be
//! tested against recorded payloads.

use super::text::{
    classify_api_message, classify_status, classify_transport, parse_review_date, rating_from_json,
};
use super::SourceError;
use crate::review::{Query, RawReview};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "https://serpapi.com";
const ORIGIN: &str = "Google Shopping";
const MIN_CONTENT_CHARS: usize = 10;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShoppingListing {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub product_link: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub rating: Option<Value>,
    #[serde(default)]
    pub reviews: Option<Value>,
}

impl ShoppingListing {
    /// Canonical Google Shopping URL when the product id is known
    pub fn purchase_url(&self) -> Option<String> {
        match &self.product_id {
            Some(id) if !id.is_empty() => Some(format!(
                "https://www.google.com/shopping/product/{}?hl=en&gl=us",
                id
            )),
            _ => self.product_link.clone().or_else(|| self.link.clone()),
        }
    }

    fn review_count(&self) -> f64 {
        self.reviews.as_ref().and_then(Value::as_f64).unwrap_or(0.0)
    }

    fn rating_value(&self) -> f64 {
        self.rating.as_ref().and_then(Value::as_f64).unwrap_or(0.0)
    }
}

#[derive(Debug, Deserialize)]
struct ShoppingSearchResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    shopping_results: Vec<ShoppingListing>,
}

#[derive(Debug, Deserialize)]
struct ProductResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    product_results: Option<ProductResults>,
    #[serde(default)]
    reviews_results: Option<ReviewsResults>,
}

#[derive(Debug, Default, Deserialize)]
struct ProductResults {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    media: Vec<ProductMedia>,
}

#[derive(Debug, Deserialize)]
struct ProductMedia {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReviewsResults {
    #[serde(default)]
    reviews: Vec<ProductReview>,
}

#[derive(Debug, Deserialize)]
struct ProductReview {
    #[serde(default)]
    content: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    rating: Option<Value>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    helpful_votes: Option<u32>,
}

/// Scores shopping listings against the query and returns the best one
///
/// Word overlap with the title counts double, an exact phrase match adds 5,
/// review volume and rating add up to 3 and 2 points, and listings missing a
/// `pro`/`max` qualifier present in the query lose 3. Falls back to the first
/// listing when nothing scores above zero.
pub fn select_best_listing<'a>(
    query: &str,
    listings: &'a [ShoppingListing],
) -> Option<&'a ShoppingListing> {
    let query_lower = query.to_lowercase();
    let terms: Vec<&str> = query_lower.split_whitespace().collect();

    let mut best: Option<(&ShoppingListing, f64)> = None;
    for listing in listings {
        let title = listing.title.to_lowercase();
        let title_words: Vec<&str> = title.split_whitespace().collect();

        let mut score = terms.iter().filter(|t| title_words.contains(t)).count() as f64 * 2.0;
        if title.contains(&query_lower) {
            score += 5.0;
        }
        let reviews = listing.review_count();
        if reviews > 0.0 {
            score += (reviews / 100.0).min(3.0);
        }
        let rating = listing.rating_value();
        if rating > 0.0 {
            score += (rating / 2.0).min(2.0);
        }
        let qualifier_missing = ["pro", "max"]
            .iter()
            .any(|q| terms.contains(q) && !title_words.contains(q));
        if qualifier_missing {
            score -= 3.0;
        }

        if score > 0.0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((listing, score));
        }
    }

    best.map(|(listing, _)| listing).or_else(|| listings.first())
}

/// Broader query used when the exact search finds nothing
pub fn broaden_query(query: &str) -> String {
    query
        .split_whitespace()
        .filter(|w| !matches!(w.to_lowercase().as_str(), "pro" | "max"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses a `google_shopping` response into its listings
pub fn parse_search_results(payload: &Value) -> Result<Vec<ShoppingListing>, SourceError> {
    let response: ShoppingSearchResponse = serde_json::from_value(payload.clone())
        .map_err(|e| SourceError::ParseFailure(format!("shopping results: {}", e)))?;

    match response.error {
        Some(message) if is_empty_result_message(&message) => Ok(Vec::new()),
        Some(message) => Err(classify_api_message(&message)),
        None => Ok(response.shopping_results),
    }
}

/// Parses a `google_product` response into raw reviews for `listing`
pub fn parse_product_reviews(
    source_id: &str,
    listing: &ShoppingListing,
    payload: &Value,
) -> Result<Vec<RawReview>, SourceError> {
    let response: ProductResponse = serde_json::from_value(payload.clone())
        .map_err(|e| SourceError::ParseFailure(format!("product reviews: {}", e)))?;

    if let Some(message) = response.error {
        if is_empty_result_message(&message) {
            return Ok(Vec::new());
        }
        return Err(classify_api_message(&message));
    }

    let product = response.product_results.unwrap_or_default();
    let image = product
        .media
        .iter()
        .find(|m| m.kind.as_deref().map_or(true, |k| k == "image"))
        .and_then(|m| m.link.clone())
        .or_else(|| listing.thumbnail.clone());
    let purchase_url = listing.purchase_url();

    if let Some(title) = &product.title {
        debug!(product = %title, "Parsing product reviews");
    }

    let reviews = response
        .reviews_results
        .unwrap_or_default()
        .reviews
        .into_iter()
        .filter(|r| r.content.trim().chars().count() >= MIN_CONTENT_CHARS)
        .map(|r| {
            let text = match r.title.as_deref().map(str::trim) {
                Some(title) if !title.is_empty() => format!("{}\n{}", title, r.content.trim()),
                _ => r.content.trim().to_string(),
            };

            let mut review = RawReview::new(source_id, text)
                .with_origin(r.source.unwrap_or_else(|| ORIGIN.to_string()))
                .verified(true)
                .with_helpful_votes(r.helpful_votes.unwrap_or(0));
            if let Some(rating) = r.rating.as_ref().and_then(rating_from_json) {
                review = review.with_rating(rating);
            }
            if let Some(date) = r.date.as_deref().and_then(parse_review_date) {
                review = review.with_timestamp(date);
            }
            if let Some(author) = r.author {
                review = review.with_author(author);
            }
            if let Some(url) = &image {
                review = review.with_product_image_url(url.clone());
            }
            if let Some(url) = &purchase_url {
                review = review.with_purchase_url(url.clone());
            }
            review
        })
        .collect();

    Ok(reviews)
}

fn is_empty_result_message(message: &str) -> bool {
    message.to_lowercase().contains("hasn't returned any results")
}

/// Retail shopping search via SerpAPI
#[derive(Clone)]
pub struct ShoppingSearchAdapter {
    id: String,
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ShoppingSearchAdapter {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            id: "serpapi-shopping".to_string(),
            http,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn fetch(&self, query: &Query) -> Result<Vec<RawReview>, SourceError> {
        let mut listings = self.search(query.as_str()).await?;
        if listings.is_empty() {
            let broader = broaden_query(query.as_str());
            if !broader.is_empty() && broader != query.as_str() {
                debug!(query = %broader, "No listings found, retrying with broader query");
                listings = self.search(&broader).await?;
            }
        }

        let Some(listing) = select_best_listing(query.as_str(), &listings) else {
            info!(source = %self.id, "No shopping listings matched the query");
            return Ok(Vec::new());
        };
        info!(source = %self.id, product = %listing.title, "Selected product listing");

        let Some(product_id) = listing.product_id.as_deref().filter(|id| !id.is_empty()) else {
            debug!(source = %self.id, "Listing has no product id, no reviews to fetch");
            return Ok(Vec::new());
        };

        let payload = self
            .get(&[
                ("engine", "google_product"),
                ("product_id", product_id),
                ("reviews", "1"),
                ("gl", "us"),
                ("hl", "en"),
            ])
            .await?;
        parse_product_reviews(&self.id, listing, &payload)
    }

    async fn search(&self, q: &str) -> Result<Vec<ShoppingListing>, SourceError> {
        let payload = self
            .get(&[
                ("engine", "google_shopping"),
                ("q", q),
                ("gl", "us"),
                ("hl", "en"),
                ("num", "40"),
            ])
            .await?;
        parse_search_results(&payload)
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<Value, SourceError> {
        let url = format!("{}/search.json", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .query(params)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        response.json::<Value>().await.map_err(|e| classify_transport(&e))
    }
}

impl std::fmt::Debug for ShoppingSearchAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShoppingSearchAdapter")
            .field("id", &self.id)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}
