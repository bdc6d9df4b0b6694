use crate::errors::Ck101Error;
use crate::session::Session;
use scraper::{Html, Selector};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const TITLE_DELIMITER: &str = " - ";
/// Attribute the forum uses for full resolution images, `src` holds the thumbnail.
const IMAGE_ATTRIBUTE: &str = "file";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub title: String,
    /// Image links in document order. Duplicates are kept.
    pub image_urls: Vec<String>,
}

impl Page {
    pub fn from_html(html_string: &str) -> Self {
        let html_document = Html::parse_document(html_string);
        let title_selector = Selector::parse("title").unwrap();
        let image_selector = Selector::parse(&format!("[{IMAGE_ATTRIBUTE}]")).unwrap();

        let title = html_document
            .select(&title_selector)
            .next()
            .map(|element| element.text().collect::<String>())
            .unwrap_or_default();

        let image_urls = html_document
            .select(&image_selector)
            .filter_map(|element| element.value().attr(IMAGE_ATTRIBUTE))
            .filter(|link| link.starts_with("http"))
            .map(|link| {
                tracing::debug!("Found image {}", link);
                link.to_string()
            })
            .collect::<Vec<_>>();

        Self {
            title: clean_title(&title),
            image_urls,
        }
    }
}

/// Keeps the part before the site suffix and makes it usable as a directory name.
fn clean_title(raw_title: &str) -> String {
    raw_title
        .split(TITLE_DELIMITER)
        .next()
        .unwrap_or("")
        .replace(['/', '\\'], "")
        .trim()
        .to_string()
}

#[derive(Debug, Clone)]
pub struct PageExtractor {
    session: Arc<Session>,
}

impl PageExtractor {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Fetches a thread page and extracts its title and image links.
    ///
    /// A page without images is not an error. The thread id shape is not checked here.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<Page, Ck101Error> {
        if url.is_empty() || !url.starts_with("http") {
            return Err(Ck101Error::InvalidInput(url.to_string()));
        }

        let html = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Ck101Error::Cancelled),
            res = self.get_markup(url) => res?,
        };

        Ok(Page::from_html(&html))
    }

    async fn get_markup(&self, url: &str) -> Result<String, Ck101Error> {
        if let Err(e) = self.session.authenticate().await {
            tracing::warn!("Fetching {} without login. {}", url, e);
        }

        let response = match self.session.client().get(url).send().await {
            Err(e) => {
                tracing::error!("Error fetching page {}\nError : {}", url, e);
                return Err(Ck101Error::Fetch {
                    url: url.to_string(),
                    message: e.to_string(),
                });
            }
            Ok(r) => {
                if !r.status().is_success() {
                    tracing::error!("Error status code received : {} |{}|", r.status(), url);
                    return Err(Ck101Error::ErrorStatusCode {
                        status_code: r.status().to_string(),
                        url: url.to_string(),
                    });
                }
                r
            }
        };

        response.text().await.map_err(|e| {
            tracing::error!("Error reading page body {}\nError : {}", url, e);
            Ck101Error::Fetch {
                url: url.to_string(),
                message: e.to_string(),
            }
        })
    }
}
