//! El País opinion section scraper.
//!
//! Article URLs on the site look like
//! `https://elpais.com/opinion/2025-05-06/article-slug.html`; section and
//! columnist index pages end in a slash and are never treated as articles.

use crate::browser::BrowserSession;
use crate::config::RunConfiguration;
use crate::error::{BrowserError, PipelineError};
use crate::images::{ImageSink, destination_for};
use crate::models::ArticleRecord;
use crate::utils::truncate_for_log;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Present on the listing once the article cards have rendered.
pub const LISTING_SELECTOR: &str = "article";

/// Waited for on every article page.
pub const HEADLINE_SELECTOR: &str = "h1";

const TITLE_SELECTORS: &[&str] = &["h1", ".article-title", ".headline", "[class*='title']"];

const BODY_SELECTORS: &[&str] = &[
    ".article-text p",
    ".article-body p",
    "[data-dtm-region='articulo_cuerpo'] p",
    "article p",
    "p",
];

const IMAGE_SELECTORS: &[&str] = &[
    "article figure img",
    "article img",
    ".article-image img",
    ".main-image img",
    "[class*='image'] img",
];

/// Paragraphs kept from an article body.
const MAX_BODY_PARAGRAPHS: usize = 10;

/// A `/2025-05-06/` or `/2025/` date segment.
static DATE_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(19|20)\d{2}(-\d{2}-\d{2})?/").expect("static regex"));

/// Scrape up to `config.max_articles` articles from the section listing.
///
/// Records come back in listing order. A navigation failure aborts the
/// extraction; an article without a headline is skipped.
#[instrument(level = "info", skip_all, fields(section = %config.section_url, max = config.max_articles))]
pub async fn extract<S, I>(
    session: &mut S,
    config: &RunConfiguration,
    images: &I,
) -> Result<Vec<ArticleRecord>, PipelineError>
where
    S: BrowserSession,
    I: ImageSink,
{
    if config.max_articles == 0 {
        info!("max_articles is 0; nothing to scrape");
        return Ok(Vec::new());
    }
    let urls = index_articles(session, config).await?;
    fetch_articles(session, urls, config.timeout, images).await
}

/// Open the section listing and collect the first article URLs.
#[instrument(level = "info", skip_all, fields(section = %config.section_url))]
pub async fn index_articles<S>(
    session: &mut S,
    config: &RunConfiguration,
) -> Result<Vec<String>, PipelineError>
where
    S: BrowserSession,
{
    let section_url = config.section_url.as_str();
    let base = Url::parse(section_url).map_err(|e| PipelineError::Navigation {
        url: section_url.to_string(),
        reason: e.to_string(),
    })?;

    session
        .navigate(section_url)
        .await
        .map_err(|e| PipelineError::navigation(section_url, e))?;
    session
        .wait_for(LISTING_SELECTOR, config.timeout)
        .await
        .map_err(|e| PipelineError::navigation(section_url, e))?;

    check_language(session).await;

    let mut hrefs = Vec::new();
    for element in session
        .find_elements("a[href]")
        .await
        .map_err(|e| PipelineError::navigation(section_url, e))?
    {
        if let Ok(Some(href)) = session.attribute(&element, "href").await {
            hrefs.push(href);
        }
    }
    debug!(links = hrefs.len(), "Links on listing page");

    let mut article_urls = select_article_links(&base, &hrefs, config.max_articles);

    if article_urls.is_empty() {
        warn!("No article links matched; falling back to links inside article cards");
        let mut card_hrefs = Vec::new();
        for element in session
            .find_elements("article a[href]")
            .await
            .map_err(|e| PipelineError::navigation(section_url, e))?
        {
            if let Ok(Some(href)) = session.attribute(&element, "href").await {
                card_hrefs.push(href);
            }
        }
        article_urls = select_card_links(&base, &card_hrefs, config.max_articles);
    }

    info!(count = article_urls.len(), "Indexed opinion article URLs");
    debug!(urls = ?article_urls, "Opinion URLs");
    Ok(article_urls)
}

/// Open each article in turn and build its record.
///
/// `ParseError`s are logged and the article skipped; the first
/// `NavigationError` is returned.
#[instrument(level = "info", skip_all, fields(count = urls.len()))]
pub async fn fetch_articles<S, I>(
    session: &mut S,
    urls: Vec<String>,
    timeout: Duration,
    images: &I,
) -> Result<Vec<ArticleRecord>, PipelineError>
where
    S: BrowserSession,
    I: ImageSink,
{
    let mut records = Vec::with_capacity(urls.len());
    let mut seen_titles = HashSet::new();

    for (i, url) in urls.iter().enumerate() {
        let id = i + 1;
        let mut record = match fetch_article(session, id, url, timeout).await {
            Ok(record) => record,
            Err(e @ PipelineError::Parse { .. }) => {
                warn!(%url, error = %e, "Skipping article");
                continue;
            }
            Err(e) => return Err(e),
        };

        if !seen_titles.insert(record.title.clone()) {
            warn!(%url, title = %record.title, "Duplicate headline; skipping article");
            continue;
        }

        if let Some(image_url) = record.image_url.clone() {
            match images.save(&image_url, &destination_for(id, &record.title)).await {
                Ok(path) => record.image_path = path,
                Err(e) => warn!(%url, %image_url, error = %e, "Cover image download failed"),
            }
        }

        records.push(record);
    }

    info!(count = records.len(), "Fetched opinion articles");
    Ok(records)
}

/// Scrape a single article page.
#[instrument(level = "info", skip_all, fields(%url))]
async fn fetch_article<S>(
    session: &mut S,
    id: usize,
    url: &str,
    timeout: Duration,
) -> Result<ArticleRecord, PipelineError>
where
    S: BrowserSession,
{
    session
        .navigate(url)
        .await
        .map_err(|e| PipelineError::navigation(url, e))?;

    if let Err(e) = session.wait_for(HEADLINE_SELECTOR, timeout).await {
        debug!(error = %e, "Headline element not found; trying other title selectors");
    }

    let title = first_text(session, TITLE_SELECTORS)
        .await
        .ok_or_else(|| PipelineError::Parse {
            url: url.to_string(),
            reason: "no headline found".to_string(),
        })?;

    let mut record = ArticleRecord::new(id, url, title);
    record.body = body_text(session).await;
    record.image_url = cover_image(session, url).await;

    info!(
        title = %truncate_for_log(&record.title, 50),
        body_chars = record.body.chars().count(),
        image = record.image_url.is_some(),
        "Parsed article"
    );
    Ok(record)
}

/// Text of the first element matching one of `selectors` that has any.
async fn first_text<S: BrowserSession>(session: &mut S, selectors: &[&str]) -> Option<String> {
    for selector in selectors {
        let Some(element) = lookup(session, selector).await.into_iter().next() else {
            continue;
        };
        match session.text(&element).await {
            Ok(text) if !text.trim().is_empty() => return Some(text.trim().to_string()),
            Ok(_) => {}
            Err(e) => debug!(selector, error = %e, "Could not read element text"),
        }
    }
    None
}

async fn body_text<S: BrowserSession>(session: &mut S) -> String {
    for selector in BODY_SELECTORS {
        let mut paragraphs = Vec::new();
        for element in lookup(session, selector).await {
            if let Ok(text) = session.text(&element).await {
                let text = text.trim();
                if !text.is_empty() {
                    paragraphs.push(text.to_string());
                }
            }
        }
        if !paragraphs.is_empty() {
            return paragraphs
                .into_iter()
                .take(MAX_BODY_PARAGRAPHS)
                .join(" ");
        }
    }
    String::new()
}

async fn cover_image<S: BrowserSession>(session: &mut S, page_url: &str) -> Option<String> {
    let base = Url::parse(page_url).ok()?;
    for selector in IMAGE_SELECTORS {
        let Some(element) = lookup(session, selector).await.into_iter().next() else {
            continue;
        };
        for attr in ["src", "data-src"] {
            if let Ok(Some(src)) = session.attribute(&element, attr).await {
                let src = src.trim();
                if src.is_empty() || src.starts_with("data:") {
                    continue;
                }
                if let Ok(resolved) = base.join(src) {
                    return Some(resolved.to_string());
                }
            }
        }
    }
    None
}

/// Elements for an optional selector; lookup failures count as "absent".
async fn lookup<S: BrowserSession>(session: &mut S, selector: &str) -> Vec<S::Element> {
    session
        .find_elements(selector)
        .await
        .unwrap_or_else(|e: BrowserError| {
            debug!(selector, error = %e, "Element lookup failed");
            Vec::new()
        })
}

/// Warn when the listing is not served in Spanish.
async fn check_language<S: BrowserSession>(session: &mut S) {
    let Some(html) = lookup(session, "html").await.into_iter().next() else {
        return;
    };
    match session.attribute(&html, "lang").await {
        Ok(Some(lang)) if lang.to_lowercase().starts_with("es") => {
            debug!(%lang, "Page language");
        }
        Ok(lang) => warn!(lang = ?lang, "Page may not be in Spanish"),
        Err(e) => debug!(error = %e, "Could not read page language"),
    }
}

/// Resolve `href` against `base`, dropping the fragment.
fn resolve(base: &Url, href: &str) -> Option<Url> {
    let mut url = base.join(href.trim()).ok()?;
    url.set_fragment(None);
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn same_site(url: &Url, base: &Url) -> bool {
    match (url.host_str(), base.host_str()) {
        (Some(host), Some(site)) => host == site || host.ends_with(&format!(".{site}")),
        _ => false,
    }
}

/// Whether `url` points at an article of the section rooted at `base`.
pub fn is_article_url(url: &Url, base: &Url) -> bool {
    if !same_site(url, base) {
        return false;
    }
    let path = url.path();
    // Section and columnist index pages.
    if path.ends_with('/') {
        return false;
    }
    if path.contains("/articulo/") {
        return true;
    }
    let section = base.path();
    if section.len() <= 1 || !path.starts_with(section) {
        return false;
    }
    let depth = path.split('/').filter(|s| !s.is_empty()).count();
    DATE_SEGMENT.is_match(path) || depth >= 3
}

/// Article URLs among listing links, de-duplicated in document order.
pub fn select_article_links(base: &Url, hrefs: &[String], max: usize) -> Vec<String> {
    hrefs
        .iter()
        .filter_map(|href| resolve(base, href))
        .filter(|url| is_article_url(url, base))
        .map(String::from)
        .unique()
        .take(max)
        .collect()
}

/// Looser pass used when nothing matched: any on-site page linked from an
/// article card.
pub fn select_card_links(base: &Url, hrefs: &[String], max: usize) -> Vec<String> {
    hrefs
        .iter()
        .filter_map(|href| resolve(base, href))
        .filter(|url| same_site(url, base) && url.path() != base.path())
        .map(String::from)
        .unique()
        .take(max)
        .collect()
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::browser::fixture::FixtureSession;
    use crate::error::ImageError;
    use crate::images::DiscardImages;
    use std::path::PathBuf;
    use std::sync::Mutex;

    pub const SECTION: &str = "https://elpais.com/opinion/";

    pub fn listing(hrefs: &[&str]) -> String {
        let cards: String = hrefs
            .iter()
            .map(|h| format!(r#"<article><h2><a href="{h}">Titular</a></h2></article>"#))
            .collect();
        format!(
            r#"<html lang="es-ES"><body>
            <nav><a href="/opinion/">Opinión</a><a href="/opinion/editoriales/">Editoriales</a></nav>
            {cards}
            </body></html>"#
        )
    }

    pub fn article_page(title: &str, paragraphs: &[&str], image: Option<&str>) -> String {
        let body: String = paragraphs.iter().map(|p| format!("<p>{p}</p>")).collect();
        let figure = image
            .map(|src| format!(r#"<figure><img src="{src}" alt=""></figure>"#))
            .unwrap_or_default();
        format!(
            r#"<html lang="es"><body><article>
            <header><h1>{title}</h1></header>{figure}
            <div class="article-body">{body}</div>
            </article></body></html>"#
        )
    }

    pub fn config(max_articles: usize) -> RunConfiguration {
        RunConfiguration {
            max_articles,
            timeout: Duration::from_millis(50),
            image_dir: None,
            ..RunConfiguration::default()
        }
    }

    /// Five articles plus repeated and non-article links on the listing.
    pub fn site() -> FixtureSession {
        let a1 = article_page(
            "La economía y la crisis",
            &["Primer párrafo.", "Segundo párrafo."],
            Some("https://imagenes.elpais.com/a1.jpg"),
        );
        let a2 = article_page("Una nueva crisis", &["Texto."], Some("/img/a2.jpg"));
        let a3 = article_page("La política de la economía", &[], None);
        let a4 = article_page("Tribuna sobre Europa", &["Europa."], None);
        let a5 = article_page("Carta al director", &["Carta."], None);
        let listing = listing(&[
            "https://elpais.com/opinion/2025-05-06/economia-y-crisis.html",
            "/opinion/2025-05-06/nueva-crisis.html",
            "https://elpais.com/opinion/2025-05-06/economia-y-crisis.html#comentarios",
            "https://elpais.com/opinion/tribunas/",
            "https://elpais.com/opinion/2025-05-05/politica-economia.html",
            "https://elpais.com/noticias/espana/",
            "https://elpais.com/opinion/2025-05-05/tribuna-europa.html",
            "https://twitter.com/el_pais",
            "https://elpais.com/opinion/2025-05-04/carta.html",
        ]);
        let pages = vec![
            (SECTION.to_string(), listing),
            (
                "https://elpais.com/opinion/2025-05-06/economia-y-crisis.html".to_string(),
                a1,
            ),
            (
                "https://elpais.com/opinion/2025-05-06/nueva-crisis.html".to_string(),
                a2,
            ),
            (
                "https://elpais.com/opinion/2025-05-05/politica-economia.html".to_string(),
                a3,
            ),
            (
                "https://elpais.com/opinion/2025-05-05/tribuna-europa.html".to_string(),
                a4,
            ),
            (
                "https://elpais.com/opinion/2025-05-04/carta.html".to_string(),
                a5,
            ),
        ];
        let refs: Vec<(&str, &str)> = pages
            .iter()
            .map(|(u, h)| (u.as_str(), h.as_str()))
            .collect();
        FixtureSession::new(&refs)
    }

    #[derive(Default)]
    struct RecordingSink {
        saved: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl ImageSink for RecordingSink {
        async fn save(&self, url: &str, destination: &str) -> Result<Option<PathBuf>, ImageError> {
            self.saved
                .lock()
                .unwrap()
                .push((url.to_string(), destination.to_string()));
            if self.fail {
                return Err(ImageError::Status(404));
            }
            Ok(Some(PathBuf::from(format!("/tmp/{destination}.jpg"))))
        }
    }

    #[tokio::test]
    async fn test_extract_in_listing_order() {
        let mut session = site();
        let records = extract(&mut session, &config(5), &DiscardImages).await.unwrap();

        let titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "La economía y la crisis",
                "Una nueva crisis",
                "La política de la economía",
                "Tribuna sobre Europa",
                "Carta al director",
            ]
        );
        assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert_eq!(records[0].body, "Primer párrafo. Segundo párrafo.");
        assert_eq!(records[2].body, "");
        assert!(records.iter().all(|r| r.translated_title.is_none()));
    }

    #[tokio::test]
    async fn test_extract_respects_max_articles() {
        for max in 0..=7 {
            let mut session = site();
            let records = extract(&mut session, &config(max), &DiscardImages).await.unwrap();
            assert!(records.len() <= max);
            assert_eq!(records.len(), max.min(5));
        }
    }

    #[tokio::test]
    async fn test_zero_articles_does_not_navigate() {
        let mut session = site();
        let records = extract(&mut session, &config(0), &DiscardImages).await.unwrap();
        assert!(records.is_empty());
        assert_eq!(
            session.log.navigations.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[tokio::test]
    async fn test_unreachable_listing_is_navigation_error() {
        let mut session = FixtureSession::new(&[]);
        let err = extract(&mut session, &config(5), &DiscardImages).await.unwrap_err();
        assert!(matches!(err, PipelineError::Navigation { .. }));
    }

    #[tokio::test]
    async fn test_listing_without_cards_is_navigation_error() {
        let mut session = FixtureSession::new(&[(SECTION, "<html><body><p>Cargando…</p></body></html>")]);
        let err = extract(&mut session, &config(5), &DiscardImages).await.unwrap_err();
        match err {
            PipelineError::Navigation { url, reason } => {
                assert_eq!(url, SECTION);
                assert!(reason.contains("`article`"));
            }
            other => panic!("expected navigation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_title_skips_only_that_article() {
        let listing = listing(&[
            "/opinion/2025-05-06/sin-titulo.html",
            "/opinion/2025-05-06/con-titulo.html",
        ]);
        let untitled = r#"<html><body><article><p>Solo texto.</p></article></body></html>"#;
        let titled = article_page("Con titular", &["Cuerpo."], None);
        let mut session = FixtureSession::new(&[
            (SECTION, listing.as_str()),
            ("https://elpais.com/opinion/2025-05-06/sin-titulo.html", untitled),
            ("https://elpais.com/opinion/2025-05-06/con-titulo.html", titled.as_str()),
        ]);
        let records = extract(&mut session, &config(5), &DiscardImages).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Con titular");
        assert_eq!(records[0].id, 2);
    }

    #[tokio::test]
    async fn test_unreachable_article_aborts_extraction() {
        let listing = listing(&["/opinion/2025-05-06/caida.html"]);
        let mut session = FixtureSession::new(&[(SECTION, listing.as_str())]);
        let err = extract(&mut session, &config(5), &DiscardImages).await.unwrap_err();
        assert!(matches!(err, PipelineError::Navigation { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_titles_are_dropped() {
        let listing = listing(&[
            "/opinion/2025-05-06/uno.html",
            "/opinion/2025-05-06/dos.html",
        ]);
        let page = article_page("El mismo titular", &["Texto."], None);
        let mut session = FixtureSession::new(&[
            (SECTION, listing.as_str()),
            ("https://elpais.com/opinion/2025-05-06/uno.html", page.as_str()),
            ("https://elpais.com/opinion/2025-05-06/dos.html", page.as_str()),
        ]);
        let records = extract(&mut session, &config(5), &DiscardImages).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_cover_images_resolved_and_saved() {
        let mut session = site();
        let sink = RecordingSink::default();
        let records = extract(&mut session, &config(3), &sink).await.unwrap();

        assert_eq!(
            records[0].image_url.as_deref(),
            Some("https://imagenes.elpais.com/a1.jpg")
        );
        assert_eq!(
            records[1].image_url.as_deref(),
            Some("https://elpais.com/img/a2.jpg")
        );
        assert_eq!(records[2].image_url, None);
        assert_eq!(
            records[0].image_path,
            Some(PathBuf::from("/tmp/article_1_la-economía-y-la-crisis.jpg"))
        );

        let saved = sink.saved.lock().unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[1].1, "article_2_una-nueva-crisis");
    }

    #[tokio::test]
    async fn test_failed_image_download_keeps_record() {
        let mut session = site();
        let sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };
        let records = extract(&mut session, &config(2), &sink).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].image_url.is_some());
        assert!(records[0].image_path.is_none());
    }

    #[tokio::test]
    async fn test_fallback_to_card_links() {
        let listing = r#"<html lang="es"><body>
            <article><a href="/opinion/editoriales-del-dia">Editorial</a></article>
            <article><a href="https://elpais.com/opinion/">Opinión</a></article>
            </body></html>"#;
        let page = article_page("Editorial del día", &[], None);
        let mut session = FixtureSession::new(&[
            (SECTION, listing),
            ("https://elpais.com/opinion/editoriales-del-dia", page.as_str()),
        ]);
        let records = extract(&mut session, &config(5), &DiscardImages).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Editorial del día");
    }

    #[test]
    fn test_is_article_url() {
        let base = Url::parse(SECTION).unwrap();
        let check = |u: &str| is_article_url(&Url::parse(u).unwrap(), &base);

        assert!(check("https://elpais.com/opinion/2025-05-06/la-crisis.html"));
        assert!(check("https://elpais.com/opinion/2024/01/02/articulo.html"));
        assert!(check("https://elpais.com/opinion/columnas/firma/texto.html"));
        assert!(check("https://elpais.com/diario/articulo/opinion/2001/texto"));
        assert!(!check("https://elpais.com/opinion/"));
        assert!(!check("https://elpais.com/opinion/tribunas/"));
        assert!(!check("https://elpais.com/opinion/editoriales"));
        assert!(!check("https://elpais.com/espana/2025-05-06/noticia.html"));
        assert!(!check("https://elmundo.es/opinion/2025-05-06/otra.html"));
    }

    #[test]
    fn test_select_article_links_dedupes_and_caps() {
        let base = Url::parse(SECTION).unwrap();
        let hrefs: Vec<String> = [
            "/opinion/2025-05-06/a.html",
            "/opinion/2025-05-06/a.html#comments",
            "mailto:cartas@elpais.com",
            "/opinion/2025-05-06/b.html",
            "/opinion/2025-05-06/c.html",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(
            select_article_links(&base, &hrefs, 2),
            vec![
                "https://elpais.com/opinion/2025-05-06/a.html",
                "https://elpais.com/opinion/2025-05-06/b.html",
            ]
        );
    }
}
