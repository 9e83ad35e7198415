// Headless Chromium backend - browser port
//
// Each call launches its own browser, drives one page and closes it
// before returning, on success and on error alike.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::downloader::errors::DownloadError;
use crate::downloader::models::PageMedia;
use crate::downloader::pool::WorkerPool;
use crate::downloader::tools::{ToolManager, ToolType};
use crate::downloader::traits::BrowserPort;

const SCROLL_ROUNDS: usize = 3;
const SCROLL_STEP_PX: u32 = 300;
const SCROLL_PAUSE: Duration = Duration::from_millis(1500);
const POLL_INTERVAL: Duration = Duration::from_millis(500);

const SCRAPE_SCRIPT: &str = r#"(() => {
    const article = document.querySelector('article');
    const scope = article || document;
    const textNode = scope.querySelector('div[data-testid="tweetText"]');
    const images = Array.from(scope.querySelectorAll('img'))
        .map(img => img.src)
        .filter(src => src && src.includes('twimg.com/media'));
    const videos = Array.from(scope.querySelectorAll('video, video source'))
        .map(v => v.src || v.getAttribute('src'))
        .filter(Boolean);
    return JSON.stringify({ text: textNode ? textNode.innerText : null, images, videos });
})()"#;

#[derive(Debug, Default, Deserialize)]
struct RawScrape {
    text: Option<String>,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    videos: Vec<String>,
}

pub struct ChromiumBackend {
    executable: Option<PathBuf>,
    headless: bool,
    proxy: Option<String>,
    page_load_timeout: Duration,
    script_timeout: Duration,
    pool: WorkerPool,
}

impl ChromiumBackend {
    pub fn new(config: &PipelineConfig, tools: &ToolManager, pool: WorkerPool) -> Self {
        Self {
            executable: tools.locate(ToolType::Chromium),
            headless: config.headless,
            proxy: config.proxy.clone(),
            page_load_timeout: config.timeouts.page_load(),
            script_timeout: config.timeouts.script(),
            pool,
        }
    }

    fn browser_config(&self) -> Result<BrowserConfig, DownloadError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(self.page_load_timeout);

        if let Some(executable) = &self.executable {
            builder = builder.chrome_executable(executable);
        }
        if !self.headless {
            builder = builder.with_head();
        }

        let mut args = vec![
            "--disable-gpu".to_string(),
            "--mute-audio".to_string(),
            "--no-first-run".to_string(),
            "--disable-features=AutomationControlled".to_string(),
        ];
        if let Some(proxy) = &self.proxy {
            args.push(format!("--proxy-server={proxy}"));
        }
        builder = builder.args(args);

        builder.build().map_err(DownloadError::CapabilityUnavailable)
    }

    async fn scrape(&self, browser: &Browser, url: &str) -> Result<PageMedia, DownloadError> {
        let page = timeout(self.page_load_timeout, browser.new_page(url))
            .await
            .map_err(|_| DownloadError::NetworkTimeout(format!("page load timed out: {url}")))?
            .map_err(|e| DownloadError::Failed(format!("failed to open page: {e}")))?;

        self.wait_for_article(&page, url).await?;

        for _ in 0..SCROLL_ROUNDS {
            let js = format!("window.scrollBy(0, {SCROLL_STEP_PX})");
            if let Err(err) = page.evaluate(js.as_str()).await {
                debug!(error = %err, "Scroll failed");
            }
            sleep(SCROLL_PAUSE).await;
        }

        let raw: String = timeout(self.script_timeout, page.evaluate(SCRAPE_SCRIPT))
            .await
            .map_err(|_| DownloadError::NetworkTimeout("scrape script timed out".to_string()))?
            .map_err(|e| DownloadError::Failed(format!("failed to evaluate scrape script: {e}")))?
            .into_value()
            .map_err(|e| DownloadError::Failed(format!("unexpected scrape result: {e}")))?;

        let parsed: RawScrape = serde_json::from_str(&raw)
            .map_err(|e| DownloadError::Failed(format!("invalid scrape JSON: {e}")))?;
        Ok(normalize_scrape(parsed))
    }

    async fn wait_for_article(&self, page: &Page, url: &str) -> Result<(), DownloadError> {
        let deadline = Instant::now() + self.page_load_timeout;
        loop {
            if page.find_element("article").await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DownloadError::NetworkTimeout(format!(
                    "no post rendered within {}s: {url}",
                    self.page_load_timeout.as_secs()
                )));
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl BrowserPort for ChromiumBackend {
    fn name(&self) -> &'static str {
        "chromium"
    }

    async fn render_and_scrape(&self, url: &str) -> Result<PageMedia, DownloadError> {
        let _slot = self.pool.slot().await?;
        let config = self.browser_config()?;

        info!(url, headless = self.headless, "Launching Chromium instance");
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DownloadError::CapabilityUnavailable(format!("failed to launch browser: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "Chromium handler reported error");
                }
            }
        });

        let result = self.scrape(&browser, url).await;

        if let Err(err) = browser.close().await {
            warn!(error = %err, "Failed to close browser gracefully");
        }
        if let Err(err) = handler_task.await {
            warn!(error = %err, "Browser handler join error");
        }

        result
    }
}

/// `https://pbs.twimg.com/media/ID?format=jpg&name=small` becomes
/// `https://pbs.twimg.com/media/ID?format=jpg&name=orig`.
pub fn normalize_image_url(src: &str) -> String {
    let (base, query) = src.split_once('?').unwrap_or((src, ""));
    let format = query
        .split('&')
        .find_map(|pair| pair.strip_prefix("format="))
        .filter(|f| !f.is_empty());
    match format {
        Some(format) => format!("{base}?format={format}&name=orig"),
        None => format!("{base}?name=orig"),
    }
}

fn push_unique(out: &mut Vec<String>, value: String) {
    if !out.contains(&value) {
        out.push(value);
    }
}

fn normalize_scrape(raw: RawScrape) -> PageMedia {
    let mut images = Vec::new();
    for src in raw.images {
        push_unique(&mut images, normalize_image_url(&src));
    }
    let mut videos = Vec::new();
    for src in raw.videos.into_iter().filter(|s| !s.trim().is_empty()) {
        push_unique(&mut videos, src);
    }
    PageMedia {
        text: raw.text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        images,
        videos,
    }
}
