//! chromiumoxide による `PageClient` 実装

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::extract::{FetchMode, Field, Locator, Scope};
use crate::traits::{PageClient, PickerMode};

use super::script;

/// 待機ループのポーリング間隔
const POLL_INTERVAL_MS: u64 = 250;
/// UI操作後にDOMが落ち着くまでの待機
const UI_SETTLE_MS: u64 = 500;

#[derive(Debug, Deserialize)]
struct FieldProbe {
    scope: bool,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LanguageChoice {
    found: bool,
    language: Option<String>,
}

/// CDPエラーを障害分類つきのエラーへ
fn map_cdp(err: CdpError, context: &str) -> ScraperError {
    let message = format!("{}: {}", context, err);
    match err {
        CdpError::Timeout => ScraperError::Timeout(message),
        CdpError::NotFound => ScraperError::ElementNotFound(message),
        CdpError::NoResponse | CdpError::Ws(_) | CdpError::ChannelSendError(_) => {
            ScraperError::Session(message)
        }
        CdpError::JavascriptException(_) => ScraperError::JavaScript(message),
        _ => ScraperError::Transport(message),
    }
}

/// ヘッドレスChromiumで口コミサイトを操作するクライアント
pub struct ChromiumClient {
    config: ScraperConfig,
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    cookies_accepted: bool,
}

impl ChromiumClient {
    pub fn new(config: ScraperConfig) -> Self {
        Self {
            config,
            browser: None,
            page: None,
            handler: None,
            cookies_accepted: false,
        }
    }

    fn browser(&self) -> Result<&Browser, ScraperError> {
        self.browser
            .as_ref()
            .ok_or_else(|| ScraperError::BrowserInit("ブラウザが初期化されていません".into()))
    }

    fn page(&self) -> Result<&Page, ScraperError> {
        self.page
            .as_ref()
            .ok_or_else(|| ScraperError::BrowserInit("ブラウザが初期化されていません".into()))
    }

    /// スクリプトを評価してJSON文字列の戻り値を読む
    async fn eval_on<T: DeserializeOwned>(page: &Page, script: &str) -> Result<T, ScraperError> {
        let raw: String = page
            .evaluate(script)
            .await
            .map_err(|e| map_cdp(e, "evaluate"))?
            .into_value()
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn eval<T: DeserializeOwned>(&self, script: &str) -> Result<T, ScraperError> {
        Self::eval_on(self.page()?, script).await
    }

    /// 条件が真になるまで待つ。タイムアウトなら `false`
    async fn wait_until(&self, script: &str, timeout: Duration) -> Result<bool, ScraperError> {
        let start = Instant::now();
        loop {
            match self.eval::<bool>(script).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) if e.is_retryable() && !matches!(e, ScraperError::Timeout(_)) => return Err(e),
                Err(e) => debug!("Wait check error: {}", e),
            }
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    async fn goto(&mut self, url: &str) -> Result<(), ScraperError> {
        debug!("Navigating to {}", url);
        let page = self.page()?;
        page.goto(url)
            .await
            .map_err(|e| map_cdp(e, &format!("goto {}", url)))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| map_cdp(e, "wait_for_navigation"))?;
        self.accept_cookies().await
    }

    /// Cookie同意バナーを閉じる（セッションにつき1回）
    async fn accept_cookies(&mut self) -> Result<(), ScraperError> {
        if self.cookies_accepted {
            return Ok(());
        }
        let click = script::click_within(&Scope::Document, Locator::Css(script::COOKIE_ACCEPT));
        let start = Instant::now();
        while start.elapsed() < self.config.timeout {
            if self.eval::<bool>(&click).await? {
                info!("Accepted cookie prompt");
                self.cookies_accepted = true;
                return Ok(());
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
        debug!("No cookie prompt within {:?}", self.config.timeout);
        self.cookies_accepted = true;
        Ok(())
    }

    async fn settle(&self) {
        sleep(Duration::from_millis(UI_SETTLE_MS)).await;
    }

    /// 言語選択肢の一覧を表示し、その選択肢セレクタを返す
    async fn reveal_languages(&self, mode: PickerMode) -> Result<&'static str, ScraperError> {
        match mode {
            PickerMode::Overlay => {
                let click =
                    script::click_within(&Scope::Document, Locator::XPath(script::LANGUAGE_PICKER));
                if !self.eval::<bool>(&click).await? {
                    return Err(ScraperError::ElementNotFound("言語選択オーバーレイ".into()));
                }
                self.settle().await;
                Ok(script::LANGUAGE_OVERLAY_ITEMS)
            }
            PickerMode::Radio => Ok(script::LANGUAGE_RADIO_ITEMS),
        }
    }
}

#[async_trait]
impl PageClient for ChromiumClient {
    async fn initialize(&mut self) -> Result<(), ScraperError> {
        info!("Initializing browser...");

        let unique_id = format!(
            "{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let user_data_dir = std::env::temp_dir().join(format!("review-scraper-{}", unique_id));

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&user_data_dir)
            .window_size(1280, 1024);
        if let Some(chrome_path) = &self.config.chrome_path {
            builder = builder.chrome_executable(chrome_path);
        }
        if !self.config.headless {
            builder = builder.with_head();
        }
        builder = builder
            .no_sandbox()
            .request_timeout(Duration::from_secs(60))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--lang=de-DE");
        if self.config.debug {
            builder = builder.arg("--enable-logging=stderr").arg("--v=1");
        }

        let browser_config = builder
            .build()
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        self.browser = Some(browser);
        self.page = Some(page);
        self.handler = Some(handler_task);
        self.cookies_accepted = false;
        info!("Browser initialized successfully");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ScraperError> {
        self.page = None;
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                debug!("Browser close error: {}", e);
            }
            if let Err(e) = browser.wait().await {
                debug!("Browser wait error: {}", e);
            }
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        info!("Browser closed");
        Ok(())
    }

    async fn search(&mut self, query: &str) -> Result<(), ScraperError> {
        let base_url = self.config.base_url.clone();
        self.goto(&base_url).await?;

        let query = format!("{} Deutschland", query);
        let page = self.page()?;
        page.find_element(script::SEARCH_INPUT)
            .await
            .map_err(|e| ScraperError::ElementNotFound(format!("検索フォーム: {}", e)))?
            .click()
            .await
            .map_err(|e| map_cdp(e, "検索フォームクリック"))?
            .type_str(&query)
            .await
            .map_err(|e| map_cdp(e, "検索クエリ入力"))?;
        debug!("Typed search query {:?}", query);

        // 候補の1件目を開く
        let first = script::wrap(&format!(
            "const a = document.querySelector({}); return a ? a.href : null;",
            script::js_str(script::TYPEAHEAD_FIRST)
        ));
        let start = Instant::now();
        let href = loop {
            if let Some(href) = self.eval::<Option<String>>(&first).await? {
                break href;
            }
            if start.elapsed() >= self.config.timeout {
                return Err(ScraperError::Timeout(format!("検索候補: {}", query)));
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        };
        self.goto(&href).await
    }

    async fn opt_out_radius_broadening(&mut self) -> Result<bool, ScraperError> {
        let click =
            script::click_within(&Scope::Document, Locator::Css(script::GEO_BROADEN_OPT_OUT));
        self.eval(&click).await
    }

    async fn top_result_address(&mut self) -> Result<Option<String>, ScraperError> {
        let ready = script::wrap(&format!("return {} > 0;", script::xpath_count(script::FIRST_RESULT)));
        if !self.wait_until(&ready, self.config.timeout).await? {
            return Ok(None);
        }
        let link = Field::EntryUrl
            .rule(FetchMode::Primary)
            .ok_or_else(|| ScraperError::ElementNotFound("entry link rule".into()))?;
        let probe: FieldProbe = self
            .eval(&script::field_script(&Scope::ResultEntry(0), &link))
            .await?;
        let Some(href) = probe.value else {
            return Ok(None);
        };

        // 検索結果ページを保ったまま別タブで住所を読む
        let tab = self
            .browser()?
            .new_page(href.as_str())
            .await
            .map_err(|e| map_cdp(e, "new_page"))?;
        let address = Field::StreetWithNo
            .rule(FetchMode::Primary)
            .ok_or_else(|| ScraperError::ElementNotFound("address rule".into()))?;
        let read = script::field_script(&Scope::Document, &address);

        let start = Instant::now();
        let mut value = None;
        while start.elapsed() < self.config.timeout {
            let probe: FieldProbe = Self::eval_on(&tab, &read).await?;
            if probe.value.is_some() {
                value = probe.value;
                break;
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
        if let Err(e) = tab.close().await {
            debug!("Failed to close address tab: {}", e);
        }
        debug!("Top result address: {:?}", value);
        Ok(value)
    }

    async fn list_entries(&mut self) -> Result<Vec<Scope>, ScraperError> {
        let ready = script::wrap(&format!("return {} > 0;", script::xpath_count(script::FIRST_RESULT)));
        if !self.wait_until(&ready, self.config.timeout).await? {
            warn!("No search results visible");
            return Ok(Vec::new());
        }
        let count: usize = self
            .eval(&script::wrap(&format!(
                "return {};",
                script::xpath_count(script::RESULT_ENTRIES)
            )))
            .await?;
        Ok((0..count).map(Scope::ResultEntry).collect())
    }

    async fn entry_has_reviews(&mut self, entry: &Scope) -> Result<bool, ScraperError> {
        self.eval(&script::exists_within(
            entry,
            Locator::XPath(script::ENTRY_REVIEWS_LINK),
        ))
        .await
    }

    async fn open_entry(&mut self, url: &str) -> Result<(), ScraperError> {
        self.goto(&format!("{}#REVIEWS", url)).await
    }

    async fn get_field(
        &mut self,
        scope: &Scope,
        field: Field,
        mode: FetchMode,
    ) -> Result<Option<String>, ScraperError> {
        let Some(rule) = field.rule(mode) else {
            return Ok(None);
        };
        let probe: FieldProbe = self.eval(&script::field_script(scope, &rule)).await?;
        if !probe.scope {
            return Err(match scope {
                Scope::UserOverlay => ScraperError::ElementNotFound("ユーザーオーバーレイ".into()),
                _ => ScraperError::StaleElement(format!("{:?}", scope)),
            });
        }
        Ok(probe.value)
    }

    async fn list_review_languages(&mut self) -> Result<(PickerMode, usize), ScraperError> {
        let overlay =
            script::exists_within(&Scope::Document, Locator::XPath(script::LANGUAGE_PICKER));
        if self.eval::<bool>(&overlay).await? {
            let items = self.reveal_languages(PickerMode::Overlay).await?;
            let count: usize = self.eval(&script::count(items)).await?;
            self.close_overlays().await?;
            self.settle().await;
            return Ok((PickerMode::Overlay, count));
        }
        let count: usize = self.eval(&script::count(script::LANGUAGE_RADIO_ITEMS)).await?;
        Ok((PickerMode::Radio, count))
    }

    async fn select_language(
        &mut self,
        mode: PickerMode,
        index: usize,
    ) -> Result<Option<String>, ScraperError> {
        self.close_overlays().await?;
        let items = self.reveal_languages(mode).await?;
        let choice: LanguageChoice = self
            .eval(&script::select_language_item(items, index))
            .await?;
        if !choice.found {
            return Err(ScraperError::ElementNotFound(format!("口コミ言語 {}", index)));
        }
        if mode == PickerMode::Overlay {
            self.close_overlays().await?;
        }
        self.settle().await;
        debug!("Selected review language {:?}", choice.language);
        Ok(choice.language)
    }

    async fn list_reviews(&mut self) -> Result<Vec<Scope>, ScraperError> {
        // 省略表示の「mehr」を展開（ページ内全口コミに効く）
        let expand =
            script::click_within(&Scope::Document, Locator::XPath(script::TEASER_EXPAND));
        if self.eval::<bool>(&expand).await? {
            self.settle().await;
        }
        let count: usize = self.eval(&script::count(script::REVIEWS)).await?;
        Ok((0..count).map(Scope::Review).collect())
    }

    async fn is_machine_translated(&mut self, review: &Scope) -> Result<bool, ScraperError> {
        self.eval(&script::exists_within(
            review,
            Locator::Css(script::TRANSLATED_HEADER),
        ))
        .await
    }

    async fn open_user_overlay(&mut self, review: &Scope) -> Result<Option<Scope>, ScraperError> {
        let click = script::click_within(review, Locator::Css(script::MEMBER_LINK));
        if !self.eval::<bool>(&click).await? {
            return Ok(None);
        }
        let ready = script::visible(script::MEMBER_OVERLAY_READY);
        if self.wait_until(&ready, self.config.timeout).await? {
            Ok(Some(Scope::UserOverlay))
        } else {
            Err(ScraperError::Timeout("ユーザーオーバーレイ".into()))
        }
    }

    async fn close_overlays(&mut self) -> Result<(), ScraperError> {
        let closed: usize = self.eval(&script::close_overlays()).await?;
        if closed > 0 {
            debug!("Closed {} overlays", closed);
        }
        Ok(())
    }

    async fn next_page(&mut self, current: u32) -> Result<bool, ScraperError> {
        let clicked: bool = self.eval(&script::click_page_number(current + 1)).await?;
        if clicked {
            debug!("Switched to page {}", current + 1);
        }
        Ok(clicked)
    }

    async fn debug_snapshot(&mut self, label: &str) -> Result<(), ScraperError> {
        if !self.config.debug {
            return Ok(());
        }
        let page = self.page()?;
        if let Ok(screenshot) = page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
        {
            use base64::Engine;
            let encoded = base64::engine::general_purpose::STANDARD.encode(&screenshot);
            debug!("{} screenshot: data:image/png;base64,{}", label, encoded);
        }
        Ok(())
    }
}
