//! chromiumoxide によるページセッション
//!
//! セッションごとに独立したブラウザプロセス（ユーザーデータディレクトリも別）を起動する。

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::GoboConfig;
use crate::error::ScraperError;
use crate::traits::PageSession;

/// トップのドキュメントと、同一オリジンの iframe 内ドキュメントのHTMLを連結して返す
///
/// 地図アプリ本体は iframe 内に描画されるため、トップだけでは情報が取れない。
const CONTENT_SCRIPT: &str = r#"
    (() => {
        const parts = [document.documentElement.outerHTML];
        for (const frame of document.querySelectorAll('iframe')) {
            try {
                const doc = frame.contentDocument;
                if (doc && doc.documentElement) {
                    parts.push(doc.documentElement.outerHTML);
                }
            } catch (e) {
                // cross-origin
            }
        }
        return parts.join('\n');
    })()
"#;

/// ナビゲーション後に待つ時間
const SETTLE_AFTER_NAVIGATION: Duration = Duration::from_millis(500);

pub struct ChromiumSession {
    index: usize,
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    user_data_dir: PathBuf,
}

impl ChromiumSession {
    /// ブラウザを起動して空のページを開く
    pub async fn launch(index: usize, config: &GoboConfig) -> Result<Self, ScraperError> {
        info!("Launching browser session {}...", index);

        // セッションごとにユニークなユーザーデータディレクトリ
        let unique_id = format!(
            "{}-{}-{}",
            std::process::id(),
            index,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let user_data_dir = std::env::temp_dir().join(format!("gobo-{}", unique_id));

        let chrome_path = std::env::var("CHROME_PATH")
            .or_else(|_| std::env::var("CHROMIUM_PATH"))
            .unwrap_or_else(|_| "chromium".to_string());

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .user_data_dir(&user_data_dir)
            .window_size(config.viewport.width, config.viewport.height);

        if !config.headless {
            builder = builder.with_head();
        }

        // 日本語を指定しないと一部のスポットが表示されない
        builder = builder
            .no_sandbox()
            .request_timeout(Duration::from_secs(60))
            .arg("--lang=ja-JP")
            .arg("--accept-lang=ja")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu");

        if config.debug {
            builder = builder.arg("--enable-logging=stderr").arg("--v=1");
        }

        let browser_config = builder.build().map_err(ScraperError::BrowserInit)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!("Browser event: {:?}", event);
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        let mut session = Self {
            index,
            browser: Some(browser),
            page: Some(page),
            handler: Some(handler),
            user_data_dir,
        };
        session
            .resize_view(config.viewport.width, config.viewport.height)
            .await?;

        info!("Browser session {} ready", index);
        Ok(session)
    }

    fn page(&self) -> Result<&Page, ScraperError> {
        self.page
            .as_ref()
            .ok_or_else(|| ScraperError::BrowserInit("ブラウザが初期化されていません".into()))
    }
}

#[async_trait]
impl PageSession for ChromiumSession {
    async fn navigate(&mut self, uri: &str) -> Result<(), ScraperError> {
        let page = self.page()?;
        debug!("Session {} navigating to {}", self.index, uri);

        page.goto(uri)
            .await
            .map_err(|e| ScraperError::Navigation(format!("{}: {}", uri, e)))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| ScraperError::Navigation(format!("{}: {}", uri, e)))?;

        tokio::time::sleep(SETTLE_AFTER_NAVIGATION).await;
        Ok(())
    }

    async fn content(&mut self) -> Result<String, ScraperError> {
        let page = self.page()?;
        let value = page
            .evaluate(CONTENT_SCRIPT)
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?;

        value
            .into_value::<String>()
            .map_err(|e| ScraperError::JavaScript(e.to_string()))
    }

    async fn resize_view(&mut self, width: u32, height: u32) -> Result<(), ScraperError> {
        let page = self.page()?;
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(width))
            .height(i64::from(height))
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(ScraperError::BrowserInit)?;

        page.execute(params)
            .await
            .map_err(|e| ScraperError::JavaScript(format!("ビューポート変更: {}", e)))?;
        debug!("Session {} viewport {}x{}", self.index, width, height);
        Ok(())
    }

    async fn current_uri(&mut self) -> Result<String, ScraperError> {
        let page = self.page()?;
        let url = page
            .url()
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?;
        Ok(url.unwrap_or_default())
    }

    async fn close(&mut self) -> Result<(), ScraperError> {
        info!("Closing browser session {}...", self.index);

        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Failed to close page: {}", e);
            }
        }
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser {}: {}", self.index, e);
            }
            if let Err(e) = browser.wait().await {
                debug!("Failed to wait for browser exit: {}", e);
            }
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            debug!("Failed to remove {:?}: {}", self.user_data_dir, e);
        }

        Ok(())
    }
}

/// pool_size 個のセッションをまとめて起動する
///
/// 途中で失敗した場合は起動済みのセッションを閉じてからエラーを返す。
pub async fn launch_sessions(config: &GoboConfig) -> Result<Vec<ChromiumSession>, ScraperError> {
    let mut sessions = Vec::with_capacity(config.pool_size);

    for index in 0..config.pool_size {
        match ChromiumSession::launch(index, config).await {
            Ok(session) => sessions.push(session),
            Err(e) => {
                warn!("Session {} failed to launch, releasing {} sessions", index, sessions.len());
                for session in sessions.iter_mut() {
                    if let Err(close_err) = session.close().await {
                        debug!("Failed to close session: {}", close_err);
                    }
                }
                return Err(e);
            }
        }
    }

    Ok(sessions)
}
