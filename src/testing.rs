//! テスト用の台本どおりに応答するセッション

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ScraperError;
use crate::traits::PageSession;

/// `content()` のたびに台本のページを順に返す。台本が尽きたら最後のページを返し続ける。
pub struct ScriptedSession {
    pages: Vec<String>,
    cursor: usize,
    uri: String,
    navigations: Vec<String>,
    resizes: Vec<(u32, u32)>,
    fail_content: bool,
    fail_navigation_on: Option<String>,
    closed: Arc<AtomicUsize>,
}

impl ScriptedSession {
    pub fn new(pages: Vec<String>) -> Self {
        Self {
            pages,
            cursor: 0,
            uri: String::from("about:blank"),
            navigations: Vec::new(),
            resizes: Vec::new(),
            fail_content: false,
            fail_navigation_on: None,
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// content() が常に失敗するセッション
    pub fn failing() -> Self {
        Self {
            fail_content: true,
            ..Self::new(Vec::new())
        }
    }

    /// uri にこの文字列を含む遷移だけ失敗させる
    pub fn fail_navigation_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_navigation_on = Some(needle.into());
        self
    }

    /// close() の呼び出しを数えるカウンタを共有する
    pub fn with_close_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.closed = counter;
        self
    }

    pub fn content_reads(&self) -> usize {
        self.cursor
    }

    pub fn resizes(&self) -> &[(u32, u32)] {
        &self.resizes
    }

    pub fn navigations(&self) -> &[String] {
        &self.navigations
    }
}

#[async_trait]
impl PageSession for ScriptedSession {
    async fn navigate(&mut self, uri: &str) -> Result<(), ScraperError> {
        if let Some(needle) = &self.fail_navigation_on {
            if uri.contains(needle.as_str()) {
                return Err(ScraperError::Navigation(format!("scripted failure: {}", uri)));
            }
        }
        self.uri = uri.to_string();
        self.navigations.push(uri.to_string());
        Ok(())
    }

    async fn content(&mut self) -> Result<String, ScraperError> {
        if self.fail_content {
            return Err(ScraperError::JavaScript("scripted failure".into()));
        }
        let index = self.cursor.min(self.pages.len().saturating_sub(1));
        self.cursor += 1;
        Ok(self.pages.get(index).cloned().unwrap_or_default())
    }

    async fn resize_view(&mut self, width: u32, height: u32) -> Result<(), ScraperError> {
        self.resizes.push((width, height));
        Ok(())
    }

    async fn current_uri(&mut self) -> Result<String, ScraperError> {
        Ok(self.uri.clone())
    }

    async fn close(&mut self) -> Result<(), ScraperError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
