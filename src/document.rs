//! レンダリング済みHTMLへのセレクタ問い合わせ
//!
//! `scraper::Html` は `Send` ではないため、`await` をまたいで保持しない。
//! セッションから取った文字列をその場で `Document::parse` して使い捨てる。

use scraper::{ElementRef, Html, Selector};

use crate::error::ScraperError;

pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(content: &str) -> Self {
        Self {
            html: Html::parse_document(content),
        }
    }

    pub fn find(&self, selector: &str) -> Result<Vec<Element<'_>>, ScraperError> {
        let selector = parse_selector(selector)?;
        Ok(self.html.select(&selector).map(Element).collect())
    }
}

#[derive(Clone, Copy)]
pub struct Element<'a>(ElementRef<'a>);

impl<'a> Element<'a> {
    /// 子孫のテキストを連結して前後の空白を除いたもの
    pub fn text(&self) -> String {
        self.0.text().collect::<String>().trim().to_string()
    }

    /// 直下のテキストノードのみ（空白だけのノードは除く）
    pub fn own_texts(&self) -> Vec<String> {
        self.0
            .children()
            .filter_map(|node| node.value().as_text())
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .collect()
    }

    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        self.0.value().attr(name)
    }

    pub fn find(&self, selector: &str) -> Result<Vec<Element<'a>>, ScraperError> {
        let selector = parse_selector(selector)?;
        Ok(self.0.select(&selector).map(Element).collect())
    }

    /// 直下の子要素
    pub fn child_elements(&self) -> Vec<Element<'a>> {
        self.0
            .children()
            .filter_map(ElementRef::wrap)
            .map(Element)
            .collect()
    }

    /// 直下の子要素のうちタグ名が一致するもの
    pub fn children_named(&self, tag: &str) -> Vec<Element<'a>> {
        self.0
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|child| child.value().name().eq_ignore_ascii_case(tag))
            .map(Element)
            .collect()
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ScraperError> {
    Selector::parse(selector).map_err(|e| ScraperError::Selector(format!("{}: {}", selector, e)))
}
