//! 抽出結果のマージと正規化

use std::collections::BTreeMap;

use crate::traits::Outcome;
use crate::types::{ExtractionResult, MultiValueTarget};

impl ExtractionResult {
    /// 1回分の観測を取り込む
    ///
    /// 追加のみ。以前見つかったフィールドが今回の DOM に無くても消さない。
    /// 空文字列の値は未出現として扱う。
    pub fn absorb(&mut self, observed: BTreeMap<String, String>) -> usize {
        let mut added = 0;
        for (field, value) in observed {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            if self.present.insert(field.clone()) {
                added += 1;
            }
            self.fields.insert(field, value.to_string());
        }
        added
    }
}

impl MultiValueTarget {
    /// 観測したIDを初出順で追記する。既出のIDは無視する。
    ///
    /// 新しく増えた件数を返す。
    pub fn merge<I>(&mut self, observed: I) -> usize
    where
        I: IntoIterator<Item = u64>,
    {
        let before = self.members.len();
        for id in observed {
            if self.seen.insert(id) {
                self.members.push(id);
            }
        }
        self.members.len() - before
    }
}

/// レーンごとの部分結果を連結してID昇順に並べる
pub fn merge_lanes<T: Outcome>(lanes: Vec<Vec<T>>) -> Vec<T> {
    let mut merged: Vec<T> = lanes.into_iter().flatten().collect();
    merged.sort_by_key(|outcome| outcome.id());
    merged
}

/// 空白類をすべて取り除く（カテゴリ名の正規化）
pub fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// 全角スペースを半角に
pub fn narrow_spaces(text: &str) -> String {
    text.replace('\u{3000}', " ")
}
