//! 市町村コード表の型定義

use serde::{Deserialize, Serialize};

/// 都道府県コード・市区町村コードの組
///
/// minor は3桁に収まり、major * 1000 + minor が `u32` に収まることを
/// 構築時に保証する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Code {
    major: u32,
    minor: u32,
}

impl Code {
    /// 千葉県
    pub const CHIBA: Code = Code {
        major: 12,
        minor: 0,
    };

    /// 整数化できない組は None
    pub const fn new(major: u32, minor: u32) -> Option<Self> {
        if minor >= 1000 {
            return None;
        }
        match major.checked_mul(1000) {
            Some(base) if base.checked_add(minor).is_some() => Some(Self { major, minor }),
            _ => None,
        }
    }

    pub const fn major(self) -> u32 {
        self.major
    }

    pub const fn minor(self) -> u32 {
        self.minor
    }

    /// major * 1000 + minor
    pub const fn to_int(self) -> u32 {
        self.major * 1000 + self.minor
    }
}

/// 漢字表記と読み
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamePair {
    pub kanji: String,
    pub kana: String,
}

impl NamePair {
    pub fn new(kanji: impl Into<String>, kana: impl Into<String>) -> Self {
        Self {
            kanji: kanji.into(),
            kana: kana.into(),
        }
    }
}

/// 表から読み取ったままの行（親は名前で参照）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub code: Code,
    pub parent: Option<NamePair>,
    pub name: NamePair,
}

/// 解決済みの階層ノード
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub code: u32,
    pub parent_code: Option<u32>,
    pub name: NamePair,
}
