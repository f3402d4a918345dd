//! スポットの住所から市町村名を特定する

use std::collections::{BTreeMap, HashSet};

use crate::config::ExtractionTables;
use crate::error::ScraperError;
use crate::municipality::{display_order, HierarchyNode};

/// 住所表記の揺れ（表記 → 市町村名側の表記）
const SPELLING_FIXES: &[(&str, &str)] = &[("ケ", "ヶ"), ("舘山", "館山")];

pub struct AddressResolver {
    names: Vec<String>,
    overrides: BTreeMap<String, Vec<String>>,
}

impl AddressResolver {
    /// names: 判定対象の市町村名（郡や県は含めない）
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            overrides: BTreeMap::new(),
        }
    }

    /// 市町村コード表と静的テーブルから作る
    ///
    /// 判定対象は表示順に並ぶ市町村。表示順が空なら子を持たないノード（区・町村と
    /// 区を持たない市）を使う。
    pub fn from_tables(
        nodes: &[HierarchyNode],
        tables: &ExtractionTables,
    ) -> Result<Self, ScraperError> {
        let names: Vec<String> = if tables.display_order.is_empty() {
            let parents: HashSet<u32> = nodes.iter().filter_map(|node| node.parent_code).collect();
            nodes
                .iter()
                .filter(|node| !parents.contains(&node.code))
                .map(|node| node.name.kanji.clone())
                .collect()
        } else {
            display_order(nodes, &tables.display_order)?;
            tables.display_order.clone()
        };

        Ok(Self::new(names).with_overrides(tables.address_overrides.clone()))
    }

    /// 複数の市町村にまたがる住所など、自動判定できない住所の対応表
    pub fn with_overrides(mut self, overrides: BTreeMap<String, Vec<String>>) -> Self {
        self.overrides = overrides;
        self
    }

    /// 住所に含まれる市町村名を返す。ちょうど1つでなければエラー
    pub fn resolve(&self, address: &str) -> Result<Vec<String>, ScraperError> {
        if let Some(names) = self.overrides.get(address) {
            return Ok(names.clone());
        }

        let normalized = SPELLING_FIXES
            .iter()
            .fold(address.to_string(), |text, (from, to)| text.replace(from, to));

        let candidates: Vec<String> = self
            .names
            .iter()
            .filter(|name| normalized.contains(name.as_str()))
            .cloned()
            .collect();

        match candidates.len() {
            1 => Ok(candidates),
            _ => Err(ScraperError::AddressUnresolved {
                address: address.to_string(),
                candidates,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> AddressResolver {
        AddressResolver::new(["館山市", "鎌ヶ谷市", "市原市", "長柄町", "佐倉市"]).with_overrides(
            BTreeMap::from([(
                "市原市・長生郡長柄町".to_string(),
                vec!["市原市".to_string(), "長柄町".to_string()],
            )]),
        )
    }

    #[test]
    fn test_single_match() {
        assert_eq!(
            resolver().resolve("千葉県市原市養老").unwrap(),
            vec!["市原市".to_string()]
        );
    }

    #[test]
    fn test_spelling_fixes() {
        let resolver = resolver();
        assert_eq!(resolver.resolve("鎌ケ谷市初富").unwrap(), vec!["鎌ヶ谷市"]);
        assert_eq!(resolver.resolve("舘山市那古").unwrap(), vec!["館山市"]);
    }

    #[test]
    fn test_override() {
        assert_eq!(
            resolver().resolve("市原市・長生郡長柄町").unwrap(),
            vec!["市原市", "長柄町"]
        );
    }

    fn nodes() -> Vec<HierarchyNode> {
        let node = |code, parent_code, kanji: &str| HierarchyNode {
            code,
            parent_code,
            name: crate::municipality::NamePair::new(kanji, ""),
        };
        vec![
            node(12000, None, "千葉県"),
            node(12100, Some(12000), "千葉市"),
            node(12101, Some(12100), "中央区"),
            node(12205, Some(12000), "館山市"),
        ]
    }

    #[test]
    fn test_from_tables_uses_display_order_and_overrides() {
        let tables = ExtractionTables::from_json_str(
            r#"{
                "display_order": ["千葉市", "館山市"],
                "address_overrides": { "千葉市・館山市": ["千葉市", "館山市"] }
            }"#,
        )
        .unwrap();
        let resolver = AddressResolver::from_tables(&nodes(), &tables).unwrap();

        assert_eq!(resolver.resolve("千葉市中央区中央").unwrap(), vec!["千葉市"]);
        assert_eq!(
            resolver.resolve("千葉市・館山市").unwrap(),
            vec!["千葉市", "館山市"]
        );
    }

    #[test]
    fn test_from_tables_without_display_order_uses_leaves() {
        let resolver = AddressResolver::from_tables(&nodes(), &ExtractionTables::default()).unwrap();

        assert_eq!(resolver.resolve("千葉市中央区中央").unwrap(), vec!["中央区"]);
        assert_eq!(resolver.resolve("舘山市北条").unwrap(), vec!["館山市"]);
    }

    #[test]
    fn test_from_tables_unknown_display_name() {
        let tables = ExtractionTables::from_json_str(r#"{"display_order": ["銚子市"]}"#).unwrap();
        assert!(matches!(
            AddressResolver::from_tables(&nodes(), &tables),
            Err(ScraperError::UnknownDisplayName(_))
        ));
    }

    #[test]
    fn test_ambiguous_or_missing() {
        let resolver = resolver();
        match resolver.resolve("市原市から長柄町へ").unwrap_err() {
            ScraperError::AddressUnresolved { candidates, .. } => assert_eq!(candidates.len(), 2),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(resolver.resolve("東京都千代田区").is_err());
    }
}
