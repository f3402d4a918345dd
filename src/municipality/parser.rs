//! 市町村コード表（変遷表）のパーサー
//!
//! 表の形が不揃いなため、行ごとに次のように分類する。
//!
//! - 先頭2セルが整数でない行: 見出しや装飾。読み飛ばす
//! - 3セル目が「変更」の行: 継続行。次の行の名前列が左に2つずれる
//! - `colspan` を持つ行: 県直下の親（市・郡）。以降の行の親になる
//! - それ以外: 直前の親の子

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::document::{Document, Element};
use crate::error::ScraperError;

use super::types::{Code, HierarchyNode, NamePair, RawRow};

/// 継続行を示す印
pub const CHANGED_MARKER: &str = "変更";

/// 継続行の次の行で名前列がずれる量
const CONTINUATION_SHIFT: usize = 2;

/// 子の行の名前列（0始まり、ずれ無しのとき）
const CHILD_KANJI: usize = 3;
const CHILD_KANA: usize = 4;

/// 親の行の名前列（0始まり）
const PARENT_KANJI: usize = 3;
const PARENT_KANA: usize = 5;

pub fn root_code() -> Code {
    Code::CHIBA
}

pub fn root_name() -> NamePair {
    NamePair::new("千葉県", "ちばけん")
}

/// ドキュメント中の唯一の表を読み取る
pub fn flatten_document(document: &Document) -> Result<Vec<RawRow>, ScraperError> {
    let tables = document.find("table")?;
    match tables.as_slice() {
        [table] => flatten(table),
        other => Err(ScraperError::TableCount(other.len())),
    }
}

/// 表を文書順に読み、ルート行を先頭にした行の列にする
pub fn flatten(table: &Element<'_>) -> Result<Vec<RawRow>, ScraperError> {
    let root = root_name();
    let mut rows = vec![RawRow {
        code: root_code(),
        parent: None,
        name: root.clone(),
    }];

    let mut current_parent: Option<NamePair> = None;
    let mut trs = table.find("tr")?.into_iter();

    'rows: while let Some(first) = trs.next() {
        let Some(code) = parse_code(&first) else {
            continue;
        };

        let mut tr = first;
        let mut shift = 0;
        while is_continuation(&tr) {
            shift = CONTINUATION_SHIFT;
            match trs.next() {
                Some(next) => tr = next,
                None => {
                    debug!("Table ended after continuation row {:?}", code);
                    break 'rows;
                }
            }
        }

        let cells = tr.children_named("td");

        if cells.iter().any(|td| td.attribute("colspan").is_some()) {
            let Some(name) = name_at(&cells, PARENT_KANJI, PARENT_KANA) else {
                debug!("Skipping malformed parent row {:?}", code);
                continue;
            };
            current_parent = Some(name.clone());
            rows.push(RawRow {
                code,
                parent: Some(root.clone()),
                name,
            });
        } else {
            let Some(name) = name_at(&cells, CHILD_KANJI - shift, CHILD_KANA - shift) else {
                debug!("Skipping malformed child row {:?}", code);
                continue;
            };
            let parent = current_parent
                .clone()
                .ok_or(ScraperError::OrphanRow(code.to_int()))?;
            rows.push(RawRow {
                code,
                parent: Some(parent),
                name,
            });
        }
    }

    Ok(rows)
}

/// 名前で参照している親をコードに解決する
///
/// 親は必ず先に出現していなければならない。同じ名前の組が2回出現した場合は
/// 親の取り違えになるためエラーにする。
pub fn resolve(rows: &[RawRow]) -> Result<Vec<HierarchyNode>, ScraperError> {
    let mut by_name: HashMap<&NamePair, u32> = HashMap::with_capacity(rows.len());
    let mut codes: HashSet<u32> = HashSet::with_capacity(rows.len());
    let mut nodes = Vec::with_capacity(rows.len());
    let mut roots = 0;

    for row in rows {
        let code = row.code.to_int();
        if !codes.insert(code) {
            return Err(ScraperError::DuplicateCode(code));
        }

        let parent_code = match &row.parent {
            None => {
                roots += 1;
                None
            }
            Some(parent) => {
                let parent_code =
                    by_name
                        .get(parent)
                        .copied()
                        .ok_or_else(|| ScraperError::UnknownParent {
                            code,
                            kanji: parent.kanji.clone(),
                            kana: parent.kana.clone(),
                        })?;
                Some(parent_code)
            }
        };

        if by_name.insert(&row.name, code).is_some() {
            return Err(ScraperError::AmbiguousParent {
                kanji: row.name.kanji.clone(),
                kana: row.name.kana.clone(),
            });
        }

        nodes.push(HierarchyNode {
            code,
            parent_code,
            name: row.name.clone(),
        });
    }

    if roots != 1 {
        return Err(ScraperError::RootCount(roots));
    }
    Ok(nodes)
}

/// 与えられた名前の並びで 1 始まりの表示順を振る
pub fn display_order<S: AsRef<str>>(
    nodes: &[HierarchyNode],
    order: &[S],
) -> Result<Vec<(usize, u32)>, ScraperError> {
    order
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let name = name.as_ref();
            nodes
                .iter()
                .find(|node| node.name.kanji == name)
                .map(|node| (i + 1, node.code))
                .ok_or_else(|| ScraperError::UnknownDisplayName(name.to_string()))
        })
        .collect()
}

fn parse_code(tr: &Element<'_>) -> Option<Code> {
    let cells = tr.children_named("td");
    let major = cells.first()?.text().parse().ok()?;
    let minor = cells.get(1)?.text().parse().ok()?;
    let code = Code::new(major, minor);
    if code.is_none() {
        debug!("Skipping row with out-of-range code {}-{}", major, minor);
    }
    code
}

fn is_continuation(tr: &Element<'_>) -> bool {
    let cells = tr.children_named("td");
    let Some(cell) = cells.get(2) else {
        return false;
    };
    let texts: Vec<String> = cell
        .child_elements()
        .iter()
        .flat_map(|child| child.own_texts())
        .collect();
    texts == [CHANGED_MARKER]
}

fn name_at(cells: &[Element<'_>], kanji: usize, kana: usize) -> Option<NamePair> {
    let kanji = cells.get(kanji)?.own_texts().concat();
    let kana = cells.get(kana)?.own_texts().concat();
    if kanji.is_empty() || kana.is_empty() {
        return None;
    }
    Some(NamePair { kanji, kana })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &str) -> Document {
        Document::parse(&format!(
            "<html><body><table>{}</table></body></html>",
            rows
        ))
    }

    const HEADER: &str = "<tr><th>県</th><th>コード</th><th>変更</th><th>名称</th><th>よみ</th></tr>";

    fn parent_row(major: u32, minor: u32, kanji: &str, kana: &str) -> String {
        format!(
            "<tr><td>{}</td><td>{}</td><td></td><td>{}</td><td colspan=\"2\">市</td><td>{}</td></tr>",
            major, minor, kanji, kana
        )
    }

    fn child_row(major: u32, minor: u32, kanji: &str, kana: &str) -> String {
        format!(
            "<tr><td>{}</td><td>{}</td><td></td><td>{}</td><td>{}</td></tr>",
            major, minor, kanji, kana
        )
    }

    fn nodes_of(document: &Document) -> Vec<HierarchyNode> {
        resolve(&flatten_document(document).unwrap()).unwrap()
    }

    fn node(code: u32, parent: Option<u32>, kanji: &str, kana: &str) -> HierarchyNode {
        HierarchyNode {
            code,
            parent_code: parent,
            name: NamePair::new(kanji, kana),
        }
    }

    #[test]
    fn test_code_to_int() {
        assert_eq!(Code::CHIBA.to_int(), 12000);
        assert_eq!(Code::new(12, 204).unwrap().to_int(), 12204);
        assert_eq!(Code::new(12, 1000), None);
        assert_eq!(Code::new(u32::MAX / 1000 + 1, 0), None);
        assert_eq!(Code::new(4_294_967, 296), None);
        assert_eq!(
            Code::new(4_294_967, 295).map(Code::to_int),
            Some(u32::MAX)
        );
    }

    #[test]
    fn test_parent_and_child() {
        let document = table(&format!(
            "{}{}{}",
            HEADER,
            parent_row(12, 1, "A市", "Aし"),
            child_row(12, 2, "B町", "Bまち")
        ));

        assert_eq!(
            nodes_of(&document),
            vec![
                node(12000, None, "千葉県", "ちばけん"),
                node(12001, Some(12000), "A市", "Aし"),
                node(12002, Some(12001), "B町", "Bまち"),
            ]
        );
    }

    #[test]
    fn test_continuation_row_yields_single_record() {
        let changed = "<tr><td>12</td><td>3</td><td><a href=\"#h\">変更</a></td><td>旧C村</td><td>きゅうCむら</td></tr>";
        let shifted = "<tr><td>2005.3.28</td><td>C市</td><td>Cし</td></tr>";
        let document = table(&format!(
            "{}{}{}{}",
            parent_row(12, 1, "A郡", "Aぐん"),
            changed,
            shifted,
            child_row(12, 4, "D町", "Dまち")
        ));

        let nodes = nodes_of(&document);
        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes[2], node(12003, Some(12001), "C市", "Cし"));
        assert_eq!(nodes[3], node(12004, Some(12001), "D町", "Dまち"));
    }

    #[test]
    fn test_consecutive_continuation_rows() {
        let changed = "<tr><td>12</td><td>3</td><td><b>変更</b></td><td>x</td><td>x</td></tr>";
        let changed_again = "<tr><td>1999</td><td>y</td><td><b>変更</b></td></tr>";
        let shifted = "<tr><td>2005</td><td>E町</td><td>Eまち</td></tr>";
        let document = table(&format!(
            "{}{}{}{}",
            parent_row(12, 1, "A郡", "Aぐん"),
            changed,
            changed_again,
            shifted
        ));

        let nodes = nodes_of(&document);
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[2], node(12003, Some(12001), "E町", "Eまち"));
    }

    #[test]
    fn test_continuation_at_table_end_is_dropped() {
        let changed = "<tr><td>12</td><td>3</td><td><b>変更</b></td></tr>";
        let document = table(&format!("{}{}", parent_row(12, 1, "A郡", "Aぐん"), changed));

        assert_eq!(nodes_of(&document).len(), 2);
    }

    #[test]
    fn test_non_data_rows_are_skipped() {
        let decoration = "<tr><td colspan=\"6\">― 印旛郡 ―</td></tr>";
        let text_code = "<tr><td>十二</td><td>1</td><td></td><td>X</td><td>x</td></tr>";
        let document = table(&format!(
            "{}{}{}{}{}",
            HEADER,
            decoration,
            parent_row(12, 1, "A市", "Aし"),
            text_code,
            child_row(12, 2, "B町", "Bまち")
        ));

        assert_eq!(nodes_of(&document).len(), 3);
    }

    #[test]
    fn test_out_of_range_codes_are_skipped() {
        let huge_major = "<tr><td>5000000</td><td>1</td><td></td><td>X町</td><td>Xまち</td></tr>";
        let wide_minor = "<tr><td>12</td><td>1500</td><td></td><td>Y町</td><td>Yまち</td></tr>";
        let document = table(&format!(
            "{}{}{}{}",
            parent_row(12, 1, "A市", "Aし"),
            huge_major,
            wide_minor,
            child_row(12, 2, "B町", "Bまち")
        ));

        let nodes = nodes_of(&document);
        let codes: Vec<u32> = nodes.iter().map(|n| n.code).collect();
        assert_eq!(codes, vec![12000, 12001, 12002]);
    }

    #[test]
    fn test_nested_marker_is_not_continuation() {
        // 「変更」がセル直下の要素ではなく孫要素にある
        let nested = "<tr><td>12</td><td>3</td><td><span><b>変更</b></span></td><td>C町</td><td>Cまち</td></tr>";
        let document = table(&format!(
            "{}{}{}",
            parent_row(12, 1, "A郡", "Aぐん"),
            nested,
            child_row(12, 4, "D町", "Dまち")
        ));

        let nodes = nodes_of(&document);
        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes[2], node(12003, Some(12001), "C町", "Cまち"));
    }

    #[test]
    fn test_child_follows_latest_parent() {
        let document = table(&format!(
            "{}{}{}{}",
            parent_row(12, 300, "印旛郡", "いんばぐん"),
            child_row(12, 322, "酒々井町", "しすいまち"),
            parent_row(12, 400, "香取郡", "かとりぐん"),
            child_row(12, 342, "神崎町", "こうざきまち")
        ));

        let nodes = nodes_of(&document);
        assert_eq!(nodes[2].parent_code, Some(12300));
        assert_eq!(nodes[4].parent_code, Some(12400));
    }

    #[test]
    fn test_orphan_child_is_error() {
        let document = table(&child_row(12, 2, "B町", "Bまち"));
        let err = flatten_document(&document).unwrap_err();
        assert!(matches!(err, ScraperError::OrphanRow(12002)));
    }

    #[test]
    fn test_duplicate_name_pair_is_ambiguous() {
        let document = table(&format!(
            "{}{}{}",
            parent_row(12, 1, "A郡", "Aぐん"),
            child_row(12, 2, "B町", "Bまち"),
            child_row(12, 3, "B町", "Bまち")
        ));
        let rows = flatten_document(&document).unwrap();

        assert!(matches!(
            resolve(&rows).unwrap_err(),
            ScraperError::AmbiguousParent { .. }
        ));
    }

    #[test]
    fn test_duplicate_code_is_error() {
        let document = table(&format!(
            "{}{}{}",
            parent_row(12, 1, "A郡", "Aぐん"),
            child_row(12, 2, "B町", "Bまち"),
            child_row(12, 2, "C町", "Cまち")
        ));
        let rows = flatten_document(&document).unwrap();

        assert!(matches!(
            resolve(&rows).unwrap_err(),
            ScraperError::DuplicateCode(12002)
        ));
    }

    #[test]
    fn test_forward_reference_is_error() {
        let rows = vec![
            RawRow {
                code: root_code(),
                parent: None,
                name: root_name(),
            },
            RawRow {
                code: Code::new(12, 2).unwrap(),
                parent: Some(NamePair::new("A郡", "Aぐん")),
                name: NamePair::new("B町", "Bまち"),
            },
            RawRow {
                code: Code::new(12, 1).unwrap(),
                parent: Some(root_name()),
                name: NamePair::new("A郡", "Aぐん"),
            },
        ];

        assert!(matches!(
            resolve(&rows).unwrap_err(),
            ScraperError::UnknownParent { code: 12002, .. }
        ));
    }

    #[test]
    fn test_table_count() {
        let document = Document::parse("<html><body><p>no table</p></body></html>");
        assert!(matches!(
            flatten_document(&document).unwrap_err(),
            ScraperError::TableCount(0)
        ));
    }

    #[test]
    fn test_display_order() {
        let document = table(&format!(
            "{}{}{}",
            parent_row(12, 100, "千葉市", "ちばし"),
            parent_row(12, 202, "銚子市", "ちょうしし"),
            parent_row(12, 203, "市川市", "いちかわし")
        ));
        let nodes = nodes_of(&document);

        let order = display_order(&nodes, &["銚子市", "千葉市"]).unwrap();
        assert_eq!(order, vec![(1, 12202), (2, 12100)]);

        assert!(matches!(
            display_order(&nodes, &["館山市"]).unwrap_err(),
            ScraperError::UnknownDisplayName(_)
        ));
    }
}
