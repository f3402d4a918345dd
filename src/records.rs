//! 書き出し用のフラットなレコード

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::address::AddressResolver;
use crate::merge::{narrow_spaces, strip_whitespace};
use crate::municipality::HierarchyNode;
use crate::platinum::{FIELD_ADDRESS, FIELD_LINK, FIELD_SUBTITLE};
use crate::types::{Convergence, ExtractionResult, MembershipResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spot {
    pub id: u64,
    pub name: String,
    pub subtitle: Option<String>,
    pub address: Option<String>,
    pub link_uri: Option<String>,
    /// 住所から特定した市町村名（特定できなければ空）
    pub municipalities: Vec<String>,
    pub status: Convergence,
}

impl From<&ExtractionResult> for Spot {
    fn from(result: &ExtractionResult) -> Self {
        let field = |name: &str| result.get(name).map(str::to_string);
        Self {
            id: result.id,
            name: result.get("name").map(narrow_spaces).unwrap_or_default(),
            subtitle: field(FIELD_SUBTITLE),
            address: field(FIELD_ADDRESS),
            link_uri: field(FIELD_LINK),
            municipalities: Vec::new(),
            status: result.status.clone(),
        }
    }
}

/// 住所から市町村を特定したスポットレコードにする
///
/// 特定できない住所は警告を出し、市町村を空のまま残す。
pub fn spots(results: &[ExtractionResult], resolver: &AddressResolver) -> Vec<Spot> {
    results
        .iter()
        .map(|result| {
            let mut spot = Spot::from(result);
            if let Some(address) = spot.address.as_deref() {
                match resolver.resolve(address) {
                    Ok(names) => spot.municipalities = names,
                    Err(e) => warn!("Spot {}: {}", spot.id, e),
                }
            }
            spot
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    /// 所属スポット（ページ上の出現順）
    pub spot_ids: Vec<u64>,
    pub status: Convergence,
}

impl From<&MembershipResult> for Category {
    fn from(result: &MembershipResult) -> Self {
        Self {
            id: result.target.id,
            name: result
                .name
                .as_deref()
                .map(strip_whitespace)
                .unwrap_or_default(),
            spot_ids: result.target.members.clone(),
            status: result.status.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Municipality {
    pub id: u32,
    pub parent_id: Option<u32>,
    pub name: String,
    pub kana: String,
    /// 表示順（表示対象でなければ None）
    pub display_index: Option<usize>,
}

impl From<&HierarchyNode> for Municipality {
    fn from(node: &HierarchyNode) -> Self {
        Self {
            id: node.code,
            parent_id: node.parent_code,
            name: node.name.kanji.clone(),
            kana: node.name.kana.clone(),
            display_index: None,
        }
    }
}

/// 表示順 (index, code) を付けたレコード列にする
pub fn municipalities(nodes: &[HierarchyNode], order: &[(usize, u32)]) -> Vec<Municipality> {
    nodes
        .iter()
        .map(|node| Municipality {
            display_index: order
                .iter()
                .find(|(_, code)| *code == node.code)
                .map(|(index, _)| *index),
            ..Municipality::from(node)
        })
        .collect()
}

/// 観光エリア
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Area {
    Bay = 1,
    HigashiKatsushika = 2,
    Hokuso = 3,
    Kujukuri = 4,
    MinamiBoso = 5,
    KazusaRinkai = 6,
}

impl Area {
    pub const ALL: [Area; 6] = [
        Area::Bay,
        Area::HigashiKatsushika,
        Area::Hokuso,
        Area::Kujukuri,
        Area::MinamiBoso,
        Area::KazusaRinkai,
    ];

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Area::Bay => "ベイ",
            Area::HigashiKatsushika => "東葛飾",
            Area::Hokuso => "北総",
            Area::Kujukuri => "九十九里",
            Area::MinamiBoso => "南房総",
            Area::KazusaRinkai => "かずさ・臨海",
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|area| area.id() == id)
    }
}
