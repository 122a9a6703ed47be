use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use rebar_core::entity::RawEntity;
use rebar_core::geometry::Bounds2D;

pub const DEFAULT_TOLERANCE: f64 = 30.0;
pub const DEFAULT_TEXT_WIDTH_FACTOR: f64 = 0.6;

static DESIGNATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[Nn]?[#＃]\d+").expect("valid designation regex"));
static COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[xX×]\s*(\d+)").expect("valid count regex"));

/// 不相交集合（并查集），基于索引数组，带路径压缩与按秩合并。
#[derive(Debug, Clone)]
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    fn find(&mut self, index: usize) -> usize {
        let mut root = index;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = index;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        match self.rank[root_a].cmp(&self.rank[root_b]) {
            std::cmp::Ordering::Less => self.parent[root_a] = root_b,
            std::cmp::Ordering::Greater => self.parent[root_b] = root_a,
            std::cmp::Ordering::Equal => {
                self.parent[root_b] = root_a;
                self.rank[root_a] = self.rank[root_a].saturating_add(1);
            }
        }
    }
}

/// 聚类得到的一组图元。`members` 为输入切片中的序号，升序排列。
#[derive(Debug, Clone, PartialEq)]
pub struct EntityGroup {
    pub members: Vec<usize>,
    pub bounds: Option<Bounds2D>,
}

/// 组内文字的分类结果；`segments` 为几何边长（图面单位），按成员顺序排列。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterLabel {
    pub designation: Option<String>,
    pub count: Option<u32>,
    pub note: String,
    pub segments: Vec<f64>,
}

impl ClusterLabel {
    pub fn total_length(&self) -> f64 {
        self.segments.iter().sum()
    }
}

/// 将缺少可解析标注的图元按包围框邻近程度归组。
#[derive(Debug, Clone, Copy)]
pub struct EntityClusterer {
    tolerance: f64,
    text_width_factor: f64,
}

impl Default for EntityClusterer {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE, DEFAULT_TEXT_WIDTH_FACTOR)
    }
}

impl EntityClusterer {
    pub fn new(tolerance: f64, text_width_factor: f64) -> Self {
        Self {
            tolerance: tolerance.max(0.0),
            text_width_factor,
        }
    }

    #[inline]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// 对图元两两比较：扩展后的包围框重叠即合并。结果按组内最小序号排序，
    /// 不含线段/多段线的纯文字组被丢弃。
    pub fn cluster(&self, entities: &[&RawEntity]) -> Vec<EntityGroup> {
        let boxes: Vec<Option<Bounds2D>> = entities
            .iter()
            .map(|entity| entity.bounds(self.text_width_factor))
            .collect();

        let mut sets = DisjointSet::new(entities.len());
        for i in 0..entities.len() {
            let Some(grown) = boxes[i].map(|bounds| bounds.expanded(self.tolerance)) else {
                continue;
            };
            for j in (i + 1)..entities.len() {
                if let Some(other) = &boxes[j] {
                    if grown.intersects(other) {
                        sets.union(i, j);
                    }
                }
            }
        }

        let mut roots: Vec<usize> = Vec::new();
        let mut groups: Vec<EntityGroup> = Vec::new();
        for index in 0..entities.len() {
            let root = sets.find(index);
            let slot = match roots.iter().position(|candidate| *candidate == root) {
                Some(slot) => slot,
                None => {
                    roots.push(root);
                    groups.push(EntityGroup {
                        members: Vec::new(),
                        bounds: None,
                    });
                    groups.len() - 1
                }
            };
            let group = &mut groups[slot];
            group.members.push(index);
            if let Some(bounds) = &boxes[index] {
                match group.bounds.as_mut() {
                    Some(existing) => existing.include_bounds(bounds),
                    None => group.bounds = Some(*bounds),
                }
            }
        }

        let total = groups.len();
        groups.retain(|group| {
            group
                .members
                .iter()
                .any(|index| entities[*index].is_geometry())
        });
        debug!(
            entities = entities.len(),
            groups = total,
            kept = groups.len(),
            tolerance = self.tolerance,
            "图元聚类完成"
        );
        groups
    }

    /// 从组内文字提取号数、数量与备注，并收集几何边长。
    pub fn classify(&self, group: &EntityGroup, entities: &[&RawEntity]) -> ClusterLabel {
        let mut label = ClusterLabel::default();
        let mut notes: Vec<String> = Vec::new();
        for entity in group.members.iter().map(|index| entities[*index]) {
            if entity.is_geometry() {
                label.segments.extend(entity.segment_lengths());
                continue;
            }
            for line in entity.text_lines() {
                let mut rest = line.to_string();
                if label.designation.is_none() {
                    if let Some(found) = DESIGNATION.find(line) {
                        label.designation = Some(found.as_str().replace('＃', "#").replace('n', "N"));
                        rest = rest.replacen(found.as_str(), " ", 1);
                    }
                }
                if label.count.is_none() {
                    let found = COUNT
                        .captures(&rest)
                        .map(|caps| (caps[0].to_string(), caps[1].parse::<u32>().ok()));
                    if let Some((matched, count)) = found {
                        label.count = count;
                        rest = rest.replacen(&matched, " ", 1);
                    }
                }
                let rest = rest.split_whitespace().collect::<Vec<_>>().join(" ");
                if !rest.is_empty() {
                    notes.push(rest);
                }
            }
        }
        label.note = notes.join(" ");
        label
    }
}
