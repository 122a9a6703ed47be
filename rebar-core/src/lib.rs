pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示，单位为图面单位。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn vector_to(self, other: Point2) -> Vector2 {
            Vector2(other.0 - self.0)
        }

        #[inline]
        pub fn distance(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        #[inline]
        pub fn midpoint(self, other: Point2) -> Point2 {
            Self((self.0 + other.0) * 0.5)
        }

        #[inline]
        pub fn is_finite(self) -> bool {
            self.0.is_finite()
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        /// 以角度（度）构造单位方向向量，0° 指向 +X，逆时针为正。
        #[inline]
        pub fn from_angle_degrees(degrees: f64) -> Self {
            let radians = degrees.to_radians();
            Self(DVec2::new(radians.cos(), radians.sin()))
        }

        #[inline]
        pub fn from_points(start: Point2, end: Point2) -> Self {
            Self(end.0 - start.0)
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        #[inline]
        pub fn length_squared(self) -> f64 {
            self.0.length_squared()
        }

        #[inline]
        pub fn scale(self, factor: f64) -> Self {
            Self(self.0 * factor)
        }

        /// 逆时针旋转 90°，用于求线段法向。
        #[inline]
        pub fn perp(self) -> Self {
            Self(self.0.perp())
        }

        #[inline]
        pub fn normalize(self) -> Option<Self> {
            let len = self.0.length();
            if len <= f64::EPSILON || !len.is_finite() {
                None
            } else {
                Some(Self(self.0 / len))
            }
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 轴对齐边界框，用于聚类重叠判定与示意图缩放。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        /// 由点集构造边界框，点集为空时返回 `None`。
        pub fn from_points(points: impl IntoIterator<Item = Point2>) -> Option<Self> {
            let mut bounds = Self::empty();
            for point in points {
                bounds.include_point(point);
            }
            if bounds.is_empty() { None } else { Some(bounds) }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.max.x() - self.min.x()
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.max.y() - self.min.y()
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        pub fn include_bounds(&mut self, other: &Bounds2D) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        /// 向四周扩展 `margin`，返回新的边界框。
        #[inline]
        pub fn expanded(&self, margin: f64) -> Self {
            let delta = DVec2::splat(margin);
            Self {
                min: Point2::from_vec(self.min.as_vec2() - delta),
                max: Point2::from_vec(self.max.as_vec2() + delta),
            }
        }

        /// 闭区间相交判定，边界接触也视为重叠。
        pub fn intersects(&self, other: &Bounds2D) -> bool {
            if self.is_empty() || other.is_empty() {
                return false;
            }
            self.min.x() <= other.max.x()
                && other.min.x() <= self.max.x()
                && self.min.y() <= other.max.y()
                && other.min.y() <= self.max.y()
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            debug_assert!(!self.is_empty());
            let center = (self.min.as_vec2() + self.max.as_vec2()) * 0.5;
            Point2::from_vec(center)
        }
    }

}

pub mod entity {
    use serde::{Deserialize, Serialize};

    use crate::geometry::{Bounds2D, Point2, Vector2};

    /// 区域框线所在图层的默认前缀。
    pub const ZONE_LAYER_PREFIX: &str = "$P-";

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct EntityId(u64);

    impl EntityId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        /// 提供原始数值，便于序列化或日志输出。
        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum EntityKind {
        Text,
        #[serde(rename = "mtext")]
        MText,
        Line,
        Polyline,
    }

    /// CAD 协作方提供的原始图元，核心只读不写。
    ///
    /// `rotation` 以度为单位；`vertices` 对线段为起终点，对多段线为顶点序列。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct RawEntity {
        pub kind: EntityKind,
        #[serde(default)]
        pub text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub insert: Option<Point2>,
        #[serde(default)]
        pub rotation: f64,
        #[serde(default)]
        pub height: f64,
        #[serde(default)]
        pub layer: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub vertices: Vec<Point2>,
        #[serde(default)]
        pub is_closed: bool,
    }

    impl RawEntity {
        pub fn text(
            insert: Point2,
            content: impl Into<String>,
            height: f64,
            rotation: f64,
            layer: impl Into<String>,
        ) -> Self {
            Self {
                kind: EntityKind::Text,
                text: content.into(),
                insert: Some(insert),
                rotation,
                height,
                layer: layer.into(),
                vertices: Vec::new(),
                is_closed: false,
            }
        }

        pub fn mtext(
            insert: Point2,
            content: impl Into<String>,
            height: f64,
            layer: impl Into<String>,
        ) -> Self {
            Self {
                kind: EntityKind::MText,
                ..Self::text(insert, content, height, 0.0, layer)
            }
        }

        pub fn line(start: Point2, end: Point2, layer: impl Into<String>) -> Self {
            Self {
                kind: EntityKind::Line,
                text: String::new(),
                insert: None,
                rotation: 0.0,
                height: 0.0,
                layer: layer.into(),
                vertices: vec![start, end],
                is_closed: false,
            }
        }

        pub fn polyline(
            vertices: impl IntoIterator<Item = Point2>,
            is_closed: bool,
            layer: impl Into<String>,
        ) -> Self {
            Self {
                kind: EntityKind::Polyline,
                vertices: vertices.into_iter().collect(),
                is_closed,
                ..Self::line(Point2::new(0.0, 0.0), Point2::new(0.0, 0.0), layer)
            }
        }

        #[inline]
        pub fn is_text(&self) -> bool {
            matches!(self.kind, EntityKind::Text | EntityKind::MText)
        }

        #[inline]
        pub fn is_geometry(&self) -> bool {
            matches!(self.kind, EntityKind::Line | EntityKind::Polyline)
        }

        /// 位于区域图层（如 `$P-A1`）上的多段线视为区域框线，不参与配筋识别。
        pub fn is_zone_boundary(&self, prefix: &str) -> bool {
            self.kind == EntityKind::Polyline && self.layer.starts_with(prefix)
        }

        /// 文本内容按行拆分。MText 同时识别 `\P` 段落符。
        pub fn text_lines(&self) -> Vec<&str> {
            match self.kind {
                EntityKind::Text => vec![self.text.as_str()],
                EntityKind::MText => self
                    .text
                    .split('\n')
                    .flat_map(|line| line.split("\\P"))
                    .map(|line| line.trim_end_matches('\r'))
                    .filter(|line| !line.trim().is_empty())
                    .collect(),
                EntityKind::Line | EntityKind::Polyline => Vec::new(),
            }
        }

        /// 按顺序返回有效线段长度，零长度或非有限坐标的线段被忽略。
        pub fn segment_lengths(&self) -> Vec<f64> {
            if !self.is_geometry() {
                return Vec::new();
            }
            let mut lengths: Vec<f64> = self
                .vertices
                .windows(2)
                .map(|pair| edge_length(pair[0], pair[1]))
                .collect();
            if self.kind == EntityKind::Polyline && self.is_closed && self.vertices.len() > 2 {
                if let (Some(first), Some(last)) = (self.vertices.first(), self.vertices.last()) {
                    lengths.push(edge_length(*last, *first));
                }
            }
            lengths.into_iter().filter(|len| *len > 0.0).collect()
        }

        /// 几何总长。退化几何（缺少顶点或总长为零）返回 `None`。
        pub fn geometry_length(&self) -> Option<f64> {
            let total: f64 = self.segment_lengths().iter().sum();
            if total > 0.0 { Some(total) } else { None }
        }

        /// 估算图元范围。文字宽度按 `字符数 × 字高 × width_factor` 近似，并考虑旋转。
        pub fn bounds(&self, width_factor: f64) -> Option<Bounds2D> {
            match self.kind {
                EntityKind::Line | EntityKind::Polyline => {
                    self.geometry_length()?;
                    Bounds2D::from_points(self.vertices.iter().copied().filter(|p| p.is_finite()))
                }
                EntityKind::Text | EntityKind::MText => {
                    let insert = self.insert.filter(|p| p.is_finite())?;
                    let lines = self.text_lines();
                    let chars = lines
                        .iter()
                        .map(|line| line.chars().count())
                        .max()
                        .unwrap_or(0);
                    let height = if self.height.is_finite() { self.height.abs() } else { 0.0 };
                    let width = chars as f64 * height * width_factor;
                    let total_height = height * lines.len().max(1) as f64;
                    let along = Vector2::from_angle_degrees(self.rotation);
                    let up = along.perp();
                    let corners = [
                        insert,
                        insert.translate(along.scale(width)),
                        insert.translate(up.scale(total_height)),
                        insert
                            .translate(along.scale(width))
                            .translate(up.scale(total_height)),
                    ];
                    Bounds2D::from_points(corners)
                }
            }
        }
    }

    fn edge_length(start: Point2, end: Point2) -> f64 {
        if !start.is_finite() || !end.is_finite() {
            return 0.0;
        }
        start.distance(end)
    }

    /// 由 `$P-<名称>` 图层上的多段线得到的分区。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct BoundaryZone {
        pub name: String,
        pub vertices: Vec<Point2>,
    }

    impl BoundaryZone {
        pub fn new(name: impl Into<String>, vertices: impl IntoIterator<Item = Point2>) -> Self {
            Self {
                name: name.into(),
                vertices: vertices.into_iter().collect(),
            }
        }

        /// 从区域框线图元构造分区；图层不匹配前缀时返回 `None`。
        pub fn from_entity(entity: &RawEntity, prefix: &str) -> Option<Self> {
            if !entity.is_zone_boundary(prefix) {
                return None;
            }
            let stripped = &entity.layer[prefix.len()..];
            let name = if stripped.is_empty() {
                entity.layer.clone()
            } else {
                stripped.to_string()
            };
            Some(Self::new(name, entity.vertices.iter().copied()))
        }

        /// 至少三个有限顶点才能构成多边形。
        pub fn is_valid(&self) -> bool {
            self.vertices.len() >= 3 && self.vertices.iter().all(|p| p.is_finite())
        }
    }

    /// 一张图面的图元快照，按 CAD 枚举顺序排列。
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct DrawingSnapshot {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub name: Option<String>,
        #[serde(default)]
        pub entities: Vec<RawEntity>,
    }

    impl DrawingSnapshot {
        pub fn new(entities: Vec<RawEntity>) -> Self {
            Self {
                name: None,
                entities,
            }
        }

        /// 按出现顺序提取区域框线。
        pub fn zones(&self, prefix: &str) -> Vec<BoundaryZone> {
            self.entities
                .iter()
                .filter_map(|entity| BoundaryZone::from_entity(entity, prefix))
                .collect()
        }

        /// 以 (EntityId, 图元) 形式迭代，ID 等于图元在快照中的序号。
        pub fn entities(&self) -> impl Iterator<Item = (EntityId, &RawEntity)> + '_ {
            self.entities
                .iter()
                .enumerate()
                .map(|(index, entity)| (EntityId::new(index as u64), entity))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn polyline_length_skips_zero_length_edges() {
            let polyline = RawEntity::polyline(
                [
                    Point2::new(0.0, 0.0),
                    Point2::new(0.0, 0.0),
                    Point2::new(30.0, 0.0),
                    Point2::new(30.0, 40.0),
                ],
                false,
                "REBAR",
            );
            assert_eq!(polyline.segment_lengths(), vec![30.0, 40.0]);
            assert_eq!(polyline.geometry_length(), Some(70.0));
        }

        #[test]
        fn degenerate_line_has_no_length_or_bounds() {
            let line = RawEntity::line(Point2::new(5.0, 5.0), Point2::new(5.0, 5.0), "0");
            assert!(line.geometry_length().is_none());
            assert!(line.bounds(0.6).is_none());

            let broken = RawEntity::line(Point2::new(f64::NAN, 0.0), Point2::new(5.0, 0.0), "0");
            assert!(broken.geometry_length().is_none());
        }

        #[test]
        fn text_bounds_follow_char_count_and_height() {
            let text = RawEntity::text(Point2::new(10.0, 20.0), "#4x10", 2.5, 0.0, "TEXT");
            let bounds = text.bounds(0.6).expect("text bounds");
            assert!((bounds.min().x() - 10.0).abs() < 1e-9);
            assert!((bounds.max().x() - (10.0 + 5.0 * 2.5 * 0.6)).abs() < 1e-9);
            assert!((bounds.max().y() - 22.5).abs() < 1e-9);
        }

        #[test]
        fn rotated_text_bounds_extend_vertically() {
            let text = RawEntity::text(Point2::new(0.0, 0.0), "ABCD", 1.0, 90.0, "TEXT");
            let bounds = text.bounds(0.5).expect("text bounds");
            assert!((bounds.height() - 2.0).abs() < 1e-9);
            assert!((bounds.width() - 1.0).abs() < 1e-9);
        }

        #[test]
        fn mtext_lines_split_on_newline_and_paragraph_codes() {
            let mtext = RawEntity::mtext(
                Point2::new(0.0, 0.0),
                "#4-300x10\\P#5-200x4\n\n安#3-390x40",
                2.5,
                "TEXT",
            );
            assert_eq!(
                mtext.text_lines(),
                vec!["#4-300x10", "#5-200x4", "安#3-390x40"]
            );
        }

        #[test]
        fn zones_are_extracted_from_prefixed_layers_in_order() {
            let square = [
                Point2::new(0.0, 0.0),
                Point2::new(10.0, 0.0),
                Point2::new(10.0, 10.0),
                Point2::new(0.0, 10.0),
            ];
            let snapshot = DrawingSnapshot::new(vec![
                RawEntity::polyline(square, true, "$P-B2"),
                RawEntity::polyline(square, true, "WALL"),
                RawEntity::polyline(square, true, "$P-A1"),
                RawEntity::line(Point2::new(0.0, 0.0), Point2::new(1.0, 1.0), "$P-X"),
            ]);
            let zones = snapshot.zones(ZONE_LAYER_PREFIX);
            let names: Vec<_> = zones.iter().map(|zone| zone.name.as_str()).collect();
            assert_eq!(names, vec!["B2", "A1"]);
            assert!(zones.iter().all(BoundaryZone::is_valid));
        }
    }
}

pub mod rebar {
    use serde::{Deserialize, Serialize};

    use crate::entity::EntityId;
    use crate::geometry::Point2;

    /// 箍筋种类，对应图面关键字。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum StirrupKind {
        /// 地箍：封闭矩形，右上角 180°+90° 弯钩。
        Ground,
        /// U箍：开口向上。
        U,
        /// L箍：两边开口。
        L,
        /// 柱箍：封闭矩形，135° 弯钩。
        Column,
        /// 牆箍：封闭矩形，90° 弯钩。
        Wall,
        /// 半箍：Z 字形。
        Half,
    }

    impl StirrupKind {
        pub const ALL: [StirrupKind; 6] = [
            StirrupKind::Ground,
            StirrupKind::U,
            StirrupKind::L,
            StirrupKind::Column,
            StirrupKind::Wall,
            StirrupKind::Half,
        ];

        pub fn keyword(self) -> &'static str {
            match self {
                StirrupKind::Ground => "地箍",
                StirrupKind::U => "U箍",
                StirrupKind::L => "L箍",
                StirrupKind::Column => "柱箍",
                StirrupKind::Wall => "牆箍",
                StirrupKind::Half => "半箍",
            }
        }

        pub fn from_keyword(keyword: &str) -> Option<Self> {
            Self::ALL.into_iter().find(|kind| kind.keyword() == keyword)
        }
    }

    /// 繫筋种类。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum TieKind {
        Column,
        Beam,
        Wall,
    }

    impl TieKind {
        pub const ALL: [TieKind; 3] = [TieKind::Column, TieKind::Beam, TieKind::Wall];

        pub fn keyword(self) -> &'static str {
            match self {
                TieKind::Column => "柱繫",
                TieKind::Beam => "梁繫",
                TieKind::Wall => "牆繫",
            }
        }

        pub fn from_keyword(keyword: &str) -> Option<Self> {
            Self::ALL.into_iter().find(|kind| kind.keyword() == keyword)
        }
    }

    /// 钢筋形状族。新增形状只需增加变体，编译器会提示所有待补分支。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case", tag = "kind", content = "style")]
    pub enum ShapeKind {
        Straight,
        Hooked,
        Bent,
        Arc,
        SteppedArc,
        NShape,
        Stepped,
        U,
        Stirrup(StirrupKind),
        Tie(TieKind),
        Unknown,
    }

    impl ShapeKind {
        /// 形状族要求的分段数；`Bent` 与 `Unknown` 不固定。
        pub fn expected_segments(self) -> Option<usize> {
            match self {
                ShapeKind::Straight | ShapeKind::Arc | ShapeKind::Tie(_) => Some(1),
                ShapeKind::Hooked | ShapeKind::SteppedArc | ShapeKind::Stirrup(_) => Some(2),
                ShapeKind::U | ShapeKind::Stepped | ShapeKind::NShape => Some(3),
                ShapeKind::Bent | ShapeKind::Unknown => None,
            }
        }

        pub fn describe(self) -> &'static str {
            match self {
                ShapeKind::Straight => "直料",
                ShapeKind::Hooked => "L型",
                ShapeKind::Bent => "折料",
                ShapeKind::Arc => "圓弧",
                ShapeKind::SteppedArc => "直段+弧段",
                ShapeKind::NShape => "N型",
                ShapeKind::Stepped => "階梯",
                ShapeKind::U => "U型",
                ShapeKind::Stirrup(kind) => kind.keyword(),
                ShapeKind::Tie(kind) => kind.keyword(),
                ShapeKind::Unknown => "未知",
            }
        }
    }

    /// 命中的标注文法，或由几何聚类得到。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum NotationFamily {
        Stirrup,
        Tie,
        Anchor,
        StraightArc,
        Arc,
        Bent,
        Plain,
        Cluster,
    }

    /// 单条配筋标注解析结果，生成后不再修改。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct RebarSpec {
        pub designation: String,
        /// 各段长度（cm）。
        pub segments: Vec<f64>,
        /// 折角（度），长度为 `segments.len() - 1`（仅折料）。
        #[serde(default)]
        pub angles: Vec<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub radius: Option<f64>,
        pub count: u32,
        pub shape: ShapeKind,
        pub family: NotationFamily,
        /// 标注中显式给出的总长（cm）。
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub explicit_total: Option<f64>,
        #[serde(default)]
        pub note: String,
        pub raw_text: String,
    }

    impl RebarSpec {
        /// 单支总长（cm）：显式总长优先，否则为各段之和。
        pub fn total_length(&self) -> f64 {
            self.explicit_total
                .unwrap_or_else(|| self.segments.iter().sum())
        }

        /// 去掉 `N` 前缀后的号数，如 `N#4` → `#4`。
        pub fn base_designation(&self) -> &str {
            base_designation(&self.designation)
        }

        pub fn bar_size(&self) -> Option<u32> {
            bar_size(&self.designation)
        }
    }

    pub fn base_designation(designation: &str) -> &str {
        designation
            .strip_prefix('N')
            .or_else(|| designation.strip_prefix('n'))
            .unwrap_or(designation)
    }

    /// 长度与角度的显示格式：整数不带小数，其余保留一位。
    pub fn format_length(value: f64) -> String {
        if (value - value.round()).abs() < 1e-9 {
            format!("{:.0}", value)
        } else {
            format!("{:.1}", value)
        }
    }

    /// 号数的数值部分，用于排序。
    pub fn bar_size(designation: &str) -> Option<u32> {
        base_designation(designation)
            .strip_prefix('#')
            .and_then(|digits| digits.parse().ok())
    }

    /// 记录来源：文字标注或几何聚类。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "kind", rename_all = "snake_case")]
    pub enum RecordSource {
        Notation { entity: EntityId, line: usize },
        Cluster { entities: Vec<EntityId> },
    }

    /// 计料表中的一行，由 ScheduleBuilder 一次性构建。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct RebarRecord {
        pub id: u64,
        pub spec: RebarSpec,
        pub diameter_mm: f64,
        pub unit_weight_kg_per_m: f64,
        pub grade: String,
        pub bend_radius_mm: f64,
        pub total_length_cm: f64,
        pub total_weight_kg: f64,
        pub zone: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub position: Option<Point2>,
        pub source: RecordSource,
        #[serde(default)]
        pub unknown_designation: bool,
    }

    impl RebarRecord {
        #[inline]
        pub fn designation(&self) -> &str {
            &self.spec.designation
        }

        #[inline]
        pub fn segments(&self) -> &[f64] {
            &self.spec.segments
        }

        #[inline]
        pub fn angles(&self) -> &[f64] {
            &self.spec.angles
        }

        #[inline]
        pub fn count(&self) -> u32 {
            self.spec.count
        }

        #[inline]
        pub fn note(&self) -> &str {
            &self.spec.note
        }

        #[inline]
        pub fn raw_text(&self) -> &str {
            &self.spec.raw_text
        }

        #[inline]
        pub fn shape(&self) -> ShapeKind {
            self.spec.shape
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn explicit_total_overrides_segment_sum() {
            let mut spec = RebarSpec {
                designation: "#4".to_string(),
                segments: vec![150.0, 200.0, 150.0],
                angles: Vec::new(),
                radius: None,
                count: 5,
                shape: ShapeKind::U,
                family: NotationFamily::Plain,
                explicit_total: None,
                note: String::new(),
                raw_text: "#4-150+200+150x5".to_string(),
            };
            assert!((spec.total_length() - 500.0).abs() < 1e-9);
            spec.explicit_total = Some(520.0);
            assert!((spec.total_length() - 520.0).abs() < 1e-9);
        }

        #[test]
        fn n_prefix_is_stripped_for_base_designation() {
            assert_eq!(base_designation("N#4"), "#4");
            assert_eq!(base_designation("#10"), "#10");
            assert_eq!(bar_size("N#13"), Some(13));
            assert_eq!(bar_size("D13"), None);
        }

        #[test]
        fn lengths_format_without_trailing_zero() {
            assert_eq!(format_length(300.0), "300");
            assert_eq!(format_length(112.5), "112.5");
            assert_eq!(format_length(0.04), "0.0");
        }

        #[test]
        fn shape_kind_serializes_with_style_tag() {
            let json = serde_json::to_string(&ShapeKind::Stirrup(StirrupKind::Ground)).unwrap();
            assert_eq!(json, r#"{"kind":"stirrup","style":"ground"}"#);
            let plain = serde_json::to_string(&ShapeKind::Straight).unwrap();
            assert_eq!(plain, r#"{"kind":"straight"}"#);
        }

        #[test]
        fn keywords_round_trip() {
            for kind in StirrupKind::ALL {
                assert_eq!(StirrupKind::from_keyword(kind.keyword()), Some(kind));
            }
            for kind in TieKind::ALL {
                assert_eq!(TieKind::from_keyword(kind.keyword()), Some(kind));
            }
            assert!(StirrupKind::from_keyword("箍").is_none());
        }
    }
}

pub mod schedule {
    use serde::{Deserialize, Serialize};

    use crate::rebar::{RebarRecord, bar_size};

    /// 处理过程中的计数器，单个图元的问题只计数不中断。
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct BuildStats {
        pub text_entities: usize,
        pub parsed_records: usize,
        pub parse_misses: usize,
        pub malformed_notation: usize,
        pub clustered_groups: usize,
        pub clustered_records: usize,
        pub unlabeled_groups: usize,
        pub degenerate_geometry: usize,
        pub unknown_designations: usize,
        pub zone_misses: usize,
    }

    impl BuildStats {
        /// 因格式错误或缺少号数而被跳过的候选数量。
        pub fn skipped(&self) -> usize {
            self.malformed_notation + self.unlabeled_groups
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ZoneSchedule {
        pub name: String,
        pub records: Vec<RebarRecord>,
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
    pub struct ScheduleTotals {
        pub records: usize,
        pub bars: u64,
        pub length_cm: f64,
        pub weight_kg: f64,
    }

    /// 按号数汇总。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct DesignationSummary {
        pub designation: String,
        pub diameter_mm: f64,
        pub grade: String,
        pub records: usize,
        pub bars: u64,
        pub length_cm: f64,
        pub weight_kg: f64,
    }

    /// 分区计料表。分区保持声明顺序，区内记录保持发现顺序。
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Schedule {
        zones: Vec<ZoneSchedule>,
        #[serde(default)]
        stats: BuildStats,
    }

    impl Schedule {
        pub fn with_zones<I, S>(names: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            let mut schedule = Self::default();
            for name in names {
                let name = name.into();
                if schedule.zone(&name).is_none() {
                    schedule.zones.push(ZoneSchedule {
                        name,
                        records: Vec::new(),
                    });
                }
            }
            schedule
        }

        /// 追加记录；分区不存在时在末尾新建。
        pub fn push_record(&mut self, record: RebarRecord) {
            match self.zones.iter_mut().find(|zone| zone.name == record.zone) {
                Some(zone) => zone.records.push(record),
                None => self.zones.push(ZoneSchedule {
                    name: record.zone.clone(),
                    records: vec![record],
                }),
            }
        }

        pub fn set_stats(&mut self, stats: BuildStats) {
            self.stats = stats;
        }

        #[inline]
        pub fn stats(&self) -> &BuildStats {
            &self.stats
        }

        pub fn zone(&self, name: &str) -> Option<&ZoneSchedule> {
            self.zones.iter().find(|zone| zone.name == name)
        }

        #[inline]
        pub fn zones(&self) -> &[ZoneSchedule] {
            &self.zones
        }

        pub fn zone_names(&self) -> impl Iterator<Item = &str> + '_ {
            self.zones.iter().map(|zone| zone.name.as_str())
        }

        pub fn records(&self) -> impl Iterator<Item = &RebarRecord> + '_ {
            self.zones.iter().flat_map(|zone| zone.records.iter())
        }

        pub fn len(&self) -> usize {
            self.zones.iter().map(|zone| zone.records.len()).sum()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        pub fn totals(&self) -> ScheduleTotals {
            self.records()
                .fold(ScheduleTotals::default(), |mut totals, record| {
                    totals.records += 1;
                    totals.bars += u64::from(record.count());
                    totals.length_cm += record.total_length_cm * f64::from(record.count());
                    totals.weight_kg += record.total_weight_kg;
                    totals
                })
        }

        /// 按号数数值从小到大汇总，无法识别的号数排在最后。
        pub fn designation_summary(&self) -> Vec<DesignationSummary> {
            let mut summary: Vec<DesignationSummary> = Vec::new();
            for record in self.records() {
                let designation = record.spec.base_designation();
                let entry = match summary
                    .iter()
                    .position(|item| item.designation == designation)
                {
                    Some(index) => &mut summary[index],
                    None => {
                        summary.push(DesignationSummary {
                            designation: designation.to_string(),
                            diameter_mm: record.diameter_mm,
                            grade: record.grade.clone(),
                            records: 0,
                            bars: 0,
                            length_cm: 0.0,
                            weight_kg: 0.0,
                        });
                        let last = summary.len() - 1;
                        &mut summary[last]
                    }
                };
                entry.records += 1;
                entry.bars += u64::from(record.count());
                entry.length_cm += record.total_length_cm * f64::from(record.count());
                entry.weight_kg += record.total_weight_kg;
            }
            summary.sort_by(|a, b| {
                let key_a = bar_size(&a.designation).unwrap_or(u32::MAX);
                let key_b = bar_size(&b.designation).unwrap_or(u32::MAX);
                key_a
                    .cmp(&key_b)
                    .then_with(|| a.designation.cmp(&b.designation))
            });
            summary
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::entity::EntityId;
        use crate::rebar::{NotationFamily, RebarSpec, RecordSource, ShapeKind};

        fn record(id: u64, designation: &str, length: f64, count: u32, zone: &str) -> RebarRecord {
            RebarRecord {
                id,
                spec: RebarSpec {
                    designation: designation.to_string(),
                    segments: vec![length],
                    angles: Vec::new(),
                    radius: None,
                    count,
                    shape: ShapeKind::Straight,
                    family: NotationFamily::Plain,
                    explicit_total: None,
                    note: "直料".to_string(),
                    raw_text: format!("{designation}-{length}x{count}"),
                },
                diameter_mm: 12.7,
                unit_weight_kg_per_m: 1.0,
                grade: "SD280".to_string(),
                bend_radius_mm: 50.8,
                total_length_cm: length,
                total_weight_kg: length / 100.0 * f64::from(count),
                zone: zone.to_string(),
                position: None,
                source: RecordSource::Notation {
                    entity: EntityId::new(id),
                    line: 0,
                },
                unknown_designation: false,
            }
        }

        #[test]
        fn records_keep_discovery_order_within_zone() {
            let mut schedule = Schedule::with_zones(["A", "B"]);
            schedule.push_record(record(0, "#4", 300.0, 2, "B"));
            schedule.push_record(record(1, "#5", 100.0, 1, "A"));
            schedule.push_record(record(2, "#3", 200.0, 1, "B"));

            let names: Vec<_> = schedule.zone_names().collect();
            assert_eq!(names, vec!["A", "B"]);
            let ids: Vec<_> = schedule
                .zone("B")
                .expect("zone B")
                .records
                .iter()
                .map(|r| r.id)
                .collect();
            assert_eq!(ids, vec![0, 2]);
            assert_eq!(schedule.len(), 3);
        }

        #[test]
        fn summary_orders_by_numeric_bar_size() {
            let mut schedule = Schedule::with_zones(["ALL"]);
            schedule.push_record(record(0, "#10", 100.0, 1, "ALL"));
            schedule.push_record(record(1, "#4", 300.0, 2, "ALL"));
            schedule.push_record(record(2, "N#4", 100.0, 3, "ALL"));

            let summary = schedule.designation_summary();
            let keys: Vec<_> = summary.iter().map(|s| s.designation.as_str()).collect();
            assert_eq!(keys, vec!["#4", "#10"]);
            assert_eq!(summary[0].records, 2);
            assert_eq!(summary[0].bars, 5);
            assert!((summary[0].length_cm - 900.0).abs() < 1e-9);

            let totals = schedule.totals();
            assert_eq!(totals.records, 3);
            assert_eq!(totals.bars, 6);
            assert!((totals.length_cm - 1000.0).abs() < 1e-9);
        }

        #[test]
        fn duplicate_zone_names_are_collapsed() {
            let schedule = Schedule::with_zones(["A", "A", "B"]);
            assert_eq!(schedule.zones().len(), 2);
            assert!(schedule.is_empty());
        }
    }
}
