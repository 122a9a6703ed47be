use tracing::trace;

use rebar_core::entity::BoundaryZone;
use rebar_core::geometry::Point2;

pub const FALLBACK_ZONE: &str = "ALL";

/// 射线法判断点是否在多边形内。分母加 `1e-12` 以避开水平边。
pub fn point_in_polygon(point: Point2, polygon: &[Point2]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let (x, y) = (point.x(), point.y());
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (xi, yi) = (polygon[i].x(), polygon[i].y());
        let (xj, yj) = (polygon[j].x(), polygon[j].y());
        if (yi > y) != (yj > y) {
            let cross_x = (xj - xi) * (y - yi) / (yj - yi + 1e-12) + xi;
            if x < cross_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// 按声明顺序查找包含点的分区，首个命中者胜出。
#[derive(Debug, Clone)]
pub struct RegionAssigner {
    zones: Vec<BoundaryZone>,
    default_zone: String,
}

impl RegionAssigner {
    /// 缺省分区为第一个声明的分区；没有分区时使用 `fallback`。
    pub fn new(zones: Vec<BoundaryZone>, fallback: impl Into<String>) -> Self {
        let default_zone = zones
            .first()
            .map(|zone| zone.name.clone())
            .unwrap_or_else(|| fallback.into());
        Self {
            zones,
            default_zone,
        }
    }

    #[inline]
    pub fn default_zone(&self) -> &str {
        &self.default_zone
    }

    #[inline]
    pub fn zones(&self) -> &[BoundaryZone] {
        &self.zones
    }

    /// 分区名称，按声明顺序；没有分区时只有缺省分区。
    pub fn zone_names(&self) -> Vec<String> {
        if self.zones.is_empty() {
            vec![self.default_zone.clone()]
        } else {
            self.zones.iter().map(|zone| zone.name.clone()).collect()
        }
    }

    pub fn locate(&self, point: Point2) -> Option<&BoundaryZone> {
        if !point.is_finite() {
            return None;
        }
        self.zones
            .iter()
            .find(|zone| point_in_polygon(point, &zone.vertices))
    }

    /// 返回 (分区名, 是否命中)。无位置或未命中时落入缺省分区。
    pub fn assign(&self, position: Option<Point2>) -> (&str, bool) {
        match position.and_then(|point| self.locate(point)) {
            Some(zone) => (zone.name.as_str(), true),
            None => {
                trace!(default = %self.default_zone, "未命中任何分区，使用缺省分区");
                (self.default_zone.as_str(), false)
            }
        }
    }
}
