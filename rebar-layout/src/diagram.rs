use serde::{Deserialize, Serialize};
use tracing::trace;

use rebar_core::geometry::{Bounds2D, Point2, Vector2};
use rebar_core::rebar::{
    NotationFamily, RebarRecord, RebarSpec, ShapeKind, StirrupKind, format_length,
};

use crate::hooks::HookLengthTable;

const RIGHT_ANGLE: f64 = 90.0;
const ANGLE_EPSILON: f64 = 1e-6;
const MIN_HOOK: f64 = 4.0;

/// 示意图画布参数，单位为抽象画布单位。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutOptions {
    /// 直料固定画长，与实际长度无关。
    pub straight_length: f64,
    pub leg_length: f64,
    pub run_length: f64,
    /// 折料两臂的画长。
    pub arm_length: f64,
    pub label_margin: f64,
    pub canvas_width: f64,
    pub canvas_height: f64,
    /// 半圆弧离散成的弦数。
    pub arc_segments: usize,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            straight_length: 200.0,
            leg_length: 80.0,
            run_length: 220.0,
            arm_length: 120.0,
            label_margin: 12.0,
            canvas_width: 260.0,
            canvas_height: 120.0,
            arc_segments: 24,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    Length,
    Angle,
    Radius,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramLabel {
    pub position: Point2,
    pub text: String,
    pub kind: LabelKind,
}

/// 抽象示意图：线段、标注与包围框。栅格化由渲染方负责。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramLayout {
    pub segments: Vec<(Point2, Point2)>,
    pub labels: Vec<DiagramLabel>,
    pub bounds: Bounds2D,
}

impl DiagramLayout {
    pub fn labels_of(&self, kind: LabelKind) -> impl Iterator<Item = &DiagramLabel> + '_ {
        self.labels.iter().filter(move |label| label.kind == kind)
    }
}

#[derive(Debug, Default)]
struct Canvas {
    segments: Vec<(Point2, Point2)>,
    labels: Vec<DiagramLabel>,
}

impl Canvas {
    fn line(&mut self, start: Point2, end: Point2) {
        self.segments.push((start, end));
    }

    fn polyline(&mut self, points: &[Point2]) {
        for pair in points.windows(2) {
            self.line(pair[0], pair[1]);
        }
    }

    fn label(&mut self, position: Point2, text: String, kind: LabelKind) {
        self.labels.push(DiagramLabel {
            position,
            text,
            kind,
        });
    }

    /// 在线段中点沿法向偏移 `margin` 处放置长度标注；`side` 为 +1 取左侧，-1 取右侧。
    fn segment_label(&mut self, start: Point2, end: Point2, value: f64, margin: f64, side: f64) {
        let normal = Vector2::from_points(start, end)
            .normalize()
            .map(|dir| dir.perp())
            .unwrap_or(Vector2::new(0.0, 1.0));
        let position = start.midpoint(end).translate(normal.scale(margin * side));
        self.label(position, format_length(value), LabelKind::Length);
    }

    fn finish(self) -> DiagramLayout {
        let points = self
            .segments
            .iter()
            .flat_map(|(start, end)| [*start, *end])
            .chain(self.labels.iter().map(|label| label.position));
        let bounds = Bounds2D::from_points(points)
            .unwrap_or_else(|| Bounds2D::new(Point2::new(0.0, 0.0), Point2::new(0.0, 0.0)));
        DiagramLayout {
            segments: self.segments,
            labels: self.labels,
            bounds,
        }
    }
}

fn polar(center: Point2, radius: f64, degrees: f64) -> Point2 {
    center.translate(Vector2::from_angle_degrees(degrees).scale(radius))
}

fn segment(spec: &RebarSpec, index: usize) -> f64 {
    spec.segments.get(index).copied().unwrap_or(0.0)
}

/// 弧所张角度：`min(180°, 弧长/半径)`，半径缺失或为 0 时取 90°。
pub fn arc_sweep_degrees(arc_length: f64, radius: f64) -> f64 {
    if radius.is_nan() || radius <= 0.0 || !radius.is_finite() {
        return RIGHT_ANGLE;
    }
    let sweep = (arc_length / radius).to_degrees();
    if sweep > 0.0 && sweep.is_finite() {
        sweep.min(180.0)
    } else {
        RIGHT_ANGLE
    }
}

/// 将 RebarSpec 转为抽象示意图。
#[derive(Debug, Clone, Default)]
pub struct ShapeDiagramLayout {
    options: LayoutOptions,
    hooks: HookLengthTable,
}

impl ShapeDiagramLayout {
    pub fn new(options: LayoutOptions, hooks: HookLengthTable) -> Self {
        Self { options, hooks }
    }

    #[inline]
    pub fn options(&self) -> &LayoutOptions {
        &self.options
    }

    pub fn layout_record(&self, record: &RebarRecord) -> DiagramLayout {
        self.layout(&record.spec)
    }

    pub fn layout(&self, spec: &RebarSpec) -> DiagramLayout {
        let mut canvas = Canvas::default();
        match spec.shape {
            ShapeKind::Straight if spec.family == NotationFamily::Anchor => {
                self.anchored(&mut canvas, spec)
            }
            ShapeKind::Straight | ShapeKind::Unknown => self.straight(&mut canvas, spec),
            ShapeKind::Hooked => self.hooked(&mut canvas, spec),
            ShapeKind::U => self.u_shape(&mut canvas, spec),
            ShapeKind::NShape => self.n_shape(&mut canvas, spec),
            ShapeKind::Stepped => self.staircase(&mut canvas, spec),
            ShapeKind::Bent if spec.segments.len() == 2 => self.bent(&mut canvas, spec),
            ShapeKind::Bent => self.staircase(&mut canvas, spec),
            ShapeKind::Arc => self.arc(&mut canvas, spec, None),
            ShapeKind::SteppedArc => {
                let tail = segment(spec, 0);
                self.arc(&mut canvas, spec, Some(tail))
            }
            ShapeKind::Stirrup(kind) => self.stirrup(&mut canvas, spec, kind),
            ShapeKind::Tie(_) => self.tie(&mut canvas, spec),
        }
        let layout = canvas.finish();
        trace!(
            designation = spec.designation.as_str(),
            shape = ?spec.shape,
            segments = layout.segments.len(),
            labels = layout.labels.len(),
            "示意图布局完成"
        );
        layout
    }

    fn straight(&self, canvas: &mut Canvas, spec: &RebarSpec) {
        let start = Point2::new(0.0, 0.0);
        let end = Point2::new(self.options.straight_length, 0.0);
        canvas.line(start, end);
        canvas.segment_label(start, end, spec.total_length(), self.options.label_margin, -1.0);
    }

    /// 安全弯钩直料：直料右端加小弯钩。
    fn anchored(&self, canvas: &mut Canvas, spec: &RebarSpec) {
        self.straight(canvas, spec);
        let end = Point2::new(self.options.straight_length, 0.0);
        let hook = (self.options.leg_length * 0.2).max(MIN_HOOK);
        canvas.line(end, end.translate(Vector2::new(0.0, hook)));
    }

    fn hooked(&self, canvas: &mut Canvas, spec: &RebarSpec) {
        let leg = self.options.leg_length;
        let run = self.options.run_length;
        let margin = self.options.label_margin;
        let top = Point2::new(0.0, leg);
        let corner = Point2::new(0.0, 0.0);
        let end = Point2::new(run, 0.0);
        canvas.polyline(&[top, corner, end]);
        canvas.segment_label(top, corner, segment(spec, 0), margin, -1.0);
        canvas.segment_label(corner, end, segment(spec, 1), margin, -1.0);
    }

    fn u_shape(&self, canvas: &mut Canvas, spec: &RebarSpec) {
        let leg = self.options.leg_length;
        let run = self.options.run_length;
        let margin = self.options.label_margin;
        let points = [
            Point2::new(0.0, leg),
            Point2::new(0.0, 0.0),
            Point2::new(run, 0.0),
            Point2::new(run, leg),
        ];
        canvas.polyline(&points);
        for (index, pair) in points.windows(2).enumerate() {
            canvas.segment_label(pair[0], pair[1], segment(spec, index), margin, -1.0);
        }
    }

    /// 两段同向向下的短竖段，中间以水平段相连。
    fn n_shape(&self, canvas: &mut Canvas, spec: &RebarSpec) {
        let drop = self.options.leg_length * 0.4;
        let span = self.options.leg_length;
        let margin = self.options.label_margin;
        let points = [
            Point2::new(0.0, 0.0),
            Point2::new(0.0, -drop),
            Point2::new(span, -drop),
            Point2::new(span, -2.0 * drop),
        ];
        canvas.polyline(&points);
        for (index, pair) in points.windows(2).enumerate() {
            canvas.segment_label(pair[0], pair[1], segment(spec, index), margin, 1.0);
        }
    }

    /// 第一段水平，第二段相对第一段旋转 `180° - 角度`，角度标在折点处。
    fn bent(&self, canvas: &mut Canvas, spec: &RebarSpec) {
        let arm = self.options.arm_length;
        let margin = self.options.label_margin;
        let angle = spec.angles.first().copied().unwrap_or(RIGHT_ANGLE);
        let theta = 180.0 - angle;

        let start = Point2::new(-arm, 0.0);
        let vertex = Point2::new(0.0, 0.0);
        let end = polar(vertex, arm, theta);
        canvas.polyline(&[start, vertex, end]);
        canvas.segment_label(start, vertex, segment(spec, 0), margin, -1.0);
        canvas.segment_label(vertex, end, segment(spec, 1), margin, -1.0);

        let bisector = (Vector2::from_points(vertex, start)
            .normalize()
            .map(|v| v.as_vec2())
            .unwrap_or_default()
            + Vector2::from_points(vertex, end)
                .normalize()
                .map(|v| v.as_vec2())
                .unwrap_or_default())
        .normalize_or_zero();
        let direction = if bisector.length_squared() > 0.0 {
            Vector2::from(bisector)
        } else {
            Vector2::new(0.0, 1.0)
        };
        canvas.label(
            vertex.translate(direction.scale(margin)),
            format!("{}°", format_length(angle)),
            LabelKind::Angle,
        );
    }

    /// 通用阶梯：向右、向下交替的直角折线，每段一个标注，仅非 90° 的折角标注角度。
    fn staircase(&self, canvas: &mut Canvas, spec: &RebarSpec) {
        let count = spec.segments.len().max(1);
        let horizontal = count.div_ceil(2);
        let vertical = (count / 2).max(1);
        let step_x = self.options.canvas_width / horizontal as f64;
        let step_y = self.options.canvas_height * 0.5 / vertical as f64;
        let margin = self.options.label_margin;

        let mut cursor = Point2::new(0.0, 0.0);
        for index in 0..count {
            let offset = if index % 2 == 0 {
                Vector2::new(step_x, 0.0)
            } else {
                Vector2::new(0.0, -step_y)
            };
            let next = cursor.translate(offset);
            canvas.line(cursor, next);
            canvas.segment_label(cursor, next, segment(spec, index), margin, 1.0);
            if index + 1 < count {
                if let Some(angle) = spec.angles.get(index).copied() {
                    if (angle - RIGHT_ANGLE).abs() > ANGLE_EPSILON {
                        canvas.label(
                            next.translate(Vector2::new(margin, margin)),
                            format!("{}°", format_length(angle)),
                            LabelKind::Angle,
                        );
                    }
                }
            }
            cursor = next;
        }
    }

    /// 向下开口的圆弧；`tail` 为直段+弧段的直段长度，弧长取最后一段。
    fn arc(&self, canvas: &mut Canvas, spec: &RebarSpec, tail: Option<f64>) {
        let margin = self.options.label_margin;
        let arc_length = spec.segments.last().copied().unwrap_or(0.0);
        let radius = spec.radius.unwrap_or(0.0);
        let sweep = arc_sweep_degrees(arc_length, radius);
        let canvas_radius = self.options.run_length * 0.5;
        let center = Point2::new(0.0, 0.0);
        let start_angle = 90.0 + sweep * 0.5;

        let steps = ((self.options.arc_segments.max(2) as f64) * sweep / 180.0)
            .ceil()
            .max(2.0) as usize;
        let points: Vec<Point2> = (0..=steps)
            .map(|step| {
                let t = step as f64 / steps as f64;
                polar(center, canvas_radius, start_angle - sweep * t)
            })
            .collect();
        canvas.polyline(&points);

        if let (Some(tail_length), Some(first)) = (tail, points.first().copied()) {
            let radians = start_angle.to_radians();
            let tangent = Vector2::new(radians.sin(), -radians.cos());
            let tail_start = first.translate(tangent.scale(-self.options.leg_length));
            canvas.line(tail_start, first);
            canvas.segment_label(tail_start, first, tail_length, margin, 1.0);
        }

        canvas.label(
            Point2::new(0.0, canvas_radius + margin),
            format_length(arc_length),
            LabelKind::Length,
        );
        canvas.label(
            Point2::new(0.0, -margin),
            format!("R{}", format_length(radius)),
            LabelKind::Radius,
        );
    }

    fn stirrup(&self, canvas: &mut Canvas, spec: &RebarSpec, kind: StirrupKind) {
        let margin = self.options.label_margin;
        let real_width = segment(spec, 0);
        let real_height = segment(spec, 1);
        let scale = self.stirrup_scale(real_width, real_height);
        let w = real_width * scale;
        let h = real_height * scale;
        let hook = (self.hooks.length_cm(&spec.designation) * scale)
            .min(0.5 * w.min(h))
            .max(MIN_HOOK);

        let origin = Point2::new(0.0, 0.0);
        let bottom_right = Point2::new(w, 0.0);
        let top_right = Point2::new(w, h);
        let top_left = Point2::new(0.0, h);
        let diagonal = Vector2::from_angle_degrees(45.0);

        match kind {
            StirrupKind::Ground | StirrupKind::Column | StirrupKind::Wall => {
                canvas.polyline(&[origin, bottom_right, top_right, top_left, origin]);
                let bend = if kind == StirrupKind::Wall { 90.0 } else { 45.0 };
                let direction = Vector2::from_angle_degrees(bend);
                let left_hook = Vector2::new(-direction.x(), direction.y());
                canvas.line(top_left, top_left.translate(left_hook.scale(hook)));
                if kind == StirrupKind::Ground {
                    let up = top_right.translate(Vector2::new(0.0, hook));
                    canvas.polyline(&[top_right, up, up.translate(Vector2::new(-hook, 0.0))]);
                } else {
                    canvas.line(top_right, top_right.translate(direction.scale(hook)));
                }
            }
            StirrupKind::U => {
                canvas.polyline(&[
                    Point2::new(hook, h),
                    top_left,
                    origin,
                    bottom_right,
                    top_right,
                    Point2::new(w - hook, h),
                ]);
            }
            StirrupKind::L => {
                canvas.polyline(&[top_left, origin, bottom_right]);
                canvas.line(bottom_right, bottom_right.translate(Vector2::new(hook, 0.0)));
                let inward = Vector2::new(diagonal.x(), -diagonal.y());
                canvas.line(top_left, top_left.translate(inward.scale(hook)));
            }
            StirrupKind::Half => {
                canvas.polyline(&[
                    Point2::new(0.0, hook),
                    origin,
                    top_right,
                    Point2::new(w, h - hook),
                ]);
                canvas.line(origin, origin.translate(diagonal.scale(-hook)));
                canvas.line(top_right, top_right.translate(diagonal.scale(hook)));
            }
        }

        canvas.segment_label(origin, bottom_right, real_width, margin, -1.0);
        canvas.segment_label(top_left, origin, real_height, margin, -1.0);
    }

    fn stirrup_scale(&self, width: f64, height: f64) -> f64 {
        let available_w = self.options.canvas_width * 0.7;
        let available_h = self.options.canvas_height * 0.7;
        let scale = match (width > 0.0, height > 0.0) {
            (true, true) => (available_w / width).min(available_h / height),
            (true, false) => available_w / width,
            (false, true) => available_h / height,
            (false, false) => 1.0,
        };
        if scale.is_finite() && scale > 0.0 { scale } else { 1.0 }
    }

    /// 繫筋：直段两端各一个 135° 弯钩，弯向同侧。
    fn tie(&self, canvas: &mut Canvas, spec: &RebarSpec) {
        let length = self.options.straight_length * 0.6;
        let scale = if spec.total_length() > 0.0 {
            length / spec.total_length()
        } else {
            1.0
        };
        let hook = (self.hooks.length_cm(&spec.designation) * scale)
            .min(length * 0.25)
            .max(MIN_HOOK);
        let start = Point2::new(0.0, 0.0);
        let end = Point2::new(length, 0.0);
        let diagonal = Vector2::from_angle_degrees(45.0);

        canvas.line(start, end);
        canvas.line(
            start,
            start.translate(Vector2::new(diagonal.x(), -diagonal.y()).scale(hook)),
        );
        canvas.line(
            end,
            end.translate(Vector2::new(-diagonal.x(), -diagonal.y()).scale(hook)),
        );
        canvas.segment_label(start, end, spec.total_length(), self.options.label_margin, 1.0);
    }
}
