use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use rebar_core::entity::{BoundaryZone, DrawingSnapshot, EntityId, RawEntity, ZONE_LAYER_PREFIX};
use rebar_core::geometry::Point2;
use rebar_core::rebar::{NotationFamily, RebarRecord, RebarSpec, RecordSource, ShapeKind};
use rebar_core::schedule::{BuildStats, Schedule};

use crate::cluster::{ClusterLabel, DEFAULT_TEXT_WIDTH_FACTOR, DEFAULT_TOLERANCE, EntityClusterer};
use crate::errors::ScheduleError;
use crate::notation::{NotationParser, ParseOutcome, classify_designated};
use crate::observer::{BuildStage, NullObserver, ScheduleObserver, TraceEvent, TraceOutcome};
use crate::weights::{BendRadiusTable, WeightTable};
use crate::zoning::{FALLBACK_ZONE, RegionAssigner};

const DEFAULT_BEND_ANGLE: f64 = 90.0;

/// 计料流程的可调参数。
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleSettings {
    pub cluster_tolerance: f64,
    pub text_width_factor: f64,
    /// 图面单位与厘米的换算，仅用于聚类得到的几何长度。
    pub drawing_units_per_cm: f64,
    pub default_zone: String,
    pub zone_layer_prefix: String,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            cluster_tolerance: DEFAULT_TOLERANCE,
            text_width_factor: DEFAULT_TEXT_WIDTH_FACTOR,
            drawing_units_per_cm: 1.0,
            default_zone: FALLBACK_ZONE.to_string(),
            zone_layer_prefix: ZONE_LAYER_PREFIX.to_string(),
        }
    }
}

impl ScheduleSettings {
    fn units_per_cm(&self) -> f64 {
        if self.drawing_units_per_cm.is_finite() && self.drawing_units_per_cm > 0.0 {
            self.drawing_units_per_cm
        } else {
            1.0
        }
    }
}

/// 协作式取消标记，在阶段之间轮询。
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct Candidate {
    spec: RebarSpec,
    position: Option<Point2>,
    source: RecordSource,
}

/// 计料主流程：标注解析 → 几何聚类 → 查表 → 分区。
pub struct ScheduleBuilder {
    parser: NotationParser,
    clusterer: EntityClusterer,
    weights: WeightTable,
    bend_radii: BendRadiusTable,
    settings: ScheduleSettings,
    observer: Box<dyn ScheduleObserver>,
    cancel: CancellationToken,
}

impl Default for ScheduleBuilder {
    fn default() -> Self {
        Self::new(ScheduleSettings::default())
    }
}

impl ScheduleBuilder {
    pub fn new(settings: ScheduleSettings) -> Self {
        Self {
            parser: NotationParser::new(),
            clusterer: EntityClusterer::new(settings.cluster_tolerance, settings.text_width_factor),
            weights: WeightTable::standard(),
            bend_radii: BendRadiusTable::standard(),
            settings,
            observer: Box::new(NullObserver),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_weights(mut self, weights: WeightTable) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_bend_radii(mut self, bend_radii: BendRadiusTable) -> Self {
        self.bend_radii = bend_radii;
        self
    }

    pub fn with_observer(mut self, observer: impl ScheduleObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// 返回与本构建器共享的取消标记。
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[inline]
    pub fn settings(&self) -> &ScheduleSettings {
        &self.settings
    }

    #[inline]
    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    /// 从快照中提取 `$P-*` 分区后构建。
    pub fn build_snapshot(&self, snapshot: &DrawingSnapshot) -> Result<Schedule, ScheduleError> {
        let zones = snapshot.zones(&self.settings.zone_layer_prefix);
        self.build(&snapshot.entities, &zones)
    }

    /// 构建分区计料表。单个图元的问题只计入统计，分区多边形无效或被取消时返回错误。
    pub fn build(
        &self,
        entities: &[RawEntity],
        zones: &[BoundaryZone],
    ) -> Result<Schedule, ScheduleError> {
        self.observer.stage_changed(BuildStage::Idle);
        validate_zones(zones)?;

        let mut stats = BuildStats::default();
        let mut consumed = vec![false; entities.len()];
        let mut candidates: Vec<Candidate> = Vec::new();

        self.enter(BuildStage::Extracting)?;
        self.extract(entities, &mut consumed, &mut candidates, &mut stats);

        self.enter(BuildStage::Clustering)?;
        self.recover_clusters(entities, &consumed, &mut candidates, &mut stats);

        self.enter(BuildStage::Classifying)?;
        let records = self.classify(candidates, &mut stats);

        self.enter(BuildStage::Zoning)?;
        let mut schedule = self.assign_zones(records, zones, &mut stats);
        schedule.set_stats(stats);

        self.observer.stage_changed(BuildStage::Done);
        debug!(
            records = schedule.len(),
            zones = schedule.zones().len(),
            skipped = stats.skipped(),
            "计料表构建完成"
        );
        Ok(schedule)
    }

    fn enter(&self, stage: BuildStage) -> Result<(), ScheduleError> {
        if self.cancel.is_cancelled() {
            debug!(stage = ?stage, "计料已取消");
            return Err(ScheduleError::Cancelled { stage });
        }
        self.observer.stage_changed(stage);
        Ok(())
    }

    fn emit(
        &self,
        stage: BuildStage,
        record: Option<u64>,
        entity: Option<EntityId>,
        outcome: TraceOutcome,
    ) {
        self.observer.event(&TraceEvent {
            record,
            entity,
            stage,
            outcome,
        });
    }

    fn extract(
        &self,
        entities: &[RawEntity],
        consumed: &mut [bool],
        candidates: &mut Vec<Candidate>,
        stats: &mut BuildStats,
    ) {
        let stage = BuildStage::Extracting;
        let total = entities.iter().filter(|entity| entity.is_text()).count();
        let mut done = 0;
        for (index, entity) in entities.iter().enumerate() {
            if !entity.is_text() {
                continue;
            }
            stats.text_entities += 1;
            let id = EntityId::new(index as u64);
            for (line, text) in entity.text_lines().into_iter().enumerate() {
                match self.parser.parse_detailed(text) {
                    ParseOutcome::Parsed(spec) => {
                        consumed[index] = true;
                        stats.parsed_records += 1;
                        self.emit(stage, None, Some(id), TraceOutcome::Parsed);
                        candidates.push(Candidate {
                            spec,
                            position: entity.insert,
                            source: RecordSource::Notation { entity: id, line },
                        });
                    }
                    ParseOutcome::Miss => stats.parse_misses += 1,
                    ParseOutcome::Malformed { token, .. } => {
                        // 已判定为格式错误的标注不再参与聚类
                        consumed[index] = true;
                        stats.malformed_notation += 1;
                        self.emit(stage, None, Some(id), TraceOutcome::Malformed { token });
                    }
                }
            }
            done += 1;
            self.observer.progress(stage, done, total);
        }
    }

    fn recover_clusters(
        &self,
        entities: &[RawEntity],
        consumed: &[bool],
        candidates: &mut Vec<Candidate>,
        stats: &mut BuildStats,
    ) {
        let stage = BuildStage::Clustering;
        let prefix = self.settings.zone_layer_prefix.as_str();
        let indices: Vec<usize> = entities
            .iter()
            .enumerate()
            .filter(|(index, entity)| !consumed[*index] && !entity.is_zone_boundary(prefix))
            .map(|(index, _)| index)
            .collect();
        let leftover: Vec<&RawEntity> = indices.iter().map(|index| &entities[*index]).collect();

        for (index, entity) in indices.iter().zip(&leftover) {
            if entity.is_geometry() && entity.geometry_length().is_none() {
                stats.degenerate_geometry += 1;
                let id = EntityId::new(*index as u64);
                self.emit(stage, None, Some(id), TraceOutcome::Degenerate);
            }
        }

        let groups = self.clusterer.cluster(&leftover);
        stats.clustered_groups = groups.len();
        for (done, group) in groups.iter().enumerate() {
            let members: Vec<EntityId> = group
                .members
                .iter()
                .map(|member| EntityId::new(indices[*member] as u64))
                .collect();
            let first = members.first().copied();
            let label = self.clusterer.classify(group, &leftover);
            match label.designation.as_deref() {
                None => {
                    stats.unlabeled_groups += 1;
                    self.emit(stage, None, first, TraceOutcome::Unlabeled);
                }
                Some(_) if label.segments.is_empty() => {
                    self.emit(stage, None, first, TraceOutcome::Degenerate);
                }
                Some(designation) => {
                    let raw_text = group
                        .members
                        .iter()
                        .map(|member| leftover[*member])
                        .filter(|entity| entity.is_text())
                        .map(|entity| entity.text.trim())
                        .collect::<Vec<_>>()
                        .join(" ");
                    let spec = self.cluster_spec(designation, &label, raw_text);
                    stats.clustered_records += 1;
                    self.emit(stage, None, first, TraceOutcome::Clustered);
                    candidates.push(Candidate {
                        spec,
                        position: group.bounds.map(|bounds| bounds.center()),
                        source: RecordSource::Cluster { entities: members },
                    });
                }
            }
            self.observer.progress(stage, done + 1, groups.len());
        }
    }

    fn cluster_spec(&self, designation: &str, label: &ClusterLabel, raw_text: String) -> RebarSpec {
        let units = self.settings.units_per_cm();
        let segments: Vec<f64> = label
            .segments
            .iter()
            .map(|length| round_tenth(length / units))
            .collect();
        let shape = classify_designated(designation, &segments);
        let angles = if shape == ShapeKind::Bent {
            vec![DEFAULT_BEND_ANGLE; segments.len() - 1]
        } else {
            Vec::new()
        };
        RebarSpec {
            designation: designation.to_string(),
            segments,
            angles,
            radius: None,
            count: label.count.unwrap_or(1).max(1),
            shape,
            family: NotationFamily::Cluster,
            explicit_total: None,
            note: label.note.clone(),
            raw_text,
        }
    }

    fn classify(&self, candidates: Vec<Candidate>, stats: &mut BuildStats) -> Vec<RebarRecord> {
        let stage = BuildStage::Classifying;
        let total = candidates.len();
        let mut records = Vec::with_capacity(total);
        for (index, candidate) in candidates.into_iter().enumerate() {
            let id = index as u64;
            let spec = candidate.spec;
            let known = self.weights.contains(&spec.designation);
            if !known {
                stats.unknown_designations += 1;
                self.emit(
                    stage,
                    Some(id),
                    None,
                    TraceOutcome::UnknownDesignation {
                        designation: spec.designation.clone(),
                    },
                );
            }
            let properties = self.weights.lookup(&spec.designation);
            let total_length_cm = spec.total_length();
            let total_weight_kg = self
                .weights
                .weight(&spec.designation, total_length_cm, spec.count);
            let bend_radius_mm = self
                .bend_radii
                .radius_mm(&spec.designation, properties.diameter_mm);
            records.push(RebarRecord {
                id,
                spec,
                diameter_mm: properties.diameter_mm,
                unit_weight_kg_per_m: properties.unit_weight_kg_per_m,
                grade: properties.grade,
                bend_radius_mm,
                total_length_cm,
                total_weight_kg,
                zone: String::new(),
                position: candidate.position,
                source: candidate.source,
                unknown_designation: !known,
            });
            self.observer.progress(stage, index + 1, total);
        }
        records
    }

    fn assign_zones(
        &self,
        records: Vec<RebarRecord>,
        zones: &[BoundaryZone],
        stats: &mut BuildStats,
    ) -> Schedule {
        let stage = BuildStage::Zoning;
        let assigner = RegionAssigner::new(zones.to_vec(), self.settings.default_zone.clone());
        let mut schedule = Schedule::with_zones(assigner.zone_names());
        let total = records.len();
        for (done, mut record) in records.into_iter().enumerate() {
            let (zone, matched) = assigner.assign(record.position);
            if !matched && !zones.is_empty() {
                stats.zone_misses += 1;
            }
            record.zone = zone.to_string();
            self.emit(
                stage,
                Some(record.id),
                None,
                TraceOutcome::Zoned {
                    zone: record.zone.clone(),
                    matched,
                },
            );
            schedule.push_record(record);
            self.observer.progress(stage, done + 1, total);
        }
        schedule
    }
}

fn validate_zones(zones: &[BoundaryZone]) -> Result<(), ScheduleError> {
    let mut seen = HashSet::new();
    for zone in zones {
        if !zone.is_valid() {
            return Err(ScheduleError::InvalidZone {
                name: zone.name.clone(),
                vertices: zone.vertices.len(),
            });
        }
        if !seen.insert(zone.name.as_str()) {
            return Err(ScheduleError::DuplicateZone {
                name: zone.name.clone(),
            });
        }
    }
    Ok(())
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
