use std::sync::Arc;

use tracing::{debug, info, trace};

use rebar_core::entity::EntityId;

/// 计料流程的阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStage {
    Idle,
    Extracting,
    Clustering,
    Classifying,
    Zoning,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TraceOutcome {
    Parsed,
    Malformed { token: String },
    Clustered,
    Unlabeled,
    Degenerate,
    UnknownDesignation { designation: String },
    Zoned { zone: String, matched: bool },
}

/// 结构化跟踪事件：记录 ID、阶段与结果。
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEvent {
    pub record: Option<u64>,
    pub entity: Option<EntityId>,
    pub stage: BuildStage,
    pub outcome: TraceOutcome,
}

/// 注入 ScheduleBuilder 的观察者，所有方法缺省为空操作。
pub trait ScheduleObserver: Send + Sync {
    fn stage_changed(&self, _stage: BuildStage) {}

    fn event(&self, _event: &TraceEvent) {}

    /// 以记录/图元为粒度的进度回调。
    fn progress(&self, _stage: BuildStage, _done: usize, _total: usize) {}
}

/// 缺省观察者，不产生任何输出。
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl ScheduleObserver for NullObserver {}

/// 将事件转发到 `tracing`。
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ScheduleObserver for TracingObserver {
    fn stage_changed(&self, stage: BuildStage) {
        info!(stage = ?stage, "计料阶段切换");
    }

    fn event(&self, event: &TraceEvent) {
        debug!(
            record = ?event.record,
            entity = ?event.entity.map(EntityId::get),
            stage = ?event.stage,
            outcome = ?event.outcome,
            "计料事件"
        );
    }

    fn progress(&self, stage: BuildStage, done: usize, total: usize) {
        trace!(stage = ?stage, done, total, "计料进度");
    }
}

impl<T: ScheduleObserver + ?Sized> ScheduleObserver for Arc<T> {
    fn stage_changed(&self, stage: BuildStage) {
        (**self).stage_changed(stage);
    }

    fn event(&self, event: &TraceEvent) {
        (**self).event(event);
    }

    fn progress(&self, stage: BuildStage, done: usize, total: usize) {
        (**self).progress(stage, done, total);
    }
}
