pub mod cluster;
pub mod notation;
pub mod observer;
pub mod schedule;
pub mod weights;
pub mod zoning;

pub use cluster::{ClusterLabel, EntityClusterer, EntityGroup};
pub use notation::{NotationParser, ParseOutcome, classify};
pub use observer::{
    BuildStage, NullObserver, ScheduleObserver, TraceEvent, TraceOutcome, TracingObserver,
};
pub use schedule::{CancellationToken, ScheduleBuilder, ScheduleSettings};
pub use weights::{BarProperties, BendRadiusTable, WeightTable};
pub use zoning::{RegionAssigner, point_in_polygon};

pub mod errors {
    use thiserror::Error;

    use crate::observer::BuildStage;

    #[derive(Debug, Error)]
    pub enum ScheduleError {
        #[error("zone `{name}` has an invalid polygon ({vertices} vertices)")]
        InvalidZone { name: String, vertices: usize },
        #[error("zone `{name}` is declared more than once")]
        DuplicateZone { name: String },
        #[error("schedule build cancelled during {stage:?}")]
        Cancelled { stage: BuildStage },
    }
}
