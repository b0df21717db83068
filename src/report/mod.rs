//! Report data model.
//!
//! - [`ReportConfig`]: the validated, immutable request descriptor
//! - [`ReportRecord`]: the structured report produced by extraction and
//!   enriched with chart rendering metadata
//! - [`ProgressEvent`] / [`PipelineEvent`]: the streamed status of a run

pub mod config;
pub mod progress;
pub mod record;

pub use config::{AnalysisType, OutputFormat, ReportConfig};
pub use progress::{Phase, PipelineEvent, PipelineFailure, ProgressEvent};
pub use record::{
    AxisOptions, ChartDataset, ChartOptions, ChartSpec, ChartType, FontOptions, GridOptions,
    LegendOptions, MarketSize, PluginOptions, ReportRecord, ScaleOptions, TitleOptions,
};
