//! Data models passed between pipeline stages

pub mod analysis;
pub mod cell;
pub mod delivery;
pub mod report;
pub mod table;

pub use analysis::{AnalysisResult, AttemptOutcome, AttemptRecord};
pub use cell::CellValue;
pub use delivery::{DeliveryRecord, DeliveryStatus};
pub use report::{ChartImage, ReportDocument, Section};
pub use table::{NormalizedRow, NormalizedTable, RawTable, TableStats, Value, round2};
