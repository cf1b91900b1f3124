pub mod classify;
pub mod config;
pub mod engine;
pub mod extract;
pub mod window;

pub use classify::{
    classify, classify_detailed, ClassificationResult, ClassificationSummary,
    DetailedClassification, NumberClass, NumberVerdict,
};
pub use config::{AnalysisConfig, WindowConvention};
pub use engine::{
    AnalysisDataset, AnalysisEngine, AnalysisOutcome, DayData, DaySets, ExtractionNotes,
    TopicAnalysis, WindowAnalysis,
};
pub use extract::{extract, extract_with_report, parse_cell_number, Extraction, TopicMatrix};
pub use window::{
    select_window, DayLabel, DayWindow, InsufficientHistory, WindowSelection, MIN_TRIGGER_INDEX,
};
