pub mod hrv;
pub mod interval;
pub mod rr;

pub use hrv::{hrv, HrvAnalyzer, HrvIndices, HrvReport, StandardHrv, EXPECTED_HRV_KEYS};
pub use interval::{ecg_analysis, EcgAnalysis};
pub use rr::{
    arrhythmia_summary, classify_arrhythmia, rr_statistics, ArrhythmiaFlags, ArrhythmiaSummary,
    RRStatistics,
};
