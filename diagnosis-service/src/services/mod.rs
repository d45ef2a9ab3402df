pub mod assistant;
pub mod database;
pub mod extractor;
pub mod generator;
pub mod logger;
pub mod metrics;
pub mod pipeline;
pub mod providers;

pub use assistant::ChatAssistant;
pub use database::{RecordStore, SqliteRecordStore};
pub use extractor::DiseaseExtractor;
pub use generator::{DiagnosisGenerator, GeneratorSettings};
pub use logger::RecordLogger;
pub use pipeline::DiagnosisPipeline;
