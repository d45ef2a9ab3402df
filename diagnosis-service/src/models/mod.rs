//! Domain models for the diagnosis service.

pub mod chat;
pub mod diagnosis;
pub mod media;
pub mod record;
pub mod request;

pub use chat::{ChatRequest, ChatResponse, ChatTurn};
pub use diagnosis::{DiagnosisResult, GeneratedDiagnosis, GenerationOutcome};
pub use media::{normalize_language, ImageAnalysisResponse, ModelsResponse, TranscriptionResponse};
pub use record::{NewRecord, Record};
pub use request::{DiagnosisPayload, DiagnosisRequest, Vitals};
