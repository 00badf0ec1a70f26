//! Pipeline components
//!
//! - upload_validator: multipart parsing and rejection rules
//! - progress_tracker: Process lifecycle, best-effort updates
//! - analysis_client: seam to the speech/categorization capability
//! - fanout_writer: one documentation entry per analysis result
//! - orchestrator: detached background run tying the above together

pub mod analysis_client;
pub mod fanout_writer;
pub mod orchestrator;
pub mod progress_tracker;
pub mod upload_validator;

pub use analysis_client::{
    AnalysisError, AnalysisRequest, AudioAnalyzer, HttpAudioAnalyzer, PROCESS_ID_HEADER,
};
pub use fanout_writer::{DocumentationStore, FanoutError, FanoutWriter};
pub use orchestrator::{AnalysisJob, AnalysisOrchestrator, PipelineError, PipelineOutcome};
pub use progress_tracker::{ProcessStore, ProgressTracker};
pub use upload_validator::{UploadError, UploadValidator, ValidatedUpload};
