pub mod upload;

pub use upload::{UploadCsvCommand, UploadError, UploadOutcome, UploadResult, FILE_FIELD};
