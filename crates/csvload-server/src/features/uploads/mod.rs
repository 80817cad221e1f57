pub mod commands;
pub mod routes;

pub use commands::{UploadCsvCommand, UploadError, UploadOutcome, UploadResult};

pub use routes::uploads_routes;
