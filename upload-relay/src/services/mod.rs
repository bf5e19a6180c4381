pub mod compressor;
pub mod metrics;
pub mod multipart;
pub mod relay_client;

pub use compressor::{should_compress, transcode_to_jpeg, try_compress, CompressionError};
pub use metrics::{
    get_metrics, init_metrics, record_compression, record_upload, record_upload_size,
    record_upstream,
};
pub use multipart::{extract_single_file, FILE_FIELD};
pub use relay_client::{RelayClient, API_KEY_HEADER};
