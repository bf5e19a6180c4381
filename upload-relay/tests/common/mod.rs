#![allow(dead_code)]

use image::{ImageFormat, RgbImage};
use rand::Rng;
use reqwest::multipart::{Form, Part};
use secrecy::Secret;
use service_core::config::Config as CoreConfig;
use std::io::Cursor;
use std::path::PathBuf;
use tempfile::TempDir;
use upload_relay::config::{
    CompressionConfig, RelayConfig, ServerConfig, UploadConfig, UpstreamConfig, MIB,
};
use upload_relay::services::init_metrics;
use upload_relay::startup::Application;
use wiremock::MockServer;

pub const TEST_API_KEY: &str = "test-api-key";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub upstream: MockServer,
    pub spool_dir: TempDir,
    pub client: reqwest::Client,
}

/// Config pointing at `upstream_url`, spooling uploads into `spool_dir`.
pub fn test_config(upstream_url: String, spool_dir: PathBuf) -> RelayConfig {
    RelayConfig {
        common: CoreConfig {
            port: 0, // Random port
            ..CoreConfig::default()
        },
        upstream: UpstreamConfig {
            url: upstream_url,
            api_key: Secret::new(TEST_API_KEY.to_string()),
            timeout_secs: 5,
            connect_timeout_secs: 1,
            accept_invalid_certs: false,
        },
        upload: UploadConfig {
            max_file_size: 10 * MIB,
            spool_dir: Some(spool_dir),
        },
        compression: CompressionConfig::default(),
        server: ServerConfig::default(),
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawn with a fake analysis API and a private spool directory.
    /// `customize` runs on the config before the server is built.
    pub async fn spawn_with(customize: impl FnOnce(&mut RelayConfig)) -> Self {
        init_metrics().expect("Failed to install metrics recorder");

        let upstream = MockServer::start().await;
        let spool_dir = tempfile::tempdir().expect("Failed to create spool dir");

        let mut config = test_config(
            format!("{}/analyze", upstream.uri()),
            spool_dir.path().to_path_buf(),
        );
        customize(&mut config);

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            upstream,
            spool_dir,
            client,
        }
    }

    pub async fn upload(&self, form: Form) -> reqwest::Response {
        self.upload_to("/upload", form).await
    }

    pub async fn upload_to(&self, path: &str, form: Form) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .multipart(form)
            .send()
            .await
            .expect("Failed to execute upload request")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Files currently left in the spool directory.
    pub fn spooled_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.spool_dir.path())
            .expect("Failed to read spool dir")
            .map(|entry| entry.expect("Failed to read dir entry").path())
            .collect()
    }

    /// Bodies of every request the fake analysis API received.
    pub async fn forwarded_bodies(&self) -> Vec<Vec<u8>> {
        self.upstream
            .received_requests()
            .await
            .expect("Request recording is disabled")
            .into_iter()
            .map(|request| request.body)
            .collect()
    }
}

/// Single-file form as a browser would send it.
pub fn file_form(data: Vec<u8>, filename: &str, mime_type: &str) -> Form {
    let part = Part::bytes(data)
        .file_name(filename.to_string())
        .mime_str(mime_type)
        .expect("Invalid MIME type");
    Form::new().part("file", part)
}

pub fn pdf_bytes() -> Vec<u8> {
    b"%PDF-1.7\n1 0 obj\n<< /Type /Catalog >>\nendobj\ntrailer\n<< /Root 1 0 R >>\n%%EOF\n"
        .to_vec()
}

/// Image of random pixels. Noise does not compress, so an encoded PNG stays
/// close to `width * height * 3` bytes.
pub fn noisy_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let mut pixels = vec![0u8; (width * height * 3) as usize];
    rand::thread_rng().fill(&mut pixels[..]);
    let img = RgbImage::from_raw(width, height, pixels).expect("Pixel buffer size mismatch");

    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, format)
        .expect("Failed to encode test image");
    buffer.into_inner()
}

pub fn noisy_png(width: u32, height: u32) -> Vec<u8> {
    noisy_image(width, height, ImageFormat::Png)
}

/// The `file` part of a forwarded multipart body: its header block and bytes.
pub struct ForwardedPart {
    pub headers: String,
    pub data: Vec<u8>,
}

pub fn forwarded_part(body: &[u8]) -> ForwardedPart {
    let first_line_end = find(body, b"\r\n").expect("Missing opening boundary");
    let mut delimiter = b"\r\n".to_vec();
    delimiter.extend_from_slice(&body[..first_line_end]);

    let headers_start = first_line_end + 2;
    let headers_len = find(&body[headers_start..], b"\r\n\r\n").expect("Missing part headers");
    let data_start = headers_start + headers_len + 4;
    let data_len = find(&body[data_start..], &delimiter).expect("Missing closing boundary");

    ForwardedPart {
        headers: String::from_utf8_lossy(&body[headers_start..headers_start + headers_len])
            .into_owned(),
        data: body[data_start..data_start + data_len].to_vec(),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
