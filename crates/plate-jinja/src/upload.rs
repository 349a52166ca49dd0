//! Image upload: builds the multipart request, reads the server's answer and
//! inserts the uploaded image. Sending is left to the host through
//! [`UploadTransport`] so the editor never waits on the network.

use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{Method, Request, Response, StatusCode};
use plate_core::{CommandError, Editor};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::config::UploadConfig;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid upload request: {0}")]
    Request(#[from] http::Error),
    #[error("upload failed: {0}")]
    Transport(String),
    #[error("upload failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("upload response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("upload response has no `{0}` field")]
    MissingUrl(String),
    #[error("failed to insert uploaded image: {0}")]
    Insert(#[from] CommandError),
}

impl UploadError {
    /// Text suitable for an alert shown to the author.
    pub fn user_message(&self) -> String {
        match self {
            UploadError::Status { status, body } if !body.trim().is_empty() => {
                format!("Error uploading image ({status}): {}", body.trim())
            }
            UploadError::Status { status, .. } => format!("Error uploading image ({status})"),
            other => format!("Error uploading image: {other}"),
        }
    }
}

/// A file picked by the author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub url: String,
    pub filename: Option<String>,
}

pub trait UploadTransport {
    fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, UploadError>;
}

pub struct ImageUploader<T> {
    config: UploadConfig,
    transport: T,
}

impl<T: UploadTransport> ImageUploader<T> {
    pub fn new(config: UploadConfig, transport: T) -> Self {
        Self {
            config: config.with_defaults(),
            transport,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn upload(&self, file: &UploadFile) -> Result<UploadedImage, UploadError> {
        let request = build_request(&self.config, file)?;
        log::debug!(
            "uploading {} ({} bytes) to {}",
            file.file_name,
            file.bytes.len(),
            self.config.endpoint
        );
        let response = self.transport.send(request)?;
        read_response(&self.config, response)
    }
}

/// `POST {endpoint}` with a single multipart field holding the file.
pub fn build_request(config: &UploadConfig, file: &UploadFile) -> Result<Request<Vec<u8>>, UploadError> {
    let boundary = format!("----plate-jinja-{}", Uuid::new_v4().simple());
    let body = multipart_body(&boundary, &config.field_name, file);

    let request = Request::builder()
        .method(Method::POST)
        .uri(config.endpoint.as_str())
        .header(CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .header(CONTENT_LENGTH, body.len())
        .body(body)?;
    Ok(request)
}

/// A `multipart/form-data` body with one file part named `field_name`.
fn multipart_body(boundary: &str, field_name: &str, file: &UploadFile) -> Vec<u8> {
    let content_type = match file.content_type.trim() {
        "" => "application/octet-stream",
        content_type => content_type,
    };
    let head = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
         Content-Type: {content_type}\r\n\r\n",
        quote_header_value(field_name),
        quote_header_value(&file.file_name)
    );
    let tail = format!("\r\n--{boundary}--\r\n");

    let mut body = Vec::with_capacity(head.len() + file.bytes.len() + tail.len());
    body.extend_from_slice(head.as_bytes());
    body.extend_from_slice(&file.bytes);
    body.extend_from_slice(tail.as_bytes());
    body
}

/// Any 2xx with a JSON body carrying the configured URL field is a success.
pub fn read_response(config: &UploadConfig, response: Response<Vec<u8>>) -> Result<UploadedImage, UploadError> {
    let status = response.status();
    let body = response.into_body();
    if !status.is_success() {
        return Err(UploadError::Status {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }

    let value: Value = serde_json::from_slice(&body)?;
    let url = value
        .get(&config.url_field)
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| UploadError::MissingUrl(config.url_field.clone()))?
        .to_string();
    let filename = value
        .get("filename")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(UploadedImage { url, filename })
}

/// Inserts the uploaded image after the active block.
pub fn insert_uploaded_image(editor: &mut Editor, image: &UploadedImage) -> Result<(), UploadError> {
    let mut args = json!({ "src": image.url });
    if let Some(filename) = &image.filename {
        args["alt"] = Value::String(filename.clone());
    }
    editor.run_command("image.insert", Some(args))?;
    Ok(())
}

fn quote_header_value(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .map(|c| if c == '"' { '\'' } else { c })
        .collect()
}
