//! Vision-model backend client.
//!
//! [`VisionBackend`] is the only seam that crosses a process boundary. The
//! production implementation, [`OllamaClient`], talks to an Ollama-compatible
//! chat endpoint over blocking HTTP. Responses are returned verbatim.

pub mod prompt;

use std::io::ErrorKind;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::ComparisonError;
use crate::source::DocumentImage;

pub use prompt::{comparison_prompt, summary_prompt, SUMMARY_SYSTEM_PROMPT};

/// Default backend address (local Ollama server).
pub const DEFAULT_HOST: &str = "http://localhost:11434";

/// Default vision model.
pub const DEFAULT_MODEL: &str = "llava:latest";

/// Default text model for diff summaries.
pub const DEFAULT_SUMMARY_MODEL: &str = "llama3";

/// Default per-request deadline in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Something that can describe the differences between two images.
///
/// Implementations must be shareable across worker threads.
pub trait VisionBackend: Sync {
    /// Compare two images and return the backend's raw answer.
    fn compare(
        &self,
        first: &DocumentImage,
        second: &DocumentImage,
    ) -> Result<String, ComparisonError>;

    /// Model name recorded in reports.
    fn model(&self) -> &str;
}

/// Something that can answer a text-only prompt.
pub trait TextBackend: Sync {
    fn complete(&self, system: &str, prompt: &str) -> Result<String, ComparisonError>;
}

/// Connection settings for [`OllamaClient`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL, e.g. `http://localhost:11434`.
    pub host: String,
    pub model: String,
    /// Deadline for one whole request, including reading the answer.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ReplyMessage>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Blocking client for the Ollama chat API.
pub struct OllamaClient {
    agent: ureq::Agent,
    config: ClientConfig,
}

impl OllamaClient {
    pub fn new(config: ClientConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .http_status_as_error(false)
            .build();
        let agent: ureq::Agent = agent_config.into();

        Self { agent, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", normalize_host(&self.config.host))
    }

    fn classify(&self, err: ureq::Error) -> ComparisonError {
        classify_transport_error(err, self.config.timeout)
    }

    fn send(&self, request: &ChatRequest<'_>) -> Result<String, ComparisonError> {
        let url = self.chat_url();
        let mut response = self
            .agent
            .post(&url)
            .send_json(request)
            .map_err(|err| self.classify(err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.body_mut().read_to_string().unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(ComparisonError::ServiceError(format!(
                "backend returned HTTP {}: {}",
                status.as_u16(),
                detail.trim()
            )));
        }

        let reply: ChatResponse = response
            .body_mut()
            .read_json()
            .map_err(|err| self.classify(err))?;

        extract_content(reply)
    }
}

impl VisionBackend for OllamaClient {
    fn compare(
        &self,
        first: &DocumentImage,
        second: &DocumentImage,
    ) -> Result<String, ComparisonError> {
        let (first_bytes, _) = first.encoded()?;
        let (second_bytes, _) = second.encoded()?;
        let request = ChatRequest {
            model: &self.config.model,
            stream: false,
            messages: vec![ChatMessage {
                role: "user",
                content: comparison_prompt(&first.id, &second.id),
                images: vec![STANDARD.encode(first_bytes), STANDARD.encode(second_bytes)],
            }],
            options: None,
        };

        tracing::debug!(
            url = %self.chat_url(),
            model = %self.config.model,
            first = %first.id,
            second = %second.id,
            "sending comparison request"
        );
        self.send(&request)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

impl TextBackend for OllamaClient {
    fn complete(&self, system: &str, prompt: &str) -> Result<String, ComparisonError> {
        let request = ChatRequest {
            model: &self.config.model,
            stream: false,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                    images: Vec::new(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt.to_string(),
                    images: Vec::new(),
                },
            ],
            options: Some(ChatOptions {
                temperature: 0.5,
                num_predict: 500,
            }),
        };

        tracing::debug!(model = %self.config.model, "sending text request");
        self.send(&request).map(|answer| answer.trim().to_string())
    }
}

/// Accept `host:port` as well as full URLs, as `OLLAMA_HOST` allows.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

fn extract_content(reply: ChatResponse) -> Result<String, ComparisonError> {
    let content = reply
        .message
        .map(|m| m.content)
        .ok_or_else(|| ComparisonError::ServiceError("response has no message".to_string()))?;

    if content.trim().is_empty() {
        return Err(ComparisonError::ServiceError(
            "response message is empty".to_string(),
        ));
    }
    Ok(content)
}

fn classify_transport_error(err: ureq::Error, timeout: Duration) -> ComparisonError {
    let timed_out = ComparisonError::Timeout {
        seconds: timeout.as_secs(),
    };

    match err {
        ureq::Error::Timeout(_) => timed_out,
        unreachable @ (ureq::Error::HostNotFound | ureq::Error::ConnectionFailed) => {
            ComparisonError::ServiceUnavailable(unreachable.to_string())
        }
        ureq::Error::Io(io) => match io.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => timed_out,
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::AddrNotAvailable => ComparisonError::ServiceUnavailable(io.to_string()),
            _ => ComparisonError::ServiceError(io.to_string()),
        },
        ureq::Error::Json(source) => {
            ComparisonError::ServiceError(format!("malformed response body: {source}"))
        }
        other => ComparisonError::ServiceError(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn image(id: &str) -> DocumentImage {
        DocumentImage {
            id: id.to_string(),
            path: id.into(),
            content: crate::source::ImageContent::Encoded {
                bytes: vec![1, 2, 3],
                format: crate::source::ImageFormat::Png,
            },
        }
    }

    /// Serve one canned HTTP response and hand back the request body.
    fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));

            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read header");
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                let lower = line.to_ascii_lowercase();
                if let Some(value) = lower.strip_prefix("content-length:") {
                    content_length = value.trim().parse().expect("content length");
                }
            }

            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).expect("read body");

            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .expect("write response");
            stream.flush().expect("flush");

            String::from_utf8(request_body).expect("utf8 body")
        });

        (format!("http://{addr}"), handle)
    }

    fn client_for(host: String) -> OllamaClient {
        OllamaClient::new(ClientConfig {
            host,
            model: "llava:test".to_string(),
            timeout: Duration::from_secs(5),
        })
    }

    #[test]
    fn returns_message_content_and_sends_both_images() {
        let (host, handle) = serve_once(
            "200 OK",
            concat!(
                r#"{"model":"llava:test","#,
                r#""message":{"role":"assistant","content":"1. Title changed."},"done":true}"#
            ),
        );

        let client = client_for(host);
        let answer = client
            .compare(&image("f1042-1994.png"), &image("f1042-2004.png"))
            .expect("compare");
        assert_eq!(answer, "1. Title changed.");

        let sent: serde_json::Value =
            serde_json::from_str(&handle.join().expect("server thread")).expect("json request");
        assert_eq!(sent["model"], "llava:test");
        assert_eq!(sent["stream"], false);
        let message = &sent["messages"][0];
        assert_eq!(message["role"], "user");
        assert_eq!(message["images"].as_array().map(Vec::len), Some(2));
        assert_eq!(message["images"][0], "AQID");
        assert!(message["content"]
            .as_str()
            .is_some_and(|c| c.contains("f1042-1994.png and f1042-2004.png")));
    }

    #[test]
    fn empty_content_is_a_service_error() {
        let (host, handle) =
            serve_once("200 OK", r#"{"message":{"role":"assistant","content":"  "}}"#);

        let err = client_for(host)
            .compare(&image("a.png"), &image("b.png"))
            .unwrap_err();
        handle.join().expect("server thread");
        assert!(matches!(err, ComparisonError::ServiceError(_)));
    }

    #[test]
    fn http_error_status_carries_backend_message() {
        let (host, handle) = serve_once(
            "404 Not Found",
            r#"{"error":"model 'llava:test' not found"}"#,
        );

        let err = client_for(host)
            .compare(&image("a.png"), &image("b.png"))
            .unwrap_err();
        handle.join().expect("server thread");
        match err {
            ComparisonError::ServiceError(message) => {
                assert!(message.contains("404"));
                assert!(message.contains("not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn malformed_json_is_a_service_error() {
        let (host, handle) = serve_once("200 OK", "not json");

        let err = client_for(host)
            .compare(&image("a.png"), &image("b.png"))
            .unwrap_err();
        handle.join().expect("server thread");
        assert!(matches!(err, ComparisonError::ServiceError(_)));
    }

    #[test]
    fn closed_port_is_service_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let err = client_for(format!("http://{addr}"))
            .compare(&image("a.png"), &image("b.png"))
            .unwrap_err();
        assert!(
            matches!(err, ComparisonError::ServiceUnavailable(_)),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn silent_backend_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            thread::sleep(Duration::from_secs(3));
            drop(stream);
        });

        let client = OllamaClient::new(ClientConfig {
            host: format!("http://{addr}"),
            model: "llava:test".to_string(),
            timeout: Duration::from_secs(1),
        });
        let err = client.compare(&image("a.png"), &image("b.png")).unwrap_err();
        handle.join().expect("server thread");
        assert_eq!(err, ComparisonError::Timeout { seconds: 1 });
    }

    #[test]
    fn chat_url_tolerates_trailing_slash() {
        let client = client_for("http://localhost:11434/".to_string());
        assert_eq!(client.chat_url(), "http://localhost:11434/api/chat");
    }

    #[test]
    fn bare_host_port_gets_http_scheme() {
        assert_eq!(normalize_host("0.0.0.0:11434"), "http://0.0.0.0:11434");
        assert_eq!(normalize_host("https://gpu-box:443/"), "https://gpu-box:443");
    }

    #[test]
    fn unreadable_image_fails_before_any_request() {
        let client = client_for("http://127.0.0.1:9".to_string());
        let broken = DocumentImage::unreadable("f1042-2020.png", "truncated");
        let err = client.compare(&image("a.png"), &broken).unwrap_err();
        assert_eq!(
            err,
            ComparisonError::UnreadableImage {
                id: "f1042-2020.png".to_string(),
                reason: "truncated".to_string(),
            }
        );
    }

    #[test]
    fn text_completion_sends_system_prompt_and_options() {
        let (host, handle) = serve_once(
            "200 OK",
            r#"{"message":{"role":"assistant","content":"- **Name**: changed.\n"}}"#,
        );

        let answer = client_for(host)
            .complete("be precise", "summarize this")
            .expect("complete");
        assert_eq!(answer, "- **Name**: changed.");

        let sent: serde_json::Value =
            serde_json::from_str(&handle.join().expect("server thread")).expect("json request");
        assert_eq!(sent["messages"][0]["role"], "system");
        assert_eq!(sent["messages"][0]["content"], "be precise");
        assert_eq!(sent["messages"][1]["role"], "user");
        assert!(sent["messages"][1].get("images").is_none());
        assert_eq!(sent["options"]["num_predict"], 500);
    }
}
