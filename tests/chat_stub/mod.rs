use std::io::Read as _;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::Context as _;
use serde_json::Value;

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum VerdictBehavior {
    /// One verdict per job; approve jobs whose title contains the needle,
    /// scoring them 9 and everything else 2.
    ApproveTitlesContaining(String),
    /// Same verdicts as `ApproveTitlesContaining`, wrapped as `{key: [...]}`.
    WrappedApprovals { key: String, needle: String },
    /// A single verdict object regardless of batch size.
    SingleObject { should_apply: bool, match_score: String },
    /// Content that is not JSON at all.
    Malformed,
}

pub struct ChatStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Value>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

#[allow(dead_code)]
impl ChatStub {
    pub fn spawn(behavior: VerdictBehavior) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start chat stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/v1");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                if request.method() != &tiny_http::Method::Post || path != "/v1/chat/completions"
                {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                }

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }

                let parsed: Value = match serde_json::from_str(&body) {
                    Ok(value) => value,
                    Err(_) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string("invalid json").with_status_code(400),
                        );
                        continue;
                    }
                };
                recorded.lock().expect("record request").push(parsed.clone());

                let Some(prompt) = parsed
                    .pointer("/messages/0/content")
                    .and_then(|v| v.as_str())
                else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("missing user message")
                            .with_status_code(400),
                    );
                    continue;
                };

                let content = match verdicts_response(prompt, &behavior) {
                    Ok(text) => text,
                    Err(err) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string(format!(
                                "failed to build verdicts: {err}"
                            ))
                            .with_status_code(400),
                        );
                        continue;
                    }
                };

                let response_body = serde_json::json!({
                    "id": "chatcmpl_stub",
                    "object": "chat.completion",
                    "model": parsed.get("model").cloned().unwrap_or(Value::String("stub-model".to_owned())),
                    "choices": [
                        {
                            "index": 0,
                            "finish_reason": "stop",
                            "message": { "role": "assistant", "content": content }
                        }
                    ]
                });

                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("build header");
                let response = tiny_http::Response::from_string(response_body.to_string())
                    .with_status_code(200)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().expect("read requests").clone()
    }
}

impl Drop for ChatStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn extract_between<'a>(text: &'a str, begin: &str, end: &str) -> Option<&'a str> {
    let start = text.find(begin)? + begin.len();
    let rest = &text[start..];
    let end_rel = rest.find(end)?;
    Some(&rest[..end_rel])
}

/// Jobs embedded in a scoring prompt.
pub fn prompt_jobs(prompt: &str) -> anyhow::Result<Vec<Value>> {
    let begin = "BEGIN_JOBS_JSON\n";
    let end = "\nEND_JOBS_JSON";
    let raw = extract_between(prompt, begin, end)
        .ok_or_else(|| anyhow::anyhow!("missing jobs markers: {begin:?} .. {end:?}"))?;
    let jobs: Vec<Value> = serde_json::from_str(raw).context("parse jobs json")?;
    Ok(jobs)
}

fn verdicts_response(prompt: &str, behavior: &VerdictBehavior) -> anyhow::Result<String> {
    match behavior {
        VerdictBehavior::Malformed => Ok("I think these jobs look great!".to_owned()),
        VerdictBehavior::SingleObject {
            should_apply,
            match_score,
        } => Ok(serde_json::json!({
            "match_score": match_score,
            "should_apply": should_apply,
            "explanation": "single verdict",
        })
        .to_string()),
        VerdictBehavior::ApproveTitlesContaining(needle) => {
            Ok(approvals(prompt, needle)?.to_string())
        }
        VerdictBehavior::WrappedApprovals { key, needle } => {
            let mut wrapper = serde_json::Map::new();
            wrapper.insert(key.clone(), approvals(prompt, needle)?);
            Ok(Value::Object(wrapper).to_string())
        }
    }
}

fn approvals(prompt: &str, needle: &str) -> anyhow::Result<Value> {
    let verdicts = prompt_jobs(prompt)?
        .iter()
        .map(|job| {
            let title = job.get("title").and_then(|v| v.as_str()).unwrap_or("");
            let approve = title.contains(needle);
            serde_json::json!({
                "match_score": if approve { "9" } else { "2" },
                "should_apply": approve,
                "explanation": format!("title {title}"),
            })
        })
        .collect::<Vec<_>>();
    Ok(Value::Array(verdicts))
}
