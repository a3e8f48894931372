//! A2A executor — forwards the prompt to a remote peer agent over JSON-RPC 2.0.
//!
//! Request: `message/send` with the prompt as a single text part.
//! Response: either a `Message` (text parts) or a `Task` (artifacts, falling
//! back to the status message).

use std::sync::Arc;

use async_trait::async_trait;
use cadence_core::error::{CadenceError, Result};
use cadence_core::traits::RunRecorder;
use cadence_core::types::{Agent, AgentRun, AgentRunTrigger};
use serde_json::{Value, json};

use crate::executor::{AgentExecutor, RunOptions, record, with_deadline};

/// Executes agents whose source is a remote A2A peer.
pub struct A2aExecutor {
    workspace_id: String,
    agent: Agent,
    recorder: Arc<dyn RunRecorder>,
    client: reqwest::Client,
}

impl A2aExecutor {
    pub fn new(
        workspace_id: &str,
        agent: Agent,
        recorder: Arc<dyn RunRecorder>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            agent,
            recorder,
            client,
        }
    }

    async fn send(&self, url: &str, prompt: &str) -> Result<String> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": uuid::Uuid::new_v4().to_string(),
            "method": "message/send",
            "params": {
                "message": {
                    "kind": "message",
                    "role": "user",
                    "messageId": uuid::Uuid::new_v4().to_string(),
                    "parts": [{ "kind": "text", "text": prompt }],
                }
            }
        });

        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| CadenceError::Http(format!("a2a peer {url} unreachable: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CadenceError::Http(format!("a2a peer returned {status}: {text}")));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| CadenceError::Http(format!("a2a response is not JSON: {e}")))?;
        parse_response(&body)
    }
}

/// Extract the reply text from a JSON-RPC response body.
pub fn parse_response(body: &Value) -> Result<String> {
    if let Some(err) = body.get("error") {
        return Err(CadenceError::execution(format!(
            "a2a error {}: {}",
            err["code"].as_i64().unwrap_or(0),
            err["message"].as_str().unwrap_or("unknown error")
        )));
    }

    let result = body
        .get("result")
        .ok_or_else(|| CadenceError::execution("a2a response has neither result nor error"))?;

    match result["kind"].as_str() {
        Some("task") => {
            let state = result["status"]["state"].as_str().unwrap_or("");
            let status_text = parts_text(&result["status"]["message"]["parts"]);
            if matches!(state, "failed" | "rejected" | "canceled") {
                return Err(CadenceError::execution(format!(
                    "a2a task {state}: {status_text}"
                )));
            }
            let artifacts = result["artifacts"]
                .as_array()
                .map(|arr| {
                    arr.iter()
                        .map(|a| parts_text(&a["parts"]))
                        .filter(|t| !t.is_empty())
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .unwrap_or_default();
            Ok(if artifacts.is_empty() { status_text } else { artifacts })
        }
        _ => Ok(parts_text(&result["parts"])),
    }
}

fn parts_text(parts: &Value) -> String {
    parts
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

#[async_trait]
impl AgentExecutor for A2aExecutor {
    async fn run(
        &self,
        trigger: AgentRunTrigger,
        prompt: &str,
        opts: RunOptions,
    ) -> Result<AgentRun> {
        let url = self
            .agent
            .a2a_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                CadenceError::Contract(format!("a2a agent '{}' has no a2a_url", self.agent.name))
            })?;

        let mut run = AgentRun::start(&self.workspace_id, &self.agent, trigger, prompt, opts.run_id);
        run.model = opts.model.map(|m| m.model);
        record(self.recorder.as_ref(), &run).await;

        tracing::info!("📡 Sending agent {} to a2a peer {url}", self.agent.name);
        match with_deadline(opts.timeout_secs, self.send(url, prompt)).await {
            Ok(output) => run.succeed(output),
            Err(e) => {
                tracing::warn!("❌ A2A agent {} failed: {e}", self.agent.name);
                run.fail(e);
            }
        }

        record(self.recorder.as_ref(), &run).await;
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRecorder;
    use cadence_core::types::{AgentRunStatus, AgentSource};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn remote(url: &str) -> Agent {
        let mut agent = Agent::new("peer", "Peer Agent");
        agent.source = AgentSource::A2a;
        agent.a2a_url = Some(url.into());
        agent
    }

    /// One-shot HTTP server answering with `status` and `body`.
    async fn serve_once(status: &'static str, body: String) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            // read headers plus Content-Length bytes of body
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}/a2a")
    }

    #[test]
    fn test_parse_message_result() {
        let body = json!({
            "jsonrpc": "2.0", "id": "1",
            "result": { "kind": "message", "role": "agent",
                        "parts": [{"kind": "text", "text": "hello"}, {"kind": "text", "text": "world"}] }
        });
        assert_eq!(parse_response(&body).unwrap(), "hello\nworld");
    }

    #[test]
    fn test_parse_task_result() {
        let body = json!({
            "jsonrpc": "2.0", "id": "1",
            "result": { "kind": "task", "id": "t1",
                        "status": {"state": "completed"},
                        "artifacts": [{"parts": [{"kind": "text", "text": "report"}]}] }
        });
        assert_eq!(parse_response(&body).unwrap(), "report");

        let status_only = json!({
            "result": { "kind": "task",
                        "status": {"state": "completed",
                                   "message": {"parts": [{"kind": "text", "text": "done"}]}} }
        });
        assert_eq!(parse_response(&status_only).unwrap(), "done");
    }

    #[test]
    fn test_parse_errors() {
        let rpc = json!({"error": {"code": -32601, "message": "Method not found"}});
        let err = parse_response(&rpc).unwrap_err();
        assert!(err.to_string().contains("Method not found"));

        let failed = json!({"result": {"kind": "task", "status": {"state": "failed"}}});
        assert!(parse_response(&failed).is_err());

        assert!(parse_response(&json!({"jsonrpc": "2.0"})).is_err());
    }

    #[tokio::test]
    async fn test_run_against_peer() {
        let body = json!({
            "jsonrpc": "2.0", "id": "1",
            "result": {"kind": "message", "parts": [{"kind": "text", "text": "pong"}]}
        })
        .to_string();
        let url = serve_once("200 OK", body).await;
        let recorder = Arc::new(MockRecorder::default());
        let exec = A2aExecutor::new("ws", remote(&url), recorder.clone(), reqwest::Client::new());

        let run = exec
            .run(AgentRunTrigger::Webhook, "ping", RunOptions::default())
            .await
            .unwrap();
        assert_eq!(run.status, AgentRunStatus::Success);
        assert_eq!(run.output.as_deref(), Some("pong"));
        assert_eq!(
            recorder.statuses(&run.id),
            vec![AgentRunStatus::Running, AgentRunStatus::Success]
        );
    }

    #[tokio::test]
    async fn test_http_error_becomes_error_run() {
        let url = serve_once("500 Internal Server Error", "{}".into()).await;
        let exec = A2aExecutor::new(
            "ws",
            remote(&url),
            Arc::new(MockRecorder::default()),
            reqwest::Client::new(),
        );

        let run = exec
            .run(AgentRunTrigger::Manual, "ping", RunOptions::default())
            .await
            .unwrap();
        assert_eq!(run.status, AgentRunStatus::Error);
        assert!(run.error.as_deref().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_silent_peer_hits_deadline() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/a2a", listener.local_addr().unwrap());
        // accept and never answer
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let recorder = Arc::new(MockRecorder::default());
        let exec = A2aExecutor::new("ws", remote(&url), recorder.clone(), reqwest::Client::new());
        let opts = RunOptions {
            timeout_secs: Some(1),
            ..Default::default()
        };

        let run = exec.run(AgentRunTrigger::Schedule, "ping", opts).await.unwrap();
        assert_eq!(run.status, AgentRunStatus::Error);
        assert!(run.error.as_deref().unwrap().contains("timed out after 1s"));
        assert_eq!(
            recorder.statuses(&run.id),
            vec![AgentRunStatus::Running, AgentRunStatus::Error]
        );
    }

    #[tokio::test]
    async fn test_blank_url_is_contract_error() {
        let exec = A2aExecutor::new(
            "ws",
            remote("   "),
            Arc::new(MockRecorder::default()),
            reqwest::Client::new(),
        );
        let err = exec
            .run(AgentRunTrigger::Manual, "ping", RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CadenceError::Contract(_)));
    }
}
