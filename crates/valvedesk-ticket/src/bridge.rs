use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::{TicketExecutor, TicketRequest};

const PROJECT_KEY: &str = "KAN";
const ISSUE_TYPE: &str = "Task";

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Program to spawn, e.g. "node"
    pub command: String,
    /// Arguments, e.g. ["dist/index.js"]
    pub args: Vec<String>,
    /// Working directory of the bridge process
    pub working_dir: Option<PathBuf>,
    /// Hard cap on one invocation
    pub timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command: "node".to_string(),
            args: vec!["dist/index.js".to_string()],
            working_dir: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error)]
enum BridgeError {
    #[error("failed to spawn ticket bridge: {0}")]
    Spawn(std::io::Error),

    #[error("ticket bridge I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("ticket bridge exited with code {code}: {stderr}")]
    Exit { code: i32, stderr: String },

    #[error("ticket bridge returned no valid JSON response")]
    NoResponse,

    #[error("ticket bridge timed out")]
    Timeout,
}

/// Bridge to the external ticketing system over a subprocess stdio boundary.
pub struct TicketBridge {
    config: BridgeConfig,
}

impl TicketBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    async fn run(&self, request: &TicketRequest) -> Result<String, BridgeError> {
        let rpc = build_rpc_request(request);
        let mut line = serde_json::to_string(&rpc).expect("rpc request serializes");
        line.push('\n');

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(BridgeError::Spawn)?;

        let mut stdin = child.stdin.take().expect("stdin was piped");
        stdin.write_all(line.as_bytes()).await?;
        drop(stdin); // close stdin so the bridge sees EOF

        let output = tokio::time::timeout(self.config.timeout, child.wait_with_output())
            .await
            .map_err(|_| BridgeError::Timeout)??;

        if !output.status.success() {
            return Err(BridgeError::Exit {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let response = last_json_line(&stdout).ok_or(BridgeError::NoResponse)?;
        Ok(interpret_response(&response, &request.priority, &request.requester_email))
    }
}

#[async_trait]
impl TicketExecutor for TicketBridge {
    async fn create_ticket(&self, request: &TicketRequest) -> String {
        match self.run(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "ticket bridge invocation failed");
                format!("Erreur lors de la création du ticket : {}", e)
            }
        }
    }
}

/// Build the JSON-RPC request expected by the ticketing bridge.
fn build_rpc_request(request: &TicketRequest) -> Value {
    let description = format!(
        "RESPONSABLE : {}\nPRIORITÉ : {}\nEMAIL : {}\n\nDETAILS :\n{}",
        request.assignee_group(),
        request.priority,
        request.requester_email,
        request.description
    );

    serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {
            "name": "jira_create_issue",
            "arguments": {
                "projectKey": PROJECT_KEY,
                "issueType": ISSUE_TYPE,
                "summary": request.summary,
                "description": description,
                "priority": title_case(&request.priority),
            }
        }
    })
}

/// The bridge logs freely on stdout; the JSON-RPC reply is the last line
/// that parses as a JSON object.
fn last_json_line(stdout: &str) -> Option<Value> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|l| l.starts_with('{') && l.ends_with('}'))
        .find_map(|l| serde_json::from_str(l).ok())
}

/// Turn the JSON-RPC reply into the human-readable outcome recorded in the
/// conversation.
fn interpret_response(response: &Value, priority: &str, requester_email: &str) -> String {
    if let Some(error) = response.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("erreur inconnue");
        return format!("Erreur du pont de ticketing : {}", message);
    }

    let text = response
        .pointer("/result/content/0/text")
        .and_then(Value::as_str);

    match text {
        Some(text) => {
            // The bridge wraps the ticketing API reply as JSON text; fall
            // back to the raw text when it is not JSON.
            if let Ok(issue) = serde_json::from_str::<Value>(text) {
                if let Some(key) = issue.get("key").and_then(Value::as_str) {
                    return format!(
                        "ID du ticket : {}, Priorité : {}, Email : {}",
                        key, priority, requester_email
                    );
                }
            }
            format!("Succès : {}", text.trim())
        }
        None => "Erreur : le pont de ticketing n'a pas renvoyé de réponse valide.".to_string(),
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => "Medium".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> TicketRequest {
        TicketRequest {
            category: "troubleshooting".to_string(),
            summary: "Fuite Vanne V-12".to_string(),
            description: "Joint remplacé, fuite persistante.".to_string(),
            priority: "high".to_string(),
            requester_email: "amine@example.com".to_string(),
        }
    }

    #[test]
    fn rpc_request_carries_assignee_and_title_cased_priority() {
        let rpc = build_rpc_request(&sample_request());
        assert_eq!(rpc["method"], "tools/call");
        assert_eq!(rpc["params"]["name"], "jira_create_issue");
        assert_eq!(rpc["params"]["arguments"]["projectKey"], "KAN");
        assert_eq!(rpc["params"]["arguments"]["priority"], "High");

        let description = rpc["params"]["arguments"]["description"].as_str().unwrap();
        assert!(description.contains("Troubleshooting Group"));
        assert!(description.contains("amine@example.com"));
    }

    #[test]
    fn last_json_line_skips_log_noise() {
        let stdout = "bridge starting\nconnected\n{\"jsonrpc\":\"2.0\",\"result\":{}}\n";
        let parsed = last_json_line(stdout).unwrap();
        assert_eq!(parsed["jsonrpc"], "2.0");
    }

    #[test]
    fn interpret_response_extracts_ticket_key() {
        let response = serde_json::json!({
            "jsonrpc": "2.0",
            "result": {
                "content": [{ "type": "text", "text": "{\"key\":\"KAN-42\"}" }]
            }
        });
        let outcome = interpret_response(&response, "High", "amine@example.com");
        assert!(outcome.contains("KAN-42"));
        assert!(outcome.contains("High"));
    }

    #[test]
    fn interpret_response_surfaces_rpc_error() {
        let response = serde_json::json!({
            "jsonrpc": "2.0",
            "error": { "code": -32000, "message": "project not found" }
        });
        let outcome = interpret_response(&response, "Low", "a@b.c");
        assert!(outcome.contains("project not found"));
    }

    #[test]
    fn interpret_response_handles_non_json_text() {
        let response = serde_json::json!({
            "result": { "content": [{ "text": "Issue created in board KAN" }] }
        });
        let outcome = interpret_response(&response, "Medium", "a@b.c");
        assert_eq!(outcome, "Succès : Issue created in board KAN");
    }

    #[tokio::test]
    async fn bridge_round_trips_through_a_subprocess() {
        // Stand-in bridge: consume stdin, reply with a canned JSON-RPC line.
        let config = BridgeConfig {
            command: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                r#"cat > /dev/null; echo '{"jsonrpc":"2.0","result":{"content":[{"text":"{\"key\":\"KAN-7\"}"}]}}'"#
                    .to_string(),
            ],
            working_dir: None,
            timeout: Duration::from_secs(5),
        };

        let bridge = TicketBridge::new(config);
        let outcome = bridge.create_ticket(&sample_request()).await;
        assert!(outcome.contains("KAN-7"), "unexpected outcome: {outcome}");
    }

    #[tokio::test]
    async fn bridge_folds_spawn_failure_into_outcome() {
        let config = BridgeConfig {
            command: "/nonexistent/bridge-binary".to_string(),
            args: vec![],
            working_dir: None,
            timeout: Duration::from_secs(1),
        };

        let bridge = TicketBridge::new(config);
        let outcome = bridge.create_ticket(&sample_request()).await;
        assert!(outcome.starts_with("Erreur lors de la création du ticket"));
    }
}
