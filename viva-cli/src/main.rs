//! viva-cli — terminal frontend for the Viva mock-interview server
//!
//! Drives the HTTP API so an interview can be run end-to-end from a shell.
//!
//! # Subcommands
//! - `resume <identity> --file <path>` — stage resume text for an identity
//! - `start <identity>`                — begin the interview
//! - `answer <identity> <text>`        — submit an answer
//! - `end <identity>`                  — finish and print the summary
//! - `active <identity>`               — show the current session state
//! - `reset <identity>`                — one-time restart
//! - `status`                          — show server health

use clap::{Parser, Subcommand};
use serde_json::Value;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8790";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "viva-cli",
    version,
    about = "Viva mock-interview — terminal frontend"
)]
struct Cli {
    /// Viva HTTP server URL (overrides VIVA_HTTP_URL env var)
    #[arg(long, env = "VIVA_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Stage resume text for an identity
    Resume {
        identity: String,

        /// Path to a plain-text resume file
        #[arg(short, long)]
        file: String,
    },

    /// Begin the interview (requires a staged resume)
    Start { identity: String },

    /// Submit an answer to the current question
    Answer { identity: String, text: String },

    /// Finish the interview and print the summary
    End { identity: String },

    /// Show the current session state
    Active { identity: String },

    /// Restart the interview (allowed once per session)
    Reset { identity: String },

    /// Show Viva server status
    Status,
}

// ============================================================================
// HTTP helpers
// ============================================================================

fn client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .expect("reqwest client")
}

/// POST a JSON body and return the parsed response, exiting on failure.
fn post(server: &str, path: &str, body: Value) -> Value {
    let url = format!("{server}{path}");
    let resp = match client().post(&url).json(&body).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("viva-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    let value: Value = resp.json().unwrap_or_default();

    if !status.is_success() {
        let msg = value["error"].as_str().unwrap_or("unknown error");
        eprintln!("viva-cli: server returned {}: {}", status, msg);
        std::process::exit(1);
    }

    value
}

fn get(server: &str, path: &str) -> Value {
    let url = format!("{server}{path}");
    let resp = match client().get(&url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("viva-cli: cannot reach {} — {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    let value: Value = resp.json().unwrap_or_default();

    if !status.is_success() {
        eprintln!("viva-cli: server returned {}", status);
        std::process::exit(1);
    }

    value
}

// ============================================================================
// Output formatting
// ============================================================================

/// Render the end-of-interview summary for terminal output.
fn format_summary(body: &Value) -> String {
    if body["cancelled"].as_bool().unwrap_or(false) {
        return "Interview cancelled — no questions were answered.".to_string();
    }

    let summary = &body["summary"];
    let mut out = String::new();
    out.push_str(&format!(
        "Final score: {:.2}/10\n\n{}\n",
        body["score"].as_f64().unwrap_or(0.0),
        summary["summary"].as_str().unwrap_or("")
    ));

    for (label, key) in [
        ("Strengths", "strengths"),
        ("Weaknesses", "weaknesses"),
        ("Recommendations", "recommendations"),
    ] {
        if let Some(items) = summary[key].as_array() {
            if !items.is_empty() {
                out.push_str(&format!("\n{label}:\n"));
                for item in items {
                    out.push_str(&format!("  - {}\n", item.as_str().unwrap_or("")));
                }
            }
        }
    }

    out
}

// ============================================================================
// Subcommand handlers
// ============================================================================

fn do_resume(server: &str, identity: &str, file: &str) -> anyhow::Result<()> {
    let resume_text = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("cannot read resume file {}: {}", file, e))?;

    post(
        server,
        "/resume",
        serde_json::json!({"identity": identity, "resume_text": resume_text}),
    );
    println!("Resume staged for {}", identity);
    Ok(())
}

fn do_start(server: &str, identity: &str) -> anyhow::Result<()> {
    let body = post(
        server,
        "/interview/start",
        serde_json::json!({"identity": identity}),
    );
    println!("Interviewer: {}", body["question"].as_str().unwrap_or(""));
    Ok(())
}

fn do_answer(server: &str, identity: &str, text: &str) -> anyhow::Result<()> {
    let body = post(
        server,
        "/interview/next",
        serde_json::json!({"identity": identity, "answer": text}),
    );

    if let Some(feedback) = body["feedback"].as_str().filter(|f| !f.is_empty()) {
        println!("Feedback: {}\n", feedback);
    }

    if body["is_complete"].as_bool().unwrap_or(false) {
        println!(
            "The interview is complete after {} questions. Run `viva-cli end {}` for your summary.",
            body["question_count"], identity
        );
    } else {
        println!("Interviewer: {}", body["question"].as_str().unwrap_or(""));
    }
    Ok(())
}

fn do_end(server: &str, identity: &str) -> anyhow::Result<()> {
    let body = post(
        server,
        "/interview/end",
        serde_json::json!({"identity": identity}),
    );
    println!("{}", format_summary(&body));
    Ok(())
}

fn do_active(server: &str, identity: &str) -> anyhow::Result<()> {
    let body = get(server, &format!("/interview/active?identity={identity}"));

    if body["has_active_session"].as_bool().unwrap_or(false) {
        println!(
            "Active session — question {}:",
            body["question_count"]
        );
        println!("{}", body["current_question"].as_str().unwrap_or(""));
    } else {
        println!("No active session for {}", identity);
    }
    Ok(())
}

fn do_reset(server: &str, identity: &str) -> anyhow::Result<()> {
    let body = post(
        server,
        "/interview/reset",
        serde_json::json!({"identity": identity}),
    );
    println!("Interview restarted.");
    println!("Interviewer: {}", body["question"].as_str().unwrap_or(""));
    Ok(())
}

fn do_status(server: &str) -> anyhow::Result<()> {
    let body = get(server, "/health");
    println!("Viva server: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:     {}", body["version"].as_str().unwrap_or("?"));
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Resume { identity, file } => do_resume(&server, &identity, &file),
        Commands::Start { identity } => do_start(&server, &identity),
        Commands::Answer { identity, text } => do_answer(&server, &identity, &text),
        Commands::End { identity } => do_end(&server, &identity),
        Commands::Active { identity } => do_active(&server, &identity),
        Commands::Reset { identity } => do_reset(&server, &identity),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("viva-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_summary_cancelled() {
        let body = serde_json::json!({"cancelled": true, "score": 0.0, "summary": {}});
        assert!(format_summary(&body).contains("cancelled"));
    }

    #[test]
    fn test_format_summary_full() {
        let body = serde_json::json!({
            "cancelled": false,
            "score": 7.25,
            "summary": {
                "summary": "Capable engineer.",
                "strengths": ["debugging"],
                "weaknesses": [],
                "recommendations": ["practice system design"]
            }
        });
        let out = format_summary(&body);
        assert!(out.contains("7.25/10"));
        assert!(out.contains("Capable engineer."));
        assert!(out.contains("- debugging"));
        assert!(out.contains("- practice system design"));
        assert!(!out.contains("Weaknesses"), "empty sections are omitted");
    }
}
