use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use docqa::relevance::{RelevanceBucket, SessionRelevance};
use docqa::retrieval::AnswerResponse;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};

const POLL_ATTEMPTS: u32 = 60;
const POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Parser)]
#[command(
    name = "docqa-client",
    about = "Upload documents to a docqa server and ask questions about them"
)]
struct Cli {
    /// Base URL of the docqa server.
    #[arg(long, default_value = "http://127.0.0.1:4100")]
    url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the server is up.
    Health,
    /// Upload a document and wait for it to be processed.
    Upload { path: PathBuf },
    /// Show the processing status of a task.
    Status { task_id: String },
    /// Show the summary of a processed document.
    Summary { task_id: String },
    /// Ask a single question.
    Ask { question: String },
    /// Ask questions read from stdin, one per line, tracking session relevance.
    Chat,
}

#[derive(Deserialize)]
struct UploadResponse {
    task_id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("docqa-client/0.1")
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let response = self
            .http
            .get(self.endpoint(path))
            .send()
            .await
            .with_context(|| format!("GET {path} failed"))?;
        decode(response).await
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<Value> {
        let response = self
            .http
            .post(self.endpoint(path))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {path} failed"))?;
        decode(response).await
    }

    async fn upload(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_string();
        let form = Form::new().part("file", Part::bytes(bytes).file_name(filename));
        let response = self
            .http
            .post(self.endpoint("/uploadfile/"))
            .multipart(form)
            .send()
            .await
            .context("upload request failed")?;
        let body: UploadResponse = serde_json::from_value(decode(response).await?)
            .context("upload response carried no task_id")?;
        Ok(body.task_id)
    }

    async fn status(&self, task_id: &str) -> Result<StatusResponse> {
        let body = self
            .post_json("/check_task_status/", json!({ "task_id": task_id }))
            .await?;
        serde_json::from_value(body).context("status response carried no status")
    }

    async fn ask(&self, question: &str) -> Result<AnswerResponse> {
        let body = self
            .post_json("/ask", json!({ "question": question }))
            .await?;
        serde_json::from_value(body).context("malformed answer")
    }
}

async fn decode(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        let detail = body
            .get("detail")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string());
        bail!("server returned {status}: {detail}");
    }
    Ok(body)
}

fn print_answer(response: &AnswerResponse) {
    println!("{}", response.answer);
    if response.sources.is_empty() {
        return;
    }
    println!();
    println!("Sources:");
    for (index, source) in response.sources.iter().enumerate() {
        let name = Path::new(&source.source)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&source.source);
        println!(
            "  [{}] {} - {}% {} relevance",
            index + 1,
            name,
            (source.score * 100.0) as u32,
            RelevanceBucket::classify(source.score)
        );
        println!("      {}", source.text);
    }
}

async fn wait_for_completion(client: &ApiClient, task_id: &str) -> Result<()> {
    for attempt in 1..=POLL_ATTEMPTS {
        let status = client.status(task_id).await?;
        match status.status.as_str() {
            "completed" => {
                let summary = client.get_json(&format!("/summary/{task_id}")).await?;
                println!(
                    "Processed {}",
                    status.file.as_deref().unwrap_or("document")
                );
                println!();
                println!(
                    "{}",
                    summary
                        .get("summary")
                        .and_then(Value::as_str)
                        .unwrap_or("Summary not available")
                );
                return Ok(());
            }
            "failed" => bail!(
                "processing failed: {}",
                status.error.as_deref().unwrap_or("Unknown error")
            ),
            "not_found" => bail!("task {task_id} is unknown to the server"),
            _ => {
                eprintln!("Processing... (attempt {attempt}/{POLL_ATTEMPTS})");
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
    bail!(
        "processing timed out after {POLL_ATTEMPTS} attempts; task {task_id} may still complete on the server"
    )
}

async fn chat(client: &ApiClient) -> Result<()> {
    let mut session = SessionRelevance::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("Ask a question (empty line or \"quit\" to exit).");

    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if question.is_empty() || question.eq_ignore_ascii_case("quit") {
            break;
        }
        let response = client.ask(question).await?;
        print_answer(&response);

        let scores: Vec<f32> = response.sources.iter().map(|source| source.score).collect();
        session.record(&scores);
        if let Some(average) = session.average() {
            println!(
                "Session relevance: {}% over {} question(s)",
                (average * 100.0) as u32,
                session.questions()
            );
        }
        println!();
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = ApiClient::new(&cli.url)?;
    match cli.command {
        Command::Health => {
            println!("{}", client.get_json("/health").await?);
        }
        Command::Upload { path } => {
            let task_id = client.upload(&path).await?;
            println!("Task {task_id} submitted");
            wait_for_completion(&client, &task_id).await?;
        }
        Command::Status { task_id } => {
            let body = client
                .post_json("/check_task_status/", json!({ "task_id": task_id }))
                .await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Summary { task_id } => {
            let body = client.get_json(&format!("/summary/{task_id}")).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Ask { question } => {
            print_answer(&client.ask(&question).await?);
        }
        Command::Chat => chat(&client).await?,
    }
    Ok(())
}
