use std::io::Write;

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures_util::StreamExt;
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[command(
    name = "ask",
    about = "Ask the documentation search endpoint a question and print the streamed answer"
)]
struct AskCli {
    /// Question to ask
    query: String,

    /// Vector search endpoint
    #[arg(
        long,
        env = "DOCS_SEARCH_ENDPOINT",
        default_value = "http://127.0.0.1:3000/api/vector-search"
    )]
    endpoint: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = AskCli::parse();
    let mut stdout = std::io::stdout();

    writeln!(stdout, "> {}", cli.query)?;
    write!(stdout, "...")?;
    stdout.flush()?;

    let res = reqwest::Client::new()
        .post(&cli.endpoint)
        .json(&json!({ "prompt": cli.query }))
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", cli.endpoint))?;

    let status = res.status();
    if !status.is_success() {
        writeln!(stdout, "\r   ")?;
        let body: Value = res.json().await.unwrap_or(Value::Null);
        let message = body
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("Sorry, there was an error searching. Please try again.");
        bail!("search failed ({}): {}", status, message);
    }

    let mut stream = res.bytes_stream();
    let mut first = true;
    while let Some(chunk) = stream.next().await {
        let bytes = chunk.context("Answer stream was interrupted")?;
        if first {
            write!(stdout, "\r   \r")?;
            first = false;
        }
        stdout.write_all(&bytes)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;

    Ok(())
}
