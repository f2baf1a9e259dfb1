use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "metrics-cli")]
#[command(about = "Query the performance and audit reporting API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Value sent as X-API-Key
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Most recent performance records
    Latest {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Records for one endpoint path
    Endpoint {
        endpoint: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Records in a category (FAST, NORMAL, SLOW, VERY_SLOW)
    Category {
        category: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Summary for one endpoint over a window (RFC 3339 timestamps)
    Summary {
        endpoint: String,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// Summary across all endpoints
    Overall {
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// Endpoints ranked by mean latency
    Slowest {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Endpoints ranked by error rate
    Errors,
    /// Number of stored performance records
    Count,
    /// Delete performance records older than the given number of days (needs --key)
    Cleanup { older_than_days: u32 },
    /// Audit trail, latest or for one correlation id
    Audit {
        #[arg(short, long)]
        correlation_id: Option<String>,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Audit ERROR events in a window
    AuditErrors {
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Audit events for one caller descriptor, e.g. "user:alice (roles: reader)"
    AuditCaller {
        caller: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Delete audit records older than the given number of days (needs --key)
    AuditCleanup { older_than_days: u32 },
}

fn query(pairs: &[(&str, Option<String>)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .filter_map(|(k, v)| v.clone().map(|v| (k.to_string(), v)))
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert("x-api-key", HeaderValue::from_str(key)?);
    }

    let base = format!("{}/api/performance-metrics", cli.url.trim_end_matches('/'));
    let audit = format!("{}/api/audit-logs", cli.url.trim_end_matches('/'));
    let limit = |l: &Option<usize>| l.map(|l| l.to_string());

    let request = match &cli.command {
        Commands::Latest { limit: l } => client
            .get(format!("{}/latest", base))
            .query(&query(&[("limit", limit(l))])),
        Commands::Endpoint { endpoint, limit: l } => client
            .get(format!("{}/endpoint", base))
            .query(&query(&[("endpoint", Some(endpoint.clone())), ("limit", limit(l))])),
        Commands::Category { category, limit: l } => client
            .get(format!("{}/category/{}", base, category))
            .query(&query(&[("limit", limit(l))])),
        Commands::Summary { endpoint, start, end } => client
            .get(format!("{}/summary/endpoint", base))
            .query(&query(&[
                ("endpoint", Some(endpoint.clone())),
                ("start", start.clone()),
                ("end", end.clone()),
            ])),
        Commands::Overall { start, end } => client
            .get(format!("{}/summary/overall", base))
            .query(&query(&[("start", start.clone()), ("end", end.clone())])),
        Commands::Slowest { limit: l } => client
            .get(format!("{}/slowest", base))
            .query(&query(&[("limit", limit(l))])),
        Commands::Errors => client.get(format!("{}/errors", base)),
        Commands::Count => client.get(format!("{}/count", base)),
        Commands::Cleanup { older_than_days } => client
            .delete(format!("{}/cleanup", base))
            .query(&[("older_than_days", older_than_days.to_string())]),
        Commands::Audit {
            correlation_id,
            limit: l,
        } => client.get(&audit).query(&query(&[
            ("correlation_id", correlation_id.clone()),
            ("limit", limit(l)),
        ])),
        Commands::AuditErrors { start, end, limit: l } => client
            .get(format!("{}/errors", audit))
            .query(&query(&[
                ("start", start.clone()),
                ("end", end.clone()),
                ("limit", limit(l)),
            ])),
        Commands::AuditCaller { caller, limit: l } => client
            .get(format!("{}/caller", audit))
            .query(&query(&[("caller", Some(caller.clone())), ("limit", limit(l))])),
        Commands::AuditCleanup { older_than_days } => client
            .delete(format!("{}/cleanup", audit))
            .query(&[("older_than_days", older_than_days.to_string())]),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if let Some(id) = res.headers().get("x-correlation-id").and_then(|v| v.to_str().ok()) {
        eprintln!("Correlation ID: {}", id);
    }
    if !status.is_success() {
        eprintln!("Error: reporting API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
