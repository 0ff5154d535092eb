// zorch: run one orchestration request from the command line.

use anyhow::{Context, Result};
use clap::Parser;
use orchestrator::{
    HttpReferenceResolver, HttpRemoteEvaluator, OrchestrationRequest, orchestrate,
};
use std::io::Read;
use std::rc::Rc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "zorch", about = "Resolve a function-call expression to its result envelope")]
struct Args {
    /// Path to the request JSON, or `-` for stdin.
    request: String,

    /// Definition store endpoint.
    #[arg(long, env = "ZORCH_RESOLVER_URL")]
    resolver_url: String,

    /// Optional native-code evaluator endpoint.
    #[arg(long, env = "ZORCH_EVALUATOR_URL")]
    evaluator_url: Option<String>,

    /// Languages the evaluator endpoint accepts.
    #[arg(long, default_value = "javascript,python", value_delimiter = ',')]
    evaluator_languages: Vec<String>,

    /// Skip structural validation of the input and of resolved values.
    #[arg(long)]
    no_validate: bool,

    /// Overall time budget in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,
}

fn read_request(path: &str) -> Result<serde_json::Value> {
    let raw = if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?
    };
    serde_json::from_str(&raw).context("request is not valid JSON")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // The fmt subscriber carries the log-to-tracing bridge, so engine
    // `log::debug!` lines land in the same output.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let call = read_request(&args.request)?;

    let mut request = OrchestrationRequest::new(
        call,
        Rc::new(HttpReferenceResolver::new(&args.resolver_url)),
    );
    if let Some(url) = &args.evaluator_url {
        request = request.with_evaluator(Rc::new(HttpRemoteEvaluator::new(
            url,
            args.evaluator_languages.clone(),
        )));
    }
    if args.no_validate {
        request = request.without_validation();
    }
    if let Some(ms) = args.timeout_ms {
        request = request.with_timeout(Duration::from_millis(ms));
    }

    let envelope = orchestrate(request).await;
    println!("{}", serde_json::to_string_pretty(&envelope.to_json_full())?);
    if envelope.is_error() {
        std::process::exit(1);
    }
    Ok(())
}
