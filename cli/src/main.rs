use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use rtm::{ApiConfig, ClientKind, CustomerTarget, RtmClient, SessionConfig, WebClient};
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("missing access token; pass --token or set RTM_ACCESS_TOKEN")]
    MissingToken,
    #[error("customer clients need --license-id or --organization-id")]
    MissingTarget,
    #[error(transparent)]
    Config(#[from] rtm::ConfigError),
    #[error(transparent)]
    Connect(#[from] rtm::ConnectionError),
    #[error(transparent)]
    Send(#[from] rtm::SendError),
    #[error(transparent)]
    Web(#[from] rtm::WebError),
    #[error("login rejected: {0}")]
    LoginRejected(String),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "rtm-cli", about = "RTM and Web API command line client")]
struct Cli {
    #[arg(long, env = "API_HOST", default_value = rtm::config::DEFAULT_API_HOST)]
    api_host: String,

    #[arg(long, env = "API_VERSION", default_value = rtm::config::DEFAULT_API_VERSION)]
    api_version: String,

    /// Use ws:// and http:// instead of wss:// and https://.
    #[arg(long, default_value_t = false)]
    insecure: bool,

    /// Sent as-is: `Bearer <token>` or `Basic <credentials>`.
    #[arg(long, env = "RTM_ACCESS_TOKEN")]
    token: Option<String>,

    #[arg(long, value_enum, default_value_t = Kind::Agent)]
    kind: Kind,

    #[arg(long, env = "RTM_LICENSE_ID", conflicts_with = "organization_id")]
    license_id: Option<u64>,

    #[arg(long, env = "RTM_ORGANIZATION_ID")]
    organization_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Kind {
    Agent,
    Customer,
}

impl From<Kind> for ClientKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Agent => Self::Agent,
            Kind::Customer => Self::Customer,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open an RTM session, log in, send one action and print the response.
    Send(ActionArgs),
    /// Open an RTM session, log in and print pushes as JSON lines.
    Listen(ListenArgs),
    /// Call one action over the Web API.
    Web(ActionArgs),
}

#[derive(Args, Debug)]
struct ActionArgs {
    action: String,

    /// JSON object payload.
    #[arg(long, default_value = "{}")]
    data: String,
}

#[derive(Args, Debug)]
struct ListenArgs {
    /// Stop after this many pushes.
    #[arg(long)]
    max: Option<usize>,

    /// Stop after this many seconds.
    #[arg(long)]
    seconds: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match &cli.command {
        Command::Send(args) => run_send(&cli, args).await,
        Command::Listen(args) => run_listen(&cli, args).await,
        Command::Web(args) => run_web(&cli, args).await,
    }
}

fn api_config(cli: &Cli) -> Result<ApiConfig, CliError> {
    let base = ApiConfig::from_env()?;
    Ok(ApiConfig {
        host: cli.api_host.clone(),
        version: cli.api_version.trim_start_matches('v').to_owned(),
        tls: base.tls && !cli.insecure,
        ..base
    })
}

fn target(cli: &Cli) -> Option<CustomerTarget> {
    match (cli.license_id, &cli.organization_id) {
        (Some(id), _) => Some(CustomerTarget::License(id)),
        (None, Some(org)) => Some(CustomerTarget::Organization(org.clone())),
        (None, None) => None,
    }
}

fn token(cli: &Cli) -> Result<&str, CliError> {
    cli.token.as_deref().ok_or(CliError::MissingToken)
}

async fn open_logged_in(cli: &Cli) -> Result<RtmClient, CliError> {
    let api = api_config(cli)?;
    let session_config = SessionConfig::from_env()?;
    let client = match ClientKind::from(cli.kind) {
        ClientKind::Agent => RtmClient::agent(&api, session_config)?,
        ClientKind::Customer => {
            let target = target(cli).ok_or(CliError::MissingTarget)?;
            RtmClient::customer(&api, &target, session_config)?
        }
    };

    client.open().await?;
    let login = client.login(token(cli)?).await?;
    if !login.success {
        client.close().await;
        return Err(CliError::LoginRejected(login.payload.to_string()));
    }
    eprintln!("logged in: {}", client.url());
    Ok(client)
}

async fn run_send(cli: &Cli, args: &ActionArgs) -> Result<(), CliError> {
    let payload = parse_payload(&args.data)?;
    let client = open_logged_in(cli).await?;
    let result = client.send(&args.action, payload).await;
    client.close().await;
    print_json(&serde_json::to_value(result?)?)
}

async fn run_listen(cli: &Cli, args: &ListenArgs) -> Result<(), CliError> {
    let client = open_logged_in(cli).await?;
    let deadline = args.seconds.map(|s| tokio::time::Instant::now() + Duration::from_secs(s));

    let mut seen = 0_usize;
    loop {
        if args.max.is_some_and(|max| seen >= max) {
            break;
        }
        let next = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, client.next_push()).await {
                Ok(push) => push,
                Err(_) => break,
            },
            None => client.next_push().await,
        };
        let Some(push) = next else {
            eprintln!("session closed");
            break;
        };
        println!("{}", serde_json::to_string(&push)?);
        seen = seen.saturating_add(1);
    }

    client.close().await;
    eprintln!("listen complete: pushes={seen}");
    Ok(())
}

async fn run_web(cli: &Cli, args: &ActionArgs) -> Result<(), CliError> {
    let payload = parse_payload(&args.data)?;
    let mut client = WebClient::new(cli.kind.into(), api_config(cli)?, token(cli)?)?;
    if let Some(target) = target(cli) {
        client = client.with_target(target);
    }
    let response = client.call(&args.action, payload).await?;
    if !response.is_success() {
        eprintln!("HTTP {}", response.status);
    }
    print_json(&response.body)
}

fn parse_payload(data: &str) -> Result<Value, CliError> {
    let value = serde_json::from_str::<Value>(data)?;
    Ok(if value.is_null() { Value::Object(Map::new()) } else { value })
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
