//! PhoneBar CLI - debug client for the CTI agent session
//!
//! Connects as an agent and prints every session event. Meant for poking at
//! a CTI server from a terminal, not for production use.

#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use phonebar_core::{AgentState, ConnectionConfig, IdentityConfig, PhoneBarConfig};
use phonebar_cti::{CtiSession, PhoneBarEvent};

#[derive(Parser)]
#[command(name = "phonebar")]
#[command(author, version, about = "PhoneBar - CTI agent debug client", long_about = None)]
struct Cli {
    /// CTI server base URL
    #[arg(long, default_value = "ws://127.0.0.1:8787")]
    url: String,

    /// Login username
    #[arg(long)]
    username: String,

    /// Access token for the signaling channel
    #[arg(long, env = "PHONEBAR_TOKEN")]
    token: String,

    /// Tenant id
    #[arg(long)]
    tid: String,

    /// Agent extension
    #[arg(long)]
    dn: String,

    /// Agent id (defaults to the extension)
    #[arg(long)]
    agent_id: Option<String>,

    /// Skill queue, repeatable; the first one is the sign-in queue
    #[arg(long = "queue", required = true)]
    queues: Vec<String>,

    /// Number to dial once the agent is ready
    #[arg(long)]
    dial: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("phonebar={log_level},phonebar_cti={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PhoneBarConfig {
        connection: ConnectionConfig {
            url: cli.url,
            username: cli.username,
            token: cli.token,
            ..ConnectionConfig::default()
        },
        identity: IdentityConfig {
            tid: cli.tid,
            this_dn: cli.dn.clone(),
            pstn_dn: None,
            agent_id: cli.agent_id.unwrap_or(cli.dn),
            this_queues: cli.queues.clone(),
            default_queue: cli.queues[0].clone(),
        },
        agent: Default::default(),
    };

    let session = CtiSession::new(config);
    let mut events = session.open()?;
    println!("session opened, waiting for events (Ctrl-C to quit)");

    let api = session.agent_api();
    let mut dial = cli.dial;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                print_event(&event);
                if let PhoneBarEvent::AgentStateChanged { new_state: AgentState::Ready, .. } = &event {
                    if let Some(dest) = dial.take() {
                        println!("-> dialing {dest}");
                        api.make_call(&dest, phonebar_core::CallType::Outbound, None).await?;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("shutting down");
                break;
            }
        }
    }

    session.close().await;
    Ok(())
}

fn print_event(event: &PhoneBarEvent) {
    match serde_json::to_string(event) {
        Ok(json) => println!("{json}"),
        Err(_) => println!("{event:?}"),
    }
}
