use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use listward_client::ClientConfig;
use listward_sync::{DesiredInput, Session, DEFAULT_WORKERS};

#[derive(Debug, Parser)]
#[command(name = "listward")]
#[command(about = "Administer Sympa mailing lists through their web UI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the lists the logged-in user can see.
    Lists,
    /// Show a list's members.
    Subscribers { list: String },
    /// Show a list's bouncing members.
    Bouncing { list: String },
    /// Add one subscriber.
    Add {
        list: String,
        email: String,
        #[arg(default_value = "")]
        name: String,
    },
    /// Remove one subscriber.
    Remove { list: String, email: String },
    /// Reconcile a list's membership against a file of `email [name]` lines.
    Set {
        list: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Reset bounce errors, for one member or for all bouncing members.
    ResetBouncing { list: String, email: Option<String> },
    /// Unsubscribe every bouncing member.
    RemoveBouncing { list: String },
    /// Export member addresses to a file, one per line.
    Export {
        list: String,
        path: PathBuf,
        #[arg(long)]
        bouncing: bool,
    },
}

struct Config {
    url: String,
    email: String,
    password: String,
    timeout_secs: u64,
    workers: usize,
}

impl Config {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: std::env::var("SYMPA_URL").context("SYMPA_URL must be set")?,
            email: std::env::var("SYMPA_EMAIL").context("SYMPA_EMAIL must be set")?,
            password: std::env::var("SYMPA_PASSWORD").context("SYMPA_PASSWORD must be set")?,
            timeout_secs: std::env::var("LISTWARD_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            workers: std::env::var("LISTWARD_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_WORKERS),
        })
    }
}

async fn open_session(config: &Config) -> Result<Session> {
    let mut client_config = ClientConfig::new(config.url.clone());
    client_config.timeout = Duration::from_secs(config.timeout_secs);
    let mut session = Session::new(client_config)?.with_workers(config.workers);
    if !session.login(&config.email, &config.password).await? {
        bail!("login failed for {}", config.email);
    }
    Ok(session)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let mut session = open_session(&config).await?;

    match cli.command {
        Commands::Lists => {
            for name in session.lists().keys() {
                println!("{name}");
            }
        }
        Commands::Subscribers { list } => {
            if let Some(subscribers) = session.list_named(&list).subscribers().await {
                for (email, sub) in subscribers {
                    println!("{email}\t{}", sub.name);
                }
            }
        }
        Commands::Bouncing { list } => {
            if let Some(bouncing) = session.list_named(&list).bouncing().await {
                for (email, sub) in bouncing {
                    let score = sub.bounce.score.as_deref().unwrap_or("no score");
                    println!("{email}\tscore={score}\tcount={}", sub.bounce.count);
                }
            }
        }
        Commands::Add { list, email, name } => {
            if session.list_named(&list).add_subscriber(&email, &name).await.is_some() {
                println!("added {email} to {list}");
            }
        }
        Commands::Remove { list, email } => {
            if session.list_named(&list).remove_subscriber(&email).await.is_some() {
                println!("removed {email} from {list}");
            }
        }
        Commands::Set { list, file } => {
            let plan = session
                .list_named(&list)
                .set_subscribers(DesiredInput::File(file))
                .await;
            if let Some(plan) = plan {
                println!(
                    "reconciled {list}: {} added, {} removed",
                    plan.additions.len(),
                    plan.removals.len()
                );
            }
        }
        Commands::ResetBouncing { list, email } => match email {
            Some(email) => {
                if session
                    .list_named(&list)
                    .reset_bouncing_subscriber(&email)
                    .await
                    .is_some()
                {
                    println!("reset bounce errors for {email}");
                }
            }
            None => {
                if let Some(count) = session.list_named(&list).reset_bouncing().await {
                    println!("reset bounce errors for {count} subscribers");
                }
            }
        },
        Commands::RemoveBouncing { list } => {
            if let Some(count) = session.list_named(&list).remove_bouncing_subscribers().await {
                println!("removed {count} bouncing subscribers from {list}");
            }
        }
        Commands::Export { list, path, bouncing } => {
            let count = session
                .list_named(&list)
                .export_emails(&path, bouncing)
                .await?;
            println!("wrote {count} addresses to {}", path.display());
        }
    }

    session.logout().await;
    Ok(())
}
