use anyhow::{Context, anyhow};
use chrono::Local;
use clap::{Parser, Subcommand};
use influcore::credentials::parse_identity;
use influence_rust::config::SessionConfig;
use influence_rust::context::SessionContext;
use influence_rust::store::{JsonPreferenceStore, KeyPairManager};
use log::info;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "influence_store")]
#[command(about = "Influence credential and key pair store tool")]
#[command(
    long_about = "Inspects and edits the persisted account state of an Influence installation: stored credentials, the logged-in flag and named key pairs"
)]
struct Cli {
    #[arg(short, long, default_value = "./influence_data")]
    data_dir: PathBuf,

    /// JSON file with session settings; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the stored account state.
    Show,
    /// Store a `user@host` identity and password.
    Login { identity: String, password: String },
    /// Forget the credentials and wipe every stored preference.
    Logout,
    /// Open (or create) a named key pair and print its public key.
    Keypair { name: String },
    ListKeys,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).await?;

    match cli.command.unwrap_or(Commands::Show) {
        Commands::Show => show(&cli.data_dir, cli.json).await,
        Commands::Login { identity, password } => {
            login(&cli.data_dir, &identity, &password).await
        }
        Commands::Logout => logout(&cli.data_dir).await,
        Commands::Keypair { name } => keypair(&cli.data_dir, &config, &name, cli.json).await,
        Commands::ListKeys => list_keys(&cli.data_dir, &config, cli.json).await,
    }
}

async fn load_config(path: Option<&Path>) -> Result<SessionConfig, anyhow::Error> {
    let Some(path) = path else {
        return Ok(SessionConfig::default());
    };
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("parsing config {}", path.display()))
}

async fn open_context(data_dir: &Path) -> Result<SessionContext, anyhow::Error> {
    let prefs = JsonPreferenceStore::open(data_dir.join("prefs.json")).await?;
    Ok(SessionContext::new(Arc::new(prefs)).await?)
}

async fn show(data_dir: &Path, json_output: bool) -> Result<(), anyhow::Error> {
    let context = open_context(data_dir).await?;
    let credentials = context.credentials().current();
    let logged_in = context.was_logged_in().await;

    if json_output {
        let report = json!({
            "identity": (!credentials.is_empty()).then(|| credentials.identity()),
            "has_password": !credentials.password.is_empty(),
            "logged_in": logged_in,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    info!("=== Influence Store ===");
    info!("Data directory: {}", data_dir.display());
    if credentials.is_empty() {
        info!("No credentials stored");
    } else {
        info!("Identity: {}", credentials.identity());
    }
    info!("Logged in at last shutdown: {logged_in}");
    Ok(())
}

async fn login(data_dir: &Path, identity: &str, password: &str) -> Result<(), anyhow::Error> {
    let credentials = parse_identity(identity, password)?;
    if credentials.is_empty() || credentials.is_blank() {
        return Err(anyhow!("identity and password must not be blank"));
    }
    let context = open_context(data_dir).await?;
    context.credentials().store(&credentials).await?;
    context.reload_credentials().await?;
    info!("Stored credentials for {}", credentials.identity());
    Ok(())
}

async fn logout(data_dir: &Path) -> Result<(), anyhow::Error> {
    let context = open_context(data_dir).await?;
    context.reset_credentials().await?;
    info!("Credentials removed");
    Ok(())
}

async fn key_pairs(data_dir: &Path, config: &SessionConfig) -> Result<KeyPairManager, anyhow::Error> {
    Ok(KeyPairManager::new(data_dir.join(&config.key_pair_dir))
        .await?
        .with_key_bits(config.key_pair_bits))
}

async fn keypair(
    data_dir: &Path,
    config: &SessionConfig,
    name: &str,
    json_output: bool,
) -> Result<(), anyhow::Error> {
    let manager = key_pairs(data_dir, config).await?;
    let pair = manager.try_open(name).await?;
    let public_key = hex::encode(pair.public_key());
    let bits = pair.key_bits()?;

    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(
                &json!({ "name": name, "bits": bits, "public_key": public_key })
            )?
        );
    } else {
        info!("{name} (RSA {bits}): {public_key}");
    }
    Ok(())
}

async fn list_keys(
    data_dir: &Path,
    config: &SessionConfig,
    json_output: bool,
) -> Result<(), anyhow::Error> {
    let manager = key_pairs(data_dir, config).await?;
    let names = manager.list().await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else if names.is_empty() {
        info!("No key pairs in {}", manager.dir().display());
    } else {
        for name in names {
            info!("{name}");
        }
    }
    Ok(())
}
