use clap::Parser;
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use dungeon_claim::{
    ClaimEngine,
    binder::ControlBinder,
    collab::{
        AccountChanges,
        Backend,
        http_backend::HttpBackend,
        in_memory::{
            InMemoryLedger,
            InMemoryWallet,
            InMemoryWorld,
        },
    },
    config::{
        AuthorityPolicy,
        EngineConfig,
    },
    types::{
        AdjustDirection,
        DiscreteItem,
        FungibleKind,
        Identity,
        TokenAmount,
    },
};
use std::{
    sync::OnceLock,
    time::Duration,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};
use url::Url;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(version, about = "Claim dungeon items against a simulated ledger", long_about = None)]
struct Args {
    /// JSON engine configuration; missing files fall back to defaults.
    #[arg(short, long, default_value = "~/.dungeon-claim/config.json")]
    config: String,

    /// Account exposed by the simulated wallet.
    #[arg(short, long, default_value = "0xabc")]
    identity: String,

    /// Authority identity allowed to adjust gold; overrides the config file.
    #[arg(long)]
    authority: Option<String>,

    /// Items to claim after connecting.
    #[arg(short, long, value_delimiter = ',')]
    mint: Vec<DiscreteItem>,

    /// Mint this much gold (human units) to the connected identity. Requires the identity
    /// to be the authority.
    #[arg(long)]
    grant_gold: Option<String>,

    /// Provisioning backend; the in-memory backend is used when absent.
    #[arg(long)]
    backend_url: Option<Url>,

    /// How long to keep the reconciliation loop running before printing the panel.
    #[arg(long, default_value = "0")]
    run_secs: u64,

    #[arg(long, default_value = "false")]
    stderr_log: bool,

    #[arg(long, default_value = "logs")]
    log_dir: String,
}

fn init_tracing(args: &Args) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.stderr_log {
        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
        return;
    }
    let appender = rolling::daily(&args.log_dir, "dungeon-claim.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = EngineConfig::load(&args.config)
        .wrap_err_with(|| format!("loading config from {}", args.config))?;
    if let Some(authority) = &args.authority {
        config.authority = AuthorityPolicy::single(authority.as_str());
    }
    if let Some(url) = &args.backend_url {
        config.backend_url = Some(url.clone());
    }
    Ok(config)
}

async fn handle_interrupt() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received interrupt, exiting"),
        Err(_) => tracing::warn!("Received interrupt error, exiting anyway"),
    }
}

async fn play<B: Backend>(
    args: &Args,
    engine: ClaimEngine<InMemoryWallet, B, InMemoryLedger>,
    account_changes: AccountChanges,
) -> Result<()> {
    let identity = engine
        .connect()
        .await
        .wrap_err("connecting wallet")?;
    println!("Connected as {identity}");

    for &item in &args.mint {
        match engine.mint_item(item, &identity).await {
            Ok(receipt) => println!(
                "Claimed {item}: {} (tx {}, block {})",
                receipt.uri, receipt.tx, receipt.block_height
            ),
            Err(err) if err.is_precondition() => println!("Skipped {item}: {err}"),
            Err(err) => println!("Could not claim {item}: {err}"),
        }
    }

    if let Some(raw) = &args.grant_gold {
        let amount = TokenAmount::from_human(raw, engine.config().gold_decimals)
            .wrap_err("parsing --grant-gold")?;
        match engine
            .adjust_fungible(FungibleKind::Gold, &identity, amount, AdjustDirection::Mint)
            .await
        {
            Ok(receipt) => println!("Granted {raw} gold (tx {})", receipt.tx),
            Err(err) => println!("Could not grant gold: {err}"),
        }
    }

    let run_for = Duration::from_secs(args.run_secs);
    engine
        .run(account_changes, async {
            tokio::select! {
                _ = tokio::time::sleep(run_for) => {}
                _ = handle_interrupt() => {}
            }
        })
        .await;

    for view in engine.describe_inventory().await {
        println!(
            "{}: {} ({})",
            view.entry.item, view.metadata.name, view.image_url
        );
    }

    let mut binder = ControlBinder::new(engine.config().gold_decimals);
    binder.repaint(&engine.snapshot());
    println!("{}", binder.panel());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    init_tracing(&args);
    tracing::info!("starting dungeon-claim");

    let config = load_config(&args)?;
    let world = InMemoryWorld::new();
    let (wallet, account_changes) =
        InMemoryWallet::new(Some(Identity::new(&args.identity)));

    match config.backend_url.clone() {
        Some(url) => {
            let backend = HttpBackend::new(&url).wrap_err("building backend client")?;
            tracing::info!(%backend, "using HTTP backend");
            let engine = ClaimEngine::new(Some(wallet), backend, world.ledger(), config);
            play(&args, engine, account_changes).await
        }
        None => {
            let engine = ClaimEngine::new(Some(wallet), world.backend(), world.ledger(), config);
            play(&args, engine, account_changes).await
        }
    }
}
