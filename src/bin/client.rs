use anyhow::{bail, ensure};
use clap::Parser;
use feox_client::{
    install_defaults, ClientConfig, EndpointConfig, Expiry, Lease, NamedRegistry, Session,
    SessionPool, SetCondition,
};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Smoke-check a Redis-compatible server through the session pool", long_about = None)]
struct Args {
    /// Server host
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 6379)]
    port: u16,

    /// Logical database to select
    #[arg(short, long, default_value_t = 0)]
    db: u32,

    /// Key prefix for every key the checks touch
    #[arg(long, default_value = "feox-client-check:")]
    prefix: String,

    /// Password sent with AUTH (falls back to FEOX_CLIENT_PASSWORD)
    #[arg(long)]
    password: Option<String>,

    /// Config file path; checks run against a named pool from it
    #[arg(short, long)]
    config: Option<String>,

    /// Named pool to check (defaults to the first pool in the config file)
    #[arg(long)]
    pool: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

type Check = fn(&mut Session) -> anyhow::Result<()>;

const CHECKS: &[(&str, Check)] = &[
    ("ping", check_ping),
    ("version", check_version),
    ("set/get", check_set_get),
    ("expiring write", check_expiring_write),
    ("conditional create", check_conditional_create),
    ("prefixed scan", check_prefixed_scan),
];

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose {
        "debug"
    } else {
        &args.log_level
    };
    tracing_subscriber::fmt()
        .with_env_filter(format!("feox_client={}", log_level))
        .init();

    let mut lease = match &args.config {
        Some(path) => lease_from_file(path, args.pool.as_deref())?,
        None => {
            let password = args
                .password
                .clone()
                .or_else(|| std::env::var(feox_client::config::PASSWORD_ENV).ok())
                .unwrap_or_default();
            let config = EndpointConfig::new(args.host.clone(), args.port)
                .with_db(args.db)
                .with_prefix(args.prefix.clone())
                .with_credential(password);
            SessionPool::global().acquire(&config)
        }
    };

    let config = lease.config().clone();
    info!(
        "Checking {}:{} (db {}, prefix '{}') with feox-client v{}",
        config.host,
        config.port,
        config.db,
        config.prefix,
        env!("CARGO_PKG_VERSION")
    );

    let mut failures = 0;
    for &(name, check) in CHECKS {
        let started = Instant::now();
        match check(&mut lease) {
            Ok(()) => info!("PASS {} ({:?})", name, started.elapsed()),
            Err(e) => {
                failures += 1;
                error!("FAIL {}: {}", name, e);
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} checks failed", failures, CHECKS.len());
    }
    info!("All {} checks passed", CHECKS.len());
    Ok(())
}

fn lease_from_file(path: &str, pool: Option<&str>) -> anyhow::Result<Lease> {
    let config = ClientConfig::from_file(path)?;
    config.validate()?;
    install_defaults(config.defaults.clone())?;

    let registry = NamedRegistry::global();
    config.register(registry)?;

    let name = match pool {
        Some(name) => name.to_string(),
        None => match config.pools.first() {
            Some(entry) => entry.name.clone(),
            None => bail!("{} declares no pools", path),
        },
    };
    Ok(registry.acquire(&name, "feox-client-check")?)
}

fn check_ping(session: &mut Session) -> anyhow::Result<()> {
    session.ping()?;
    Ok(())
}

fn check_version(session: &mut Session) -> anyhow::Result<()> {
    ensure!(session.connect(), "connect failed: {}", session.error());
    let version = session.version();
    ensure!(version > 0, "server version unknown: {}", session.error());
    info!(
        "Server version {}.{}.{}",
        version / 10000,
        version / 100 % 100,
        version % 100
    );
    Ok(())
}

fn check_set_get(session: &mut Session) -> anyhow::Result<()> {
    session.set("test_set", "test_val1")?;
    let value = session.get("test_set")?;
    ensure!(
        value.as_deref() == Some(&b"test_val1"[..]),
        "read back {:?}",
        value
    );
    Ok(())
}

fn check_expiring_write(session: &mut Session) -> anyhow::Result<()> {
    session.set("test_set", "test_val1")?;
    let written = session.set_with(
        "test_set",
        "test_val2",
        SetCondition::IfExists,
        Expiry::Seconds(1),
    )?;
    ensure!(written, "conditional write on an existing key was not applied");
    let value = session.get("test_set")?;
    ensure!(
        value.as_deref() == Some(&b"test_val2"[..]),
        "read back {:?}",
        value
    );

    thread::sleep(Duration::from_millis(1200));
    let value = session.get("test_set")?;
    ensure!(value.is_none(), "key still present after expiry: {:?}", value);
    Ok(())
}

fn check_conditional_create(session: &mut Session) -> anyhow::Result<()> {
    session.del(["test_set"])?;
    let created = session.set_with(
        "test_set",
        "test_val3",
        SetCondition::IfNotExists,
        Expiry::Never,
    )?;
    ensure!(created, "create on a missing key reported not set");
    let value = session.get("test_set")?;
    ensure!(
        value.as_deref() == Some(&b"test_val3"[..]),
        "read back {:?}",
        value
    );

    let again = session.set_with(
        "test_set",
        "test_val3",
        SetCondition::IfNotExists,
        Expiry::Never,
    )?;
    ensure!(!again, "create on an existing key reported set");
    session.del(["test_set"])?;
    Ok(())
}

fn check_prefixed_scan(session: &mut Session) -> anyhow::Result<()> {
    session.set("scan-probe", "1")?;
    let mut cursor = 0;
    let mut found = false;
    loop {
        let (next, keys) = session.scan(cursor, "scan-probe*", 100)?;
        found |= keys.iter().any(|key| &key[..] == b"scan-probe");
        if next == 0 {
            break;
        }
        cursor = next;
    }
    session.del(["scan-probe"])?;
    ensure!(found, "scan did not return the unprefixed key");
    Ok(())
}
