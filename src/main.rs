use anyhow::{Context, Result};
use overdraft::config::{Settings, StoreBackend};
use overdraft::harness::{run_trial, Trial};
use overdraft::protocols::Protocol;
use overdraft::store::{LatencyStore, LockingStore, MemoryStore, PostgresStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = Settings::new()?;
    info!(backend = %settings.store.backend, "starting purchase protocol sweep");

    let store: Arc<dyn LockingStore> = match settings.store.backend {
        StoreBackend::Memory => {
            let delay = Duration::from_millis(settings.trial.latency_ms);
            Arc::new(LatencyStore::new(MemoryStore::new(), delay))
        }
        StoreBackend::Postgres => {
            info!("connecting to store at {}", settings.store.host);
            let store =
                PostgresStore::connect(&settings.database_url(), settings.store.max_connections)
                    .await?
                    .with_isolation(settings.store.isolation);
            Arc::new(store)
        }
    };

    sweep(&store, &settings).await
}

/// Seed, run, and judge one trial per protocol.
async fn sweep(store: &Arc<dyn LockingStore>, settings: &Settings) -> Result<()> {
    for protocol in Protocol::ALL {
        store
            .seed(settings.trial.initial_balance, settings.trial.price)
            .await?;

        let trial = Trial::new(protocol, settings.trial.concurrency);
        let outcome = run_trial(store, &trial).await;

        let final_balance = store
            .find_user(&trial.username)
            .await?
            .map(|user| user.balance)
            .context("seeded user disappeared during the trial")?;

        match outcome.check_invariants(
            settings.trial.initial_balance,
            settings.trial.price,
            final_balance,
        ) {
            Ok(()) => info!(
                %protocol,
                successes = outcome.successes,
                balance = %final_balance,
                "invariants hold"
            ),
            Err(violation) => warn!(
                %protocol,
                successes = outcome.successes,
                balance = %final_balance,
                %violation,
                "invariant violated"
            ),
        }
    }

    Ok(())
}
