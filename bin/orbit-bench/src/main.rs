//! Orbit Evictor micro-bench
//!
//! Seeds a redb-backed record store with synthetic objects, then drives
//! randomized locate/save workloads from several threads and prints
//! counter and throughput summaries for each persistence mode.

use anyhow::{Context, Result, bail};
use clap::Parser;
use orbit_common::config::{EvictorSettings, PersistenceMode, SweepTriggerSetting};
use orbit_common::{Error, Identity, Record};
use orbit_evictor::{Activator, Evictor};
use orbit_store::{PersistentStore, RedbStore};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "orbit-bench")]
#[command(about = "Micro-bench for the Orbit evictor over a redb store")]
#[command(version)]
struct Args {
    /// Record store file (recreated on every run)
    #[arg(long, default_value = "./orbit-bench.redb")]
    store_path: PathBuf,

    /// Number of distinct identities to seed
    #[arg(long, default_value = "10000")]
    objects: usize,

    /// Cache capacity in entries
    #[arg(long, default_value = "1024")]
    capacity: usize,

    /// Worker threads
    #[arg(long, default_value = "4")]
    threads: usize,

    /// Operations per thread
    #[arg(long, default_value = "50000")]
    ops: usize,

    /// Fraction of operations that mutate and save (0.0 - 1.0)
    #[arg(long, default_value = "0.1")]
    write_ratio: f64,

    /// Persistence mode: immediate | transactional | background
    #[arg(long, default_value = "background")]
    mode: String,

    /// Background flush interval in milliseconds
    #[arg(long, default_value = "200")]
    flush_interval_ms: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Synthetic object state, bincode-encoded into its record.
#[derive(Debug, Serialize, Deserialize)]
struct Profile {
    visits: u64,
    score: u64,
}

/// Servant with its own lock; the evictor never takes it.
struct ProfileServant {
    state: Mutex<Profile>,
}

impl ProfileServant {
    fn encode(&self) -> orbit_common::Result<Record> {
        bincode::serialize(&*self.state.lock())
            .map(Record::from)
            .map_err(|e| Error::serialization(e.to_string()))
    }
}

struct ProfileActivator;

impl Activator for ProfileActivator {
    type Servant = ProfileServant;

    fn instantiate(&self, _id: &Identity, record: &Record) -> orbit_common::Result<ProfileServant> {
        let profile: Profile = bincode::deserialize(record.as_slice())
            .map_err(|e| Error::serialization(e.to_string()))?;
        Ok(ProfileServant {
            state: Mutex::new(profile),
        })
    }
}

fn parse_mode(mode: &str) -> Result<PersistenceMode> {
    match mode {
        "immediate" => Ok(PersistenceMode::Immediate),
        "transactional" => Ok(PersistenceMode::Transactional),
        "background" => Ok(PersistenceMode::Background),
        other => bail!("unknown persistence mode '{other}'"),
    }
}

fn identity(index: usize) -> Identity {
    Identity::new_unchecked("profile", format!("profile-{index}"))
}

fn seed(store: &RedbStore, objects: usize) -> Result<()> {
    let started = Instant::now();
    for index in 0..objects {
        let profile = Profile {
            visits: 0,
            score: index as u64,
        };
        let record = Record::from(bincode::serialize(&profile)?);
        store.put(&identity(index), &record)?;
    }
    info!(
        "seeded {} records in {:.2}s",
        objects,
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mode = parse_mode(&args.mode)?;
    if !(0.0..=1.0).contains(&args.write_ratio) {
        bail!("--write-ratio must be within 0.0..=1.0");
    }

    // Fresh store every run
    if args.store_path.exists() {
        std::fs::remove_file(&args.store_path)
            .with_context(|| format!("removing {}", args.store_path.display()))?;
    }
    let store = Arc::new(RedbStore::open(&args.store_path)?);
    seed(&store, args.objects)?;

    let settings = EvictorSettings {
        capacity: args.capacity,
        mode,
        flush_interval_ms: args.flush_interval_ms,
        sweep_trigger: SweepTriggerSetting::OnFinished,
        drain_timeout_ms: 60_000,
    };
    let evictor = Arc::new(Evictor::new(&settings, store, ProfileActivator));

    info!(
        "running {} threads x {} ops, capacity {}, mode {:?}",
        args.threads,
        args.ops,
        evictor.capacity(),
        mode
    );
    let started = Instant::now();
    let mut workers = Vec::new();
    for worker in 0..args.threads {
        let evictor = Arc::clone(&evictor);
        let objects = args.objects;
        let ops = args.ops;
        let write_ratio = args.write_ratio;
        workers.push(thread::spawn(move || -> Result<()> {
            let mut rng = StdRng::seed_from_u64(worker as u64);
            for _ in 0..ops {
                let id = identity(rng.gen_range(0..objects));
                let lease = evictor.locate(&id)?;
                if rng.gen_bool(write_ratio) {
                    lease.state.lock().visits += 1;
                    let record = lease.encode()?;
                    evictor.save(&lease, record)?;
                }
            }
            Ok(())
        }));
    }
    for worker in workers {
        worker
            .join()
            .expect("worker thread panicked")
            .context("worker failed")?;
    }
    let elapsed = started.elapsed();

    let total_ops = args.threads * args.ops;
    let stats = evictor.stats();
    info!(
        "{} ops in {:.2}s ({:.0} ops/s)",
        total_ops,
        elapsed.as_secs_f64(),
        total_ops as f64 / elapsed.as_secs_f64()
    );
    info!(
        "hits {} misses {} evictions {} size {} dirty {}",
        stats.hits, stats.misses, stats.evictions, stats.size, stats.dirty
    );

    // Drain so every deferred write is durable before exit
    evictor.deactivate()?;
    info!("drained in {:.2}s total", started.elapsed().as_secs_f64());
    Ok(())
}
