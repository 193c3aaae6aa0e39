//! Disposable Postgres databases for integration tests.
//!
//! A database is carved out of an existing server when `BIBLIO_TEST_DATABASE_URL`
//! is set; otherwise a throwaway cluster is initialised with the local `initdb`
//! and `postgres` binaries. Callers skip their test when [`start_postgres`]
//! returns an error.

use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow, bail};
use postgres::NoTls;
use url::Url;

/// Environment variable naming an existing server to create test databases on.
pub const TEST_DATABASE_URL_ENV: &str = "BIBLIO_TEST_DATABASE_URL";

const CLUSTER_ROOT: &str = ".server_root/postgres";
const READY_ATTEMPTS: u32 = 30;
const READY_BACKOFF: Duration = Duration::from_millis(200);

/// Handle to a disposable database; dropping it removes the database and any
/// cluster started for it.
pub struct TestDatabase {
    connection_string: String,
    scratch: ScratchDatabase,
    cluster: Option<LocalCluster>,
}

impl TestDatabase {
    /// Connection string that can be passed to `sqlx` or other Postgres clients.
    #[must_use]
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Name of the scratch database backing this handle.
    #[must_use]
    pub fn database_name(&self) -> &str {
        &self.scratch.name
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        let _ = self.scratch.drop_database();
        if let Some(cluster) = self.cluster.take() {
            cluster.shutdown();
        }
    }
}

/// Start a disposable Postgres database.
///
/// # Errors
///
/// Returns an error if no external URL is provided and Postgres binaries are
/// unavailable or fail to start, or if the scratch database cannot be created.
pub fn start_postgres() -> Result<TestDatabase> {
    if let Ok(url) = std::env::var(TEST_DATABASE_URL_ENV) {
        let base = Url::parse(&url).context("invalid postgres connection url")?;
        let scratch = ScratchDatabase::create(&base)?;
        return Ok(TestDatabase {
            connection_string: scratch.url.to_string(),
            scratch,
            cluster: None,
        });
    }

    let cluster = LocalCluster::start()?;
    let base = cluster.url()?;
    match ScratchDatabase::create(&base) {
        Ok(scratch) => Ok(TestDatabase {
            connection_string: scratch.url.to_string(),
            scratch,
            cluster: Some(cluster),
        }),
        Err(err) => {
            cluster.shutdown();
            Err(err)
        }
    }
}

/// Throwaway cluster owned by the test process.
struct LocalCluster {
    process: Child,
    data_dir: PathBuf,
    port: u16,
}

impl LocalCluster {
    fn start() -> Result<Self> {
        let initdb = locate_binary("initdb")?;
        let server = locate_binary("postgres")?;
        let pg_isready = locate_binary("pg_isready")?;

        let port = free_port()?;
        let data_dir = fresh_data_dir()?;
        let data_arg = data_dir
            .to_str()
            .context("data dir contains non-utf8 characters")?;

        let status = Command::new(&initdb)
            .args(["-D", data_arg, "--username=postgres", "--auth=trust"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .context("failed to run initdb")?;
        if !status.success() {
            let _ = fs::remove_dir_all(&data_dir);
            bail!("initdb exited with failure status");
        }

        let process = Command::new(&server)
            .args(["-D", data_arg, "-p", &port.to_string(), "-h", "127.0.0.1"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("failed to start postgres process")?;

        let cluster = Self {
            process,
            data_dir,
            port,
        };
        if let Err(err) = cluster.wait_until_ready(&pg_isready) {
            cluster.shutdown();
            return Err(err);
        }
        Ok(cluster)
    }

    fn url(&self) -> Result<Url> {
        Url::parse(&format!(
            "postgres://postgres@127.0.0.1:{}/postgres",
            self.port
        ))
        .context("failed to build local cluster url")
    }

    fn wait_until_ready(&self, pg_isready: &Path) -> Result<()> {
        let port = self.port.to_string();
        for _ in 0..READY_ATTEMPTS {
            let ready = Command::new(pg_isready)
                .args(["-h", "127.0.0.1", "-p", &port, "-U", "postgres"])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .is_ok_and(|status| status.success());
            if ready {
                return Ok(());
            }
            thread::sleep(READY_BACKOFF);
        }
        bail!("postgres process did not become ready in time")
    }

    fn shutdown(mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
        let _ = fs::remove_dir_all(&self.data_dir);
    }
}

/// Uniquely named database created on a (possibly shared) server.
struct ScratchDatabase {
    url: Url,
    admin_url: String,
    name: String,
}

impl ScratchDatabase {
    fn create(base: &Url) -> Result<Self> {
        let name = scratch_name();
        let mut url = base.clone();
        url.set_path(&format!("/{name}"));

        let mut last_error = None;
        for admin_url in admin_candidates(base) {
            match run_admin_statement(&admin_url, format!("CREATE DATABASE \"{name}\"")) {
                Ok(()) => {
                    return Ok(Self {
                        url,
                        admin_url,
                        name,
                    });
                }
                Err(err) => last_error = Some(err),
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("failed to create database")))
    }

    fn drop_database(&self) -> Result<()> {
        run_admin_statement(
            &self.admin_url,
            format!("DROP DATABASE IF EXISTS \"{}\"", self.name),
        )
    }
}

/// Maintenance database first, then the caller-supplied database.
fn admin_candidates(base: &Url) -> Vec<String> {
    let mut admin = base.clone();
    admin.set_path("/postgres");
    let mut candidates = vec![admin.to_string()];
    if admin.path() != base.path() {
        candidates.push(base.to_string());
    }
    candidates
}

// The blocking client spins up its own runtime, so it must stay off any tokio worker.
fn run_admin_statement(admin_url: &str, statement: String) -> Result<()> {
    let admin_url = admin_url.to_string();
    thread::spawn(move || -> Result<()> {
        let config = postgres::Config::from_str(&admin_url)?;
        let mut client = config.connect(NoTls)?;
        client
            .simple_query(&statement)
            .map(|_| ())
            .with_context(|| format!("failed to execute `{statement}`"))
    })
    .join()
    .unwrap_or_else(|_| Err(anyhow!("admin statement thread panicked")))
}

fn locate_binary(name: &str) -> Result<PathBuf> {
    let preferred = [
        PathBuf::from("/opt/homebrew/opt/postgresql@16/bin"),
        PathBuf::from("/usr/local/opt/postgresql@16/bin"),
    ];
    let from_path = std::env::var_os("PATH")
        .map_or_else(Vec::new, |paths| std::env::split_paths(&paths).collect());
    let fallbacks = [
        PathBuf::from("/usr/local/bin"),
        PathBuf::from("/opt/homebrew/bin"),
    ];

    preferred
        .into_iter()
        .chain(from_path)
        .chain(fallbacks)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.exists())
        .ok_or_else(|| anyhow!("{name} binary is required for Postgres tests"))
}

fn free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("failed to reserve port")?;
    Ok(listener
        .local_addr()
        .context("failed to read listener address")?
        .port())
}

fn fresh_data_dir() -> Result<PathBuf> {
    let root = PathBuf::from(CLUSTER_ROOT);
    fs::create_dir_all(&root)
        .with_context(|| format!("failed to create base dir {}", root.display()))?;
    for attempt in 0..5 {
        let candidate = root.join(format!("biblio-pg-{}-{attempt}", unix_nanos()));
        if !candidate.exists() {
            fs::create_dir_all(&candidate)
                .with_context(|| format!("failed to create data dir {}", candidate.display()))?;
            return Ok(candidate);
        }
    }
    bail!("failed to allocate temporary data directory for postgres");
}

fn scratch_name() -> String {
    format!("biblio_test_{}_{}", std::process::id(), unix_nanos())
}

fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}
