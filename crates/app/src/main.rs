use std::env;
use std::path::PathBuf;
use std::time::Duration;

use app::server::{AppState, router};
use runlet::RuntimeConfig;
use runlet::runtime::PythonRuntime;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const DEFAULT_PYTHON_PATH: &str = "python3";
const DEFAULT_ENTRYPOINT: &str = "main.py";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MAX_INFLIGHT: usize = 128;
const REQUEST_TIMEOUT_MARGIN_SECONDS: u64 = 30;

#[derive(Clone)]
struct AppConfig {
    python_path: String,
    base_tempdir_path: PathBuf,
    default_entrypoint: String,
    timeout_seconds: u64,
    port: u16,
    max_inflight: usize,
}

impl AppConfig {
    fn from_env() -> anyhow::Result<Self> {
        let base_tempdir_path = match env::var("RUNLET_BASE_TEMPDIR_PATH") {
            Ok(path) => PathBuf::from(path),
            Err(_) => env::temp_dir(),
        };
        Ok(Self {
            python_path: env_or("RUNLET_PYTHON_PATH", DEFAULT_PYTHON_PATH),
            base_tempdir_path,
            default_entrypoint: env_or("RUNLET_DEFAULT_ENTRYPOINT", DEFAULT_ENTRYPOINT),
            timeout_seconds: env_parsed("RUNLET_TIMEOUT_SECONDS", DEFAULT_TIMEOUT_SECONDS)?,
            port: env_parsed("RUNLET_PORT", DEFAULT_PORT)?,
            max_inflight: env_parsed("RUNLET_MAX_INFLIGHT", DEFAULT_MAX_INFLIGHT)?,
        })
    }

    fn to_runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            python_path: self.python_path.clone(),
            base_tempdir_path: self.base_tempdir_path.clone(),
            default_entrypoint: self.default_entrypoint.clone(),
            timeout: Duration::from_secs(self.timeout_seconds),
        }
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds + REQUEST_TIMEOUT_MARGIN_SECONDS)
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_owned())
}

fn env_parsed<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|err| anyhow::anyhow!("invalid {name}: {err}")),
        Err(_) => Ok(default),
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = AppConfig::from_env()?;
    let runtime = PythonRuntime::new(config.to_runtime_config());
    let state = AppState { runtime };

    let host = "0.0.0.0";
    let addr = format!("{host}:{}", config.port);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()?;
    rt.block_on(async move {
        let app = router(state, config.request_timeout(), config.max_inflight);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        log::info!("listening on {addr}");
        axum::serve(listener, app).await?;
        Ok::<(), anyhow::Error>(())
    })?;
    Ok(())
}
