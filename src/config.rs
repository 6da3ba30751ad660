use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the chunk index, tree snapshots and repo records are stored
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// GitHub API access
    pub github: GithubConfig,
    /// Serve a single local git checkout instead of talking to GitHub
    pub local_repo: Option<PathBuf>,
    /// Chunk sizing policy
    pub chunking: ChunkingConfig,
    /// Ingestion concurrency and job bookkeeping
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    pub api_url: String,
    /// Personal access token; anonymous requests are heavily rate limited.
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

/// Chunk sizes are measured in characters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub target_size: usize,
    pub max_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_size: 1000,
            max_size: 2000,
            overlap: 150,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Files fetched and chunked concurrently per batch
    pub concurrency: usize,
    /// Files larger than this are treated as binary and never fetched
    pub max_file_bytes: u64,
    /// Finished jobs are forgotten after this many seconds
    pub job_ttl_secs: u64,
    /// Maximum number of job records kept in memory
    pub job_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            max_file_bytes: 2 * 1024 * 1024,
            job_ttl_secs: 3600,
            job_capacity: 1024,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:9100".to_string(),
            github: GithubConfig::default(),
            local_repo: None,
            chunking: ChunkingConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("REPO_ATLAS_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("REPO_ATLAS_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(url) = std::env::var("GITHUB_API_URL") {
            config.github.api_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            if !token.is_empty() {
                config.github.token = Some(token);
            }
        }
        if let Ok(path) = std::env::var("REPO_ATLAS_LOCAL_REPO") {
            config.local_repo = Some(PathBuf::from(path));
        }

        parse_env("CHUNK_TARGET_SIZE", &mut config.chunking.target_size);
        parse_env("CHUNK_MAX_SIZE", &mut config.chunking.max_size);
        parse_env("CHUNK_OVERLAP", &mut config.chunking.overlap);
        parse_env("INGEST_CONCURRENCY", &mut config.ingest.concurrency);
        parse_env("INGEST_MAX_FILE_BYTES", &mut config.ingest.max_file_bytes);
        parse_env("JOB_TTL_SECS", &mut config.ingest.job_ttl_secs);
        parse_env("JOB_CAPACITY", &mut config.ingest.job_capacity);

        // A zero-width batch would never make progress
        config.ingest.concurrency = config.ingest.concurrency.max(1);
        if config.chunking.max_size < config.chunking.target_size {
            config.chunking.max_size = config.chunking.target_size;
        }

        config
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }

    pub fn trees_dir(&self) -> PathBuf {
        self.data_dir.join("trees")
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("repos.json")
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Ok(val) = std::env::var(key) {
        if let Ok(v) = val.parse() {
            *target = v;
        }
    }
}
