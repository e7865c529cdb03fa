use clap::Parser;
use globset::{GlobBuilder, GlobMatcher};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{fs, fs::File, io::Error, path::PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Globs were invalid")]
    InvalidGlobs(#[from] globset::Error),
    #[error("File not found")]
    FileNotFound,
    #[error("Failed to read: {0}")]
    Io(#[from] Error),
    #[error("Failed to parse configuration: {0}")]
    ParseConfig(#[from] serde_yaml::Error),
}

/// Benchmark storing files as PostgreSQL large objects
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct Args {
    /// path to a yaml configuration file, flags take precedence over it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub dbname: Option<String>,
    #[arg(long)]
    pub user: Option<String>,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,

    /// directory whose files are uploaded
    #[arg(short, long)]
    pub input: Option<PathBuf>,
    /// directory the stored objects are downloaded to
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// file name substring used to bucket averages, may be repeated
    #[arg(long = "category")]
    pub categories: Vec<String>,

    /// only upload files whose name matches this glob
    #[arg(short, long)]
    pub glob: Option<String>,

    /// leave the large objects and the metrics table in place after the run
    #[arg(long)]
    pub keep_objects: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkConfig {
    #[serde(alias = "db", default)]
    pub database: DatabaseConfig,

    #[serde(default = "default_input")]
    pub input: PathBuf,
    #[serde(default = "default_output")]
    pub output: PathBuf,

    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    #[serde(default)]
    pub glob: Option<String>,

    #[serde(default)]
    pub keep_objects: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "default_dbname")]
    pub dbname: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dbname: default_dbname(),
            user: default_user(),
            host: default_host(),
            password: default_password(),
            port: default_port(),
        }
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            input: default_input(),
            output: default_output(),
            categories: default_categories(),
            glob: None,
            keep_objects: false,
        }
    }
}

impl BenchmarkConfig {
    /// build the configuration from the optional config file and the command line
    pub fn load(args: Args) -> Result<Self, ConfigErrors> {
        let mut config = match args.config {
            Some(ref path) => {
                if !path.is_file() {
                    error!(path = ?path, "Configuration file not found");

                    return Err(ConfigErrors::FileNotFound);
                }

                serde_yaml::from_reader(File::open(path)?)?
            }
            None => Self::default(),
        };

        config.apply(args);

        Ok(config)
    }

    /// override every value that was given on the command line
    pub fn apply(&mut self, args: Args) {
        let database = &mut self.database;

        if let Some(dbname) = args.dbname {
            database.dbname = dbname;
        }
        if let Some(user) = args.user {
            database.user = user;
        }
        if let Some(host) = args.host {
            database.host = host;
        }
        if let Some(password) = args.password {
            database.password = password;
        }
        if let Some(port) = args.port {
            database.port = port;
        }

        if let Some(input) = args.input {
            self.input = input;
        }
        if let Some(output) = args.output {
            self.output = output;
        }
        if !args.categories.is_empty() {
            self.categories = args.categories;
        }
        if args.glob.is_some() {
            self.glob = args.glob;
        }

        self.keep_objects |= args.keep_objects;
    }

    /// Compile the file name glob, if one is configured
    pub fn compile_glob(&self) -> Result<Option<GlobMatcher>, ConfigErrors> {
        self.glob
            .as_ref()
            .map(|glob| {
                GlobBuilder::new(glob)
                    .literal_separator(true)
                    .build()
                    .map(|glob| glob.compile_matcher())
            })
            .transpose()
            .map_err(ConfigErrors::from)
    }

    /// returns true if any check failed, every failure is logged
    pub fn preflight_checks(&mut self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        if !self.input.is_dir() {
            error!(
                "Input directory {} does not exist or is not a directory",
                self.input.to_string_lossy()
            );
            contains_error = true;
        }

        if self.output.exists() {
            if !self.output.is_dir() {
                error!(
                    "Output path {} exists but is not a directory",
                    self.output.to_string_lossy()
                );
                contains_error = true;
            }
        } else {
            match fs::create_dir_all(&self.output) {
                Ok(()) => info!(
                    "Created output directory {}",
                    self.output.to_string_lossy()
                ),
                Err(error) => {
                    error!(error = ?error, "Failed to create output directory {}: {error}", self.output.to_string_lossy());
                    contains_error = true;
                }
            }
        }

        if let Err(error) = self.compile_glob() {
            error!(error = ?error, "glob {:?} is invalid: {error}", self.glob);
            contains_error = true;
        }

        if self.database.port == 0 {
            error!("database.port cannot be 0");
            contains_error = true;
        }

        if self.categories.is_empty() {
            warn!("No categories defined, per-category averages will be skipped");
        } else {
            let unique = self.categories.iter().unique().cloned().collect_vec();

            if unique.len() != self.categories.len() {
                warn!("Duplicate categories are only reported once");
                self.categories = unique;
            }

            if self.categories.iter().any(String::is_empty) {
                warn!("An empty category matches every file");
            }
        }

        contains_error
    }
}

fn default_dbname() -> String {
    "test_largeobject".to_owned()
}

fn default_user() -> String {
    "tester".to_owned()
}

fn default_host() -> String {
    "localhost".to_owned()
}

fn default_password() -> String {
    "tester".to_owned()
}

fn default_port() -> u16 {
    5432
}

fn default_input() -> PathBuf {
    PathBuf::from("./input")
}

fn default_output() -> PathBuf {
    PathBuf::from("./output")
}

fn default_categories() -> Vec<String> {
    ["small", "medium", "large"]
        .into_iter()
        .map(String::from)
        .collect()
}
