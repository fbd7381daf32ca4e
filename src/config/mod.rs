use std::{
    collections::HashMap,
    env, fs,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use directories::BaseDirs;

use crate::process::{LoaderOptions, RenderOptions};
use crate::session::SessionOptions;

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    overrides: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(default_config_path())
    }

    pub fn load_from(config_path: PathBuf) -> Self {
        let mut map = default_map();

        // Read .pysessionrc if exists
        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                map.extend(parse_rc(BufReader::new(file)));
            }
        }

        // Overlay environment variables (take precedence)
        for key in CONFIG_KEYS {
            if let Some(v) = env_value(key) {
                map.insert(key.to_string(), v);
            }
        }

        Self {
            inner: map,
            overrides: HashMap::new(),
            config_path,
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        // CLI overrides, then ENV
        if let Some(v) = self.overrides.get(key) {
            return Some(v.clone());
        }
        env_value(key).or_else(|| self.inner.get(key).cloned())
    }

    /// Override a key for this process only (CLI flags beat env and file).
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.overrides.insert(key.to_string(), value.into());
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.trim().parse::<u32>().ok())
    }

    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn image_output_path(&self) -> PathBuf {
        self.get("IMAGE_OUTPUT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("pysession").join("figures"))
    }

    pub fn log_level(&self) -> tracing::Level {
        self.get("LOG_LEVEL")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(tracing::Level::WARN)
    }

    pub fn session_options(&self) -> SessionOptions {
        let defaults = SessionOptions::default();
        SessionOptions {
            loader: LoaderOptions {
                python_path: self
                    .get("PYTHON_PATH")
                    .unwrap_or(defaults.loader.python_path),
                packages: self.get_list("PRELOAD_PACKAGES"),
                backend: self
                    .get("GRAPHICS_BACKEND")
                    .unwrap_or(defaults.loader.backend),
            },
            render: RenderOptions {
                dpi: self
                    .get_u32("FIGURE_DPI")
                    .filter(|dpi| *dpi > 0)
                    .unwrap_or(defaults.render.dpi),
            },
            empty_placeholder: self
                .get("EMPTY_OUTPUT_PLACEHOLDER")
                .unwrap_or(defaults.empty_placeholder),
        }
    }
}

fn parse_rc(reader: impl BufRead) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in reader.lines().map_while(Result::ok) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            map.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    map
}

const ENV_PREFIX: &str = "PYSESSION_";

pub const CONFIG_KEYS: &[&str] = &[
    "PYTHON_PATH",
    "PRELOAD_PACKAGES",
    "GRAPHICS_BACKEND",
    "FIGURE_DPI",
    "EMPTY_OUTPUT_PLACEHOLDER",
    "IMAGE_OUTPUT_PATH",
    "LOG_LEVEL",
    "DEFAULT_COLOR",
];

/// `PYSESSION_<KEY>` wins over the bare `<KEY>`.
fn env_value(key: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{key}"))
        .or_else(|_| env::var(key))
        .ok()
}

fn config_dir() -> PathBuf {
    BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"))
}

fn default_config_path() -> PathBuf {
    config_dir().join("pysession").join(".pysessionrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();
    let temp = env::temp_dir().join("pysession");

    // Paths
    m.insert(
        "IMAGE_OUTPUT_PATH".into(),
        temp.join("figures").to_string_lossy().into_owned(),
    );

    // Engine
    m.insert("PYTHON_PATH".into(), "python3".into());
    m.insert("PRELOAD_PACKAGES".into(), "numpy,matplotlib".into());
    m.insert("GRAPHICS_BACKEND".into(), "Agg".into());
    m.insert("FIGURE_DPI".into(), "100".into());

    // Presentation
    m.insert("EMPTY_OUTPUT_PLACEHOLDER".into(), "(no output)".into());
    m.insert("DEFAULT_COLOR".into(), "cyan".into());
    m.insert("LOG_LEVEL".into(), "warn".into());

    m
}
