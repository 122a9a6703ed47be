use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_ENV_VAR: &str = "REBAR_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub tables: TablesConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `REBAR_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV_VAR) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 计料流程参数。
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "ScheduleConfig::default_cluster_tolerance")]
    pub cluster_tolerance: f64,
    #[serde(default = "ScheduleConfig::default_text_width_factor")]
    pub text_width_factor: f64,
    #[serde(default = "ScheduleConfig::default_drawing_units_per_cm")]
    pub drawing_units_per_cm: f64,
    #[serde(default = "ScheduleConfig::default_zone")]
    pub default_zone: String,
    #[serde(default = "ScheduleConfig::default_zone_layer_prefix")]
    pub zone_layer_prefix: String,
}

impl ScheduleConfig {
    fn default_cluster_tolerance() -> f64 {
        30.0
    }

    fn default_text_width_factor() -> f64 {
        0.6
    }

    fn default_drawing_units_per_cm() -> f64 {
        1.0
    }

    fn default_zone() -> String {
        "ALL".to_string()
    }

    fn default_zone_layer_prefix() -> String {
        "$P-".to_string()
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cluster_tolerance: Self::default_cluster_tolerance(),
            text_width_factor: Self::default_text_width_factor(),
            drawing_units_per_cm: Self::default_drawing_units_per_cm(),
            default_zone: Self::default_zone(),
            zone_layer_prefix: Self::default_zone_layer_prefix(),
        }
    }
}

/// 单位重表的覆盖条目。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WeightEntry {
    pub designation: String,
    pub diameter_mm: f64,
    pub unit_weight: f64,
    #[serde(default = "WeightEntry::default_grade")]
    pub grade: String,
}

impl WeightEntry {
    fn default_grade() -> String {
        "unknown".to_string()
    }
}

/// 参考表覆盖项：单位重、弯钩长度（cm）与弯曲半径倍数。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TablesConfig {
    #[serde(default)]
    pub weights: Vec<WeightEntry>,
    #[serde(default)]
    pub hook_lengths: BTreeMap<String, f64>,
    #[serde(default)]
    pub bend_radius_multipliers: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "LayoutConfig::default_straight_length")]
    pub straight_length: f64,
    #[serde(default = "LayoutConfig::default_label_margin")]
    pub label_margin: f64,
    #[serde(default = "LayoutConfig::default_canvas_width")]
    pub canvas_width: f64,
    #[serde(default = "LayoutConfig::default_canvas_height")]
    pub canvas_height: f64,
}

impl LayoutConfig {
    fn default_straight_length() -> f64 {
        200.0
    }

    fn default_label_margin() -> f64 {
        12.0
    }

    fn default_canvas_width() -> f64 {
        260.0
    }

    fn default_canvas_height() -> f64 {
        120.0
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            straight_length: Self::default_straight_length(),
            label_margin: Self::default_label_margin(),
            canvas_width: Self::default_canvas_width(),
            canvas_height: Self::default_canvas_height(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
