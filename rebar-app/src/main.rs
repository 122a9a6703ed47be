use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use rebar_config::{AppConfig, ConfigError};
use rebar_io::{
    JsonSnapshotFacade, RecordLayout, ScheduleDocument, ScheduleSaver, SnapshotLoader,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod report;
mod setup;

/// 从 CAD 图元快照生成分区钢筋计料表
#[derive(Parser, Debug)]
#[command(name = "rebar-schedule")]
#[command(version)]
struct Cli {
    /// 图元快照（JSON）
    input: PathBuf,

    /// 指定配置文件，缺省时按 REBAR_CONFIG 或 ./config/default.toml 查找
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 将计料表（含示意图）写出为 JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 只输出汇总、合计与指纹
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = load_configuration(cli.config.clone());
    init_logging(&config, cli.quiet);
    info!(input = %cli.input.display(), "启动钢筋计料");

    match run(&cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "计料失败");
            eprintln!("錯誤: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, config: &AppConfig) -> anyhow::Result<()> {
    let facade = JsonSnapshotFacade::new();
    let snapshot = facade
        .load(&cli.input)
        .with_context(|| format!("讀取圖元快照 {} 失敗", cli.input.display()))?;

    let builder = setup::schedule_builder(config);
    let schedule = builder
        .build_snapshot(&snapshot)
        .context("建立計料表失敗")?;

    let document = ScheduleDocument::new(schedule, Vec::new()).context("計算指紋失敗")?;
    let rendered = if cli.quiet {
        report::render_summary(&document)
    } else {
        report::render(&document)
    }
    .context("生成報表失敗")?;
    print!("{rendered}");

    if let Some(output) = &cli.output {
        write_document(config, document, &cli.input, output)?;
    }
    Ok(())
}

fn write_document(
    config: &AppConfig,
    document: ScheduleDocument,
    input: &Path,
    output: &Path,
) -> anyhow::Result<()> {
    let layout = setup::diagram_layout(config);
    let layouts: Vec<RecordLayout> = document
        .schedule
        .records()
        .map(|record| RecordLayout {
            record: record.id,
            layout: layout.layout_record(record),
        })
        .collect();
    let document = ScheduleDocument {
        layouts,
        ..document
    }
    .with_source(input.display().to_string());

    JsonSnapshotFacade::new()
        .save(&document, output)
        .with_context(|| format!("寫出計料表 {} 失敗", output.display()))?;
    info!(path = %output.display(), layouts = document.layouts.len(), "计料表已写出");
    Ok(())
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig, quiet: bool) {
    let level = if quiet {
        "warn".to_string()
    } else {
        config.logging.level.clone()
    };
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
