use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use treemirror_lib::config::{SyncSettings, CONFIG_FILE};
use treemirror_lib::core::{comparator, TracingProgress};
use treemirror_lib::logging::{get_log_dir, parse_level, LogConfig, SizeRotatingWriter};
use treemirror_lib::{FreedesktopTrash, LocalStorage, MirrorEngine};

/// 把目标目录同步为参考目录的镜像，多余的内容移入回收站
#[derive(Parser, Debug)]
#[command(name = "treemirror")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 被修改的目标目录
    target: String,

    /// 作为基准的参考目录（不会被修改）
    reference: String,

    /// 回收站位置（默认使用系统回收站）
    #[arg(long, value_name = "DIR")]
    trash_dir: Option<PathBuf>,

    /// 额外忽略的名称或通配符模式，可重复
    #[arg(long = "ignore", value_name = "PATTERN")]
    ignore: Vec<String>,

    /// 目标目录不存在时报错而不是自动创建
    #[arg(long)]
    no_auto_create: bool,

    /// 同步后比较两棵树并列出差异
    #[arg(long)]
    verify: bool,

    /// 以 JSON 输出报告
    #[arg(long)]
    json: bool,

    /// 日志级别: error, warn, info, debug, trace
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// 配置文件路径
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// 输出每一步操作
    #[arg(short, long)]
    verbose: bool,
}

/// 初始化日志系统
fn init_logging(config: &LogConfig, level_override: Option<&str>, verbose: bool) {
    let level = if verbose {
        tracing::Level::TRACE
    } else {
        level_override
            .and_then(parse_level)
            .unwrap_or_else(|| config.tracing_level())
    };
    let env_filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    // 控制台输出到 stderr，stdout 留给报告
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let file_layer = if config.enabled {
        SizeRotatingWriter::new(&get_log_dir(&treemirror_lib::app_config_dir()), config.max_size_mb)
            .ok()
            .map(|writer| {
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
            })
    } else {
        None
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer);
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config_file = cli
        .config
        .clone()
        .unwrap_or_else(|| treemirror_lib::app_config_dir().join(CONFIG_FILE));

    init_logging(
        &LogConfig::load_from(&config_file),
        cli.log_level.as_deref(),
        cli.verbose,
    );

    let mut settings = SyncSettings::load_from(&config_file);
    settings.ignore_patterns.extend(cli.ignore.iter().cloned());
    if cli.no_auto_create {
        settings.auto_create_target = false;
    }
    if let Some(dir) = &cli.trash_dir {
        settings.trash_dir = Some(dir.clone());
    }

    let trash = settings
        .trash_dir
        .clone()
        .map(FreedesktopTrash::new)
        .unwrap_or_else(FreedesktopTrash::at_default_location);
    let sync_config = settings.to_sync_config();
    let ignore = sync_config.ignore.clone();

    let mut engine = MirrorEngine::with_config(
        Arc::new(LocalStorage::new()),
        Arc::new(trash),
        sync_config,
    );
    if cli.verbose {
        engine = engine.with_progress(Arc::new(TracingProgress));
    }

    let report = engine
        .synchronize(&cli.target, &cli.reference)
        .with_context(|| format!("同步失败: {} <- {}", cli.target, cli.reference))?;

    let differences = if cli.verify {
        Some(
            comparator::compare_trees(&report.target_root, &report.reference_root, &ignore)
                .context("比较目录树失败")?,
        )
    } else {
        None
    };

    if cli.json {
        let output = serde_json::json!({
            "report": &report,
            "differences": &differences,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{report}");
        if let Some(diffs) = &differences {
            if diffs.is_empty() {
                println!("校验通过: 目标与参考一致");
            } else {
                let summary = comparator::summarize(diffs);
                println!(
                    "校验发现 {} 处差异 (缺失 {}, 多余 {}, 大小不同 {}, 类型不同 {}):",
                    summary.total(),
                    summary.missing_count,
                    summary.extra_count,
                    summary.size_mismatch_count,
                    summary.kind_mismatch_count
                );
                for diff in diffs {
                    println!("  {diff}");
                }
            }
        }
    }

    if report.has_failures() {
        Ok(ExitCode::from(1))
    } else if differences.is_some_and(|d| !d.is_empty()) {
        Ok(ExitCode::from(2))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}
