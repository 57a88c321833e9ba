/// 姿态哨兵 (Pose Sentinel)
///
/// 身份锁定 + 姿态异常监控
///
/// 线程架构:
/// 1. 工作线程: 取帧 → 锁定 → 特征 → 窗口 → 评分 → 分类 (独占全部可变状态)
/// 2. 导出线程: 定时读取最新快照, 输出遥测 / 写预览图
/// 3. 控制台:   stdin 命令 (activate / deactivate / beacon / rssi / quit)
///
/// 主程序入口 - 直接运行: cargo run --bin sentinel --release -- --replay data/session.jsonl
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use crossbeam_channel::{select, tick, Receiver};
use mimalloc::MiMalloc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pose_sentinel::detection::ReplayFeed;
use pose_sentinel::gen_time_string;
use pose_sentinel::models::{AutoencoderScorer, OnnxReconstructor, ScoreProfile};
use pose_sentinel::pipeline::{AlertStatus, Command, ControlFlags, Pipeline, SharedState, Worker};
use pose_sentinel::tracking::SharedBeacon;
use pose_sentinel::SentinelConfig;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// 姿态哨兵参数
#[derive(Parser, Debug)]
#[command(author, version, about = "姿态哨兵 - 身份锁定姿态异常监控", long_about = None)]
struct Args {
    /// 配置文件 (不存在时写出默认配置)
    #[arg(short, long, default_value = "sentinel.json")]
    config: PathBuf,

    /// 检测录制 (JSON Lines)
    #[arg(short, long)]
    replay: PathBuf,

    /// 异常评分模型 (ONNX)
    #[arg(short, long, default_value = "models/autoencoder.onnx")]
    model: PathBuf,

    /// 评分参数 (默认与模型同名的 .json)
    #[arg(long)]
    profile: Option<PathBuf>,

    /// 初始信标距离 (米)
    #[arg(long)]
    beacon_distance: Option<f32>,

    /// 预览图输出目录
    #[arg(long)]
    preview_dir: Option<PathBuf>,

    /// 遥测导出间隔 (毫秒)
    #[arg(long, default_value_t = 1000)]
    telemetry_ms: u64,

    /// 回放帧率, 0 表示不限速
    #[arg(long, default_value_t = 30.0)]
    replay_fps: f32,
}

/// 控制台命令
#[derive(Debug, Clone, PartialEq)]
enum ConsoleCommand {
    Activate,
    Deactivate,
    Beacon(f32),
    Rssi(Vec<f32>),
    Quit,
}

fn parse_command(line: &str) -> Result<ConsoleCommand> {
    let mut parts = line.split_whitespace();
    let Some(cmd) = parts.next() else {
        bail!("empty command");
    };
    match cmd.to_ascii_lowercase().as_str() {
        "activate" | "a" => Ok(ConsoleCommand::Activate),
        "deactivate" | "d" => Ok(ConsoleCommand::Deactivate),
        "quit" | "q" | "exit" => Ok(ConsoleCommand::Quit),
        "beacon" => {
            let metres: f32 = parts
                .next()
                .ok_or_else(|| anyhow!("usage: beacon <metres>"))?
                .parse()
                .context("beacon distance")?;
            if !(metres.is_finite() && metres > 0.0) {
                bail!("beacon distance must be positive");
            }
            Ok(ConsoleCommand::Beacon(metres))
        }
        "rssi" => {
            let samples = parts
                .map(|s| s.parse::<f32>().context("rssi sample"))
                .collect::<Result<Vec<_>>>()?;
            if samples.is_empty() {
                bail!("usage: rssi <dBm> [<dBm> ...]");
            }
            Ok(ConsoleCommand::Rssi(samples))
        }
        other => bail!("unknown command '{}'", other),
    }
}

fn default_profile_path(model: &Path) -> PathBuf {
    model.with_extension("json")
}

/// 控制台线程: 阻塞读 stdin, 直到 quit 或输入结束
fn spawn_console(control: Arc<ControlFlags>, beacon: SharedBeacon) -> Result<()> {
    std::thread::Builder::new()
        .name("sentinel-console".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(ConsoleCommand::Activate) => control.request(Command::Activate),
                    Ok(ConsoleCommand::Deactivate) => control.request(Command::Deactivate),
                    Ok(ConsoleCommand::Beacon(m)) => {
                        beacon.set_distance(m);
                        info!("📡 信标距离: {:.2}m", m);
                    }
                    Ok(ConsoleCommand::Rssi(samples)) => match beacon.set_rssi_samples(&samples) {
                        Some(m) => info!("📡 RSSI {} 个样本 → {:.2}m", samples.len(), m),
                        None => warn!("⚠️ RSSI 样本无效"),
                    },
                    Ok(ConsoleCommand::Quit) => {
                        control.request_stop();
                        break;
                    }
                    Err(e) => warn!("⚠️ {}", e),
                }
            }
        })?;
    Ok(())
}

/// 写预览图: 先写临时文件再改名, 读者不会看到半张图
fn write_preview(dir: &Path, name: &str, jpeg: &[u8]) -> Result<()> {
    let tmp = dir.join(format!(".{}.tmp", name));
    std::fs::write(&tmp, jpeg).with_context(|| format!("write {}", tmp.display()))?;
    std::fs::rename(&tmp, dir.join(name))?;
    Ok(())
}

/// 告警记录 (单行 JSON)
fn alert_record(alert: &AlertStatus) -> String {
    serde_json::json!(alert).to_string()
}

/// 导出线程: 定时读取最新快照
fn run_exporter(shared: SharedState, every: Duration, preview_dir: Option<PathBuf>, stop: Receiver<()>) {
    let ticker = tick(every);
    let mut last_alert = AlertStatus::default();

    loop {
        select! {
            recv(ticker) -> _ => {}
            recv(stop) -> _ => break,
        }

        let snapshot = shared.snapshot();
        match serde_json::to_string(snapshot.as_ref()) {
            Ok(json) => info!(target: "telemetry", "{}", json),
            Err(e) => warn!("⚠️ 遥测序列化失败: {}", e),
        }

        let alert = shared.alert();
        let new_anomaly = alert.is_new_anomaly(&last_alert);
        if alert.should_report(&last_alert) {
            info!(target: "alert", "{}", alert_record(&alert));
        }

        if let (Some(dir), Some(jpeg)) = (&preview_dir, shared.preview()) {
            if let Err(e) = write_preview(dir, "latest.jpg", &jpeg) {
                warn!("⚠️ 预览写入失败: {:#}", e);
            }
            if new_anomaly {
                let name = format!("anomaly_{}.jpg", gen_time_string("-"));
                match write_preview(dir, &name, &jpeg) {
                    Ok(()) => info!("📸 异常截图: {}", name),
                    Err(e) => warn!("⚠️ 异常截图写入失败: {:#}", e),
                }
            }
        }
        last_alert = alert;
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args = Args::parse();

    // 1. 配置
    let mut config = SentinelConfig::load(&args.config)
        .with_context(|| format!("load config {}", args.config.display()))?;
    config.apply_env_overrides().context("environment overrides")?;

    // 2. 评分模型
    let profile_path = args
        .profile
        .clone()
        .unwrap_or_else(|| default_profile_path(&args.model));
    let profile = ScoreProfile::load(&profile_path)
        .with_context(|| format!("load score profile {}", profile_path.display()))?;
    if profile.window_size != config.window_size {
        warn!(
            "⚠️ 配置窗口 {} 与模型窗口 {} 不一致, 使用模型窗口",
            config.window_size, profile.window_size
        );
        config.window_size = profile.window_size;
    }
    config.validate().context("invalid configuration")?;
    config.log_summary();

    let backend = OnnxReconstructor::new(&args.model)
        .with_context(|| format!("load model {}", args.model.display()))?;
    let scorer = AutoencoderScorer::new(backend, profile, config.threshold_override)?;

    // 3. 帧源与检测器
    let feed = ReplayFeed::load(&args.replay)
        .with_context(|| format!("load replay {}", args.replay.display()))?;
    let interval = (args.replay_fps > 0.0).then(|| Duration::from_secs_f32(1.0 / args.replay_fps));
    let (frames, detector) = feed.split(interval);

    // 4. 流水线
    let beacon = SharedBeacon::new(args.beacon_distance);
    let pipeline = Pipeline::new(
        config,
        Box::new(detector),
        Box::new(scorer),
        Box::new(beacon.clone()),
    )?;

    if let Some(dir) = &args.preview_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }

    let control = Arc::new(ControlFlags::new());
    let shared = SharedState::new();

    let worker = Worker::new(pipeline, frames, Arc::clone(&control), shared.clone())
        .with_preview(args.preview_dir.is_some())
        .spawn()?;

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
    let exporter = {
        let shared = shared.clone();
        let every = Duration::from_millis(args.telemetry_ms.max(1));
        let dir = args.preview_dir.clone();
        std::thread::Builder::new()
            .name("sentinel-exporter".to_string())
            .spawn(move || run_exporter(shared, every, dir, stop_rx))?
    };

    spawn_console(Arc::clone(&control), beacon)?;
    info!("✅ 已启动 | 命令: activate / deactivate / beacon <m> / rssi <dBm>... / quit");

    // 5. 等待工作线程结束 (quit 或录制播放完毕)
    let summary = worker
        .join()
        .map_err(|_| anyhow!("worker thread panicked"))?;
    control.request_stop();
    drop(stop_tx);
    if exporter.join().is_err() {
        error!("❌ 导出线程异常退出");
    }

    let last = shared.alert();
    info!(
        "📊 处理 {} 帧, 跳过 {} 帧, 最后告警: {}",
        summary.frames_processed,
        summary.frames_skipped,
        last.anomaly_type.map_or("无", |l| l.as_str())
    );
    Ok(())
}
