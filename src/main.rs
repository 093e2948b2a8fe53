use clap::{Parser, Subcommand};
use cryobus::config::{InstrumentConfig, InstrumentKind, LinkConfig, RackConfig};
use cryobus::domain::model::{Axis, ControlMode, Identity, MagnetAction, ProbeRate, Reading};
use cryobus::drivers::{self, AutoMode, ChannelUsage, Rig};
use cryobus::utils::error::{BusError, ScpiFaultKind};
use cryobus::utils::{logger, validation::Validate};
use std::str::FromStr;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "cryobus")]
#[command(about = "Command-line control for Oxford Instruments cryogenic racks")]
struct Args {
    /// Path to the rack configuration file
    #[arg(short, long, default_value = "rack.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit machine-readable JSON instead of text lines
    #[arg(long)]
    json: bool,

    /// Dry run - show what would be sent without opening any link
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Identify instruments and decode their status registers
    Status {
        /// Instrument name from the rack file; omit for the whole rack
        instrument: Option<String>,
    },
    /// Read one parameter (level1, temp2, field, switch-heater, ...)
    Read {
        instrument: String,
        parameter: String,

        /// Magnet axis for mercury_ips parameters
        #[arg(long, default_value = "z")]
        axis: String,
    },
    /// Write a setpoint or mode
    Set {
        instrument: String,
        parameter: String,
        value: String,

        /// Magnet axis for mercury_ips parameters
        #[arg(long, default_value = "z")]
        axis: String,
    },
    /// Trigger a magnet ramp action (hold, to-setpoint, to-zero, clamp)
    Action {
        instrument: String,
        action: String,

        #[arg(long, default_value = "z")]
        axis: String,
    },
    /// Poll one parameter on an interval and log CSV rows
    Watch {
        instrument: String,
        parameter: String,

        /// Seconds between polls
        #[arg(long, default_value = "1")]
        interval: u64,

        /// Stop after this many rows; run until interrupted when omitted
        #[arg(long)]
        count: Option<u64>,

        /// CSV output path; stdout when omitted
        #[arg(short, long)]
        output: Option<String>,

        #[arg(long, default_value = "z")]
        axis: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // 初始化日誌：--json 時連日誌也走 JSON，方便整段輸出進後處理
    if args.json {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🧊 Starting cryobus CLI");
    tracing::info!("📁 Loading rack configuration from: {}", args.config);

    // 載入機架配置
    let config = match RackConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load rack file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!(
        "✅ Rack '{}' loaded: {} instruments",
        config.rack.name,
        config.instruments.len()
    );

    if let Err(e) = run(&args, &config).await {
        // 記錄詳細錯誤信息
        tracing::error!(
            "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        // 輸出用戶友好的錯誤信息
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            cryobus::utils::error::ErrorSeverity::Low => 0, // 警告，但成功
            cryobus::utils::error::ErrorSeverity::Medium => 2, // 重試錯誤
            cryobus::utils::error::ErrorSeverity::High => 1, // 處理錯誤
            cryobus::utils::error::ErrorSeverity::Critical => 3, // 系統錯誤
        };

        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

async fn run(args: &Args, config: &RackConfig) -> Result<(), BusError> {
    match &args.command {
        Command::Status { instrument } => run_status(args, config, instrument.as_deref()).await,
        Command::Read {
            instrument,
            parameter,
            axis,
        } => run_read(args, config, instrument, parameter, axis).await,
        Command::Set {
            instrument,
            parameter,
            value,
            axis,
        } => run_set(args, config, instrument, parameter, value, axis).await,
        Command::Action {
            instrument,
            action,
            axis,
        } => run_action(args, config, instrument, action, axis).await,
        Command::Watch {
            instrument,
            parameter,
            interval,
            count,
            output,
            axis,
        } => run_watch(args, config, instrument, parameter, *interval, *count, output.as_deref(), axis).await,
    }
}

async fn run_status(args: &Args, config: &RackConfig, only: Option<&str>) -> Result<(), BusError> {
    let entries: Vec<&InstrumentConfig> = match only {
        Some(name) => vec![config.instrument(name)?],
        None => config.instruments.iter().collect(),
    };

    for entry in entries {
        if args.dry_run {
            println!(
                "🔍 {} ({}): would open {}",
                entry.name,
                entry.kind.as_str(),
                describe_link(&entry.link)
            );
            continue;
        }

        let mut rig = drivers::connect(entry, config.options_for(entry)).await?;
        show_status(args, entry, &mut rig).await?;
    }

    Ok(())
}

async fn show_status(args: &Args, entry: &InstrumentConfig, rig: &mut Rig) -> Result<(), BusError> {
    match rig {
        Rig::Ilm210(driver) => {
            let identity = driver.identity().await?;
            let status = driver.status().await?;

            // 只讀有接探棒的通道
            let mut levels: Vec<(u8, f64)> = Vec::new();
            for (index, channel) in status.channels.iter().enumerate() {
                if channel.usage != ChannelUsage::NotInUse {
                    let n = (index + 1) as u8;
                    levels.push((n, driver.level(n).await?));
                }
            }

            if args.json {
                let levels_json: Vec<serde_json::Value> = levels
                    .iter()
                    .map(|(n, v)| serde_json::json!({ "channel": n, "percent": v }))
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "instrument": entry.name,
                        "kind": "ilm210",
                        "identity": identity,
                        "status": status,
                        "levels": levels_json,
                    }))?
                );
                return Ok(());
            }

            println!("🧊 {} (ilm210) @ {}", entry.name, driver.endpoint());
            print_identity(&identity);
            for (index, channel) in status.channels.iter().enumerate() {
                let n = (index + 1) as u8;
                let rate = channel
                    .probe_rate()
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "off".to_string());
                let level = levels
                    .iter()
                    .find(|(ch, _)| *ch == n)
                    .map(|(_, v)| format!("{:.1} %", v))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  Channel {}: {:?}, rate {}, level {}",
                    n, channel.usage, rate, level
                );
            }
            for relay in 1..=4 {
                if status.relay_active(relay) {
                    println!("  Relay {} active", relay);
                }
            }
        }
        Rig::Itc503(driver) => {
            let identity = driver.identity().await?;
            let status = driver.status().await?;
            let setpoint = driver.setpoint().await?;
            let sensor1 = driver.temperature(1).await?;
            let heater = driver.heater_output_percent().await?;

            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "instrument": entry.name,
                        "kind": "itc503",
                        "identity": identity,
                        "status": status,
                        "setpoint_k": setpoint,
                        "sensor1_k": sensor1,
                        "heater_percent": heater,
                    }))?
                );
                return Ok(());
            }

            println!("🌡️ {} (itc503) @ {}", entry.name, driver.endpoint());
            print_identity(&identity);
            println!(
                "  Control {}, auto {:?}, auto-PID {}",
                status.control,
                status.auto_mode,
                if status.auto_pid { "on" } else { "off" }
            );
            println!("  Sweep: {:?}", status.sweep);
            println!(
                "  Setpoint {:.3} K, sensor 1 at {:.3} K, heater {:.1} %",
                setpoint, sensor1, heater
            );
        }
        Rig::MercuryIps(driver) => {
            let identity = driver.connect_check().await?;

            // 三軸機少裝線圈很常見：NOT_FOUND 代表該軸不存在
            let mut axes: Vec<(Axis, f64, MagnetAction, bool)> = Vec::new();
            for axis in Axis::all() {
                let mut magnet = driver.magnet(axis);
                match magnet.field().await {
                    Ok(field) => {
                        let activity = magnet.activity().await?;
                        let heater = magnet.switch_heater().await?;
                        axes.push((axis, field, activity, heater));
                    }
                    Err(BusError::ScpiFault {
                        fault: ScpiFaultKind::NotFound,
                        ..
                    }) => {
                        tracing::debug!(axis = %axis, "axis not fitted, skipping");
                    }
                    Err(e) => return Err(e),
                }
            }

            if args.json {
                let axes_json: Vec<serde_json::Value> = axes
                    .iter()
                    .map(|(axis, field, activity, heater)| {
                        serde_json::json!({
                            "axis": axis,
                            "field_t": field,
                            "activity": activity,
                            "switch_heater": heater,
                        })
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "instrument": entry.name,
                        "kind": "mercury_ips",
                        "identity": identity,
                        "axes": axes_json,
                    }))?
                );
                return Ok(());
            }

            println!("🧲 {} (mercury_ips) @ {}", entry.name, driver.endpoint());
            print_identity(&identity);
            for (axis, field, activity, heater) in &axes {
                println!(
                    "  Axis {}: {:.4} T, activity {}, switch heater {}",
                    axis,
                    field,
                    activity.token().to_ascii_lowercase(),
                    if *heater { "on" } else { "off" }
                );
            }
        }
    }

    Ok(())
}

async fn run_read(
    args: &Args,
    config: &RackConfig,
    name: &str,
    parameter: &str,
    axis_arg: &str,
) -> Result<(), BusError> {
    let entry = config.instrument(name)?;
    let axis = Axis::from_str(axis_arg)?;

    if args.dry_run {
        println!("🔍 DRY RUN - nothing will be sent");
        println!("  Instrument: {} ({})", entry.name, entry.kind.as_str());
        println!("  Link: {}", describe_link(&entry.link));
        println!("  Would read: {}", parameter);
        return Ok(());
    }

    let mut rig = drivers::connect(entry, config.options_for(entry)).await?;

    // 非數值參數走文字輸出
    match (&mut rig, parameter) {
        (Rig::Ilm210(driver), "rate1" | "rate2" | "rate3") => {
            let channel = parameter.as_bytes()[4] - b'0';
            let rate = driver.rate(channel).await?;
            let text = rate
                .map(|r| r.to_string())
                .unwrap_or_else(|| "off".to_string());
            emit_text(args, name, parameter, &text);
            return Ok(());
        }
        (Rig::Itc503(driver), "pid") => {
            let (p, i, d) = driver.pid().await?;
            if args.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "instrument": name,
                        "quantity": "pid",
                        "p": p,
                        "i": i,
                        "d": d,
                    })
                );
            } else {
                println!("📊 {}: P={} I={} D={}", name, p, i, d);
            }
            return Ok(());
        }
        (Rig::MercuryIps(driver), "switch-heater") => {
            let on = driver.magnet(axis).switch_heater().await?;
            emit_text(args, name, parameter, if on { "on" } else { "off" });
            return Ok(());
        }
        (Rig::MercuryIps(driver), "activity") => {
            let activity = driver.magnet(axis).activity().await?;
            emit_text(args, name, parameter, &activity.token().to_ascii_lowercase());
            return Ok(());
        }
        _ => {}
    }

    let (quantity, value, unit) = read_numeric(&mut rig, parameter, axis).await?;
    let reading = Reading::now(name, quantity, value, unit);

    if args.json {
        println!("{}", serde_json::to_string(&reading)?);
    } else {
        println!("📊 {}: {} = {} {}", name, quantity, value, unit);
    }

    Ok(())
}

/// 數值型參數查表：read 與 watch 共用
async fn read_numeric(
    rig: &mut Rig,
    parameter: &str,
    axis: Axis,
) -> Result<(&'static str, f64, &'static str), BusError> {
    match rig {
        Rig::Ilm210(driver) => match parameter {
            "level1" => Ok(("level1", driver.level(1).await?, "%")),
            "level2" => Ok(("level2", driver.level(2).await?, "%")),
            "level3" => Ok(("level3", driver.level(3).await?, "%")),
            other => Err(unknown_parameter(
                InstrumentKind::Ilm210,
                other,
                &["level1", "level2", "level3", "rate1", "rate2", "rate3"],
            )),
        },
        Rig::Itc503(driver) => match parameter {
            "setpoint" => Ok(("setpoint", driver.setpoint().await?, "K")),
            "temp1" => Ok(("temp1", driver.temperature(1).await?, "K")),
            "temp2" => Ok(("temp2", driver.temperature(2).await?, "K")),
            "temp3" => Ok(("temp3", driver.temperature(3).await?, "K")),
            "temperature-error" => Ok(("temperature-error", driver.temperature_error().await?, "K")),
            "heater" => Ok(("heater", driver.heater_output_percent().await?, "%")),
            "heater-voltage" => Ok(("heater-voltage", driver.heater_output_volts().await?, "V")),
            "gas-flow" => Ok(("gas-flow", driver.gas_flow().await?, "%")),
            other => Err(unknown_parameter(
                InstrumentKind::Itc503,
                other,
                &[
                    "setpoint",
                    "temp1",
                    "temp2",
                    "temp3",
                    "temperature-error",
                    "heater",
                    "heater-voltage",
                    "gas-flow",
                    "pid",
                ],
            )),
        },
        Rig::MercuryIps(driver) => {
            let mut magnet = driver.magnet(axis);
            match parameter {
                "field" => Ok(("field", magnet.field().await?, "T")),
                "field-setpoint" => Ok(("field-setpoint", magnet.field_setpoint().await?, "T")),
                "ramp-rate" => Ok(("ramp-rate", magnet.field_ramp_rate().await?, "T/min")),
                "current" => Ok(("current", magnet.current().await?, "A")),
                "persistent-current" => {
                    Ok(("persistent-current", magnet.persistent_current().await?, "A"))
                }
                "voltage" => Ok(("voltage", magnet.voltage().await?, "V")),
                "current-setpoint" => {
                    Ok(("current-setpoint", magnet.current_setpoint().await?, "A"))
                }
                "current-ramp-rate" => {
                    Ok(("current-ramp-rate", magnet.current_ramp_rate().await?, "A/min"))
                }
                other => Err(unknown_parameter(
                    InstrumentKind::MercuryIps,
                    other,
                    &[
                        "field",
                        "field-setpoint",
                        "ramp-rate",
                        "current",
                        "persistent-current",
                        "voltage",
                        "current-setpoint",
                        "current-ramp-rate",
                        "switch-heater",
                        "activity",
                    ],
                )),
            }
        }
    }
}

async fn run_set(
    args: &Args,
    config: &RackConfig,
    name: &str,
    parameter: &str,
    value: &str,
    axis_arg: &str,
) -> Result<(), BusError> {
    let entry = config.instrument(name)?;
    let axis = Axis::from_str(axis_arg)?;

    if args.dry_run {
        println!("🔍 DRY RUN - nothing will be sent");
        println!("  Instrument: {} ({})", entry.name, entry.kind.as_str());
        println!("  Link: {}", describe_link(&entry.link));
        println!("  Would set: {} = {}", parameter, value);
        if let Some(wire) = framed_set_preview(entry, parameter, value, axis) {
            println!("  On the wire: {}", wire);
        }
        return Ok(());
    }

    let mut rig = drivers::connect(entry, config.options_for(entry)).await?;

    match &mut rig {
        Rig::Ilm210(driver) => match parameter {
            "rate1" | "rate2" | "rate3" => {
                let channel = parameter.as_bytes()[4] - b'0';
                driver.set_rate(channel, ProbeRate::from_str(value)?).await?;
            }
            "control" => driver.set_control(ControlMode::from_str(value)?).await?,
            other => {
                return Err(unknown_parameter(
                    InstrumentKind::Ilm210,
                    other,
                    &["rate1", "rate2", "rate3", "control"],
                ))
            }
        },
        Rig::Itc503(driver) => match parameter {
            "setpoint" => driver.set_setpoint(parse_f64_arg(value)?).await?,
            "heater" => driver.set_heater_output(parse_f64_arg(value)?).await?,
            "gas-flow" => driver.set_gas_flow(parse_f64_arg(value)?).await?,
            "auto" => driver.set_auto(AutoMode::from_str(value)?).await?,
            "auto-pid" => driver.set_auto_pid(parse_on_off(value)?).await?,
            "heater-sensor" => {
                let sensor: u8 = value.parse().map_err(|_| BusError::ParseError {
                    reply: value.to_string(),
                    reason: "expected a sensor number 1-3".to_string(),
                })?;
                driver.set_heater_sensor(sensor).await?;
            }
            "pid" => {
                let (p, i, d) = parse_pid_triple(value)?;
                driver.set_pid(p, i, d).await?;
            }
            "control" => driver.set_control(ControlMode::from_str(value)?).await?,
            "sweep" => match value.to_ascii_lowercase().as_str() {
                "start" => driver.sweep_start().await?,
                "stop" => driver.sweep_stop().await?,
                other => {
                    return Err(BusError::ParseError {
                        reply: other.to_string(),
                        reason: "expected start or stop".to_string(),
                    })
                }
            },
            other => {
                return Err(unknown_parameter(
                    InstrumentKind::Itc503,
                    other,
                    &[
                        "setpoint",
                        "heater",
                        "gas-flow",
                        "auto",
                        "auto-pid",
                        "heater-sensor",
                        "pid",
                        "control",
                        "sweep",
                    ],
                ))
            }
        },
        Rig::MercuryIps(driver) => {
            let mut magnet = driver.magnet(axis);
            match parameter {
                "field-setpoint" => magnet.set_field_setpoint(parse_f64_arg(value)?).await?,
                "ramp-rate" => magnet.set_field_ramp_rate(parse_f64_arg(value)?).await?,
                "current-setpoint" => magnet.set_current_setpoint(parse_f64_arg(value)?).await?,
                "current-ramp-rate" => {
                    magnet.set_current_ramp_rate(parse_f64_arg(value)?).await?
                }
                "switch-heater" => magnet.set_switch_heater(parse_on_off(value)?).await?,
                other => {
                    return Err(unknown_parameter(
                        InstrumentKind::MercuryIps,
                        other,
                        &[
                            "field-setpoint",
                            "ramp-rate",
                            "current-setpoint",
                            "current-ramp-rate",
                            "switch-heater",
                        ],
                    ))
                }
            }
        }
    }

    println!("✅ {}: {} set to {}", name, parameter, value);
    Ok(())
}

async fn run_action(
    args: &Args,
    config: &RackConfig,
    name: &str,
    action_arg: &str,
    axis_arg: &str,
) -> Result<(), BusError> {
    let entry = config.instrument(name)?;
    let action = MagnetAction::from_str(action_arg)?;
    let axis = Axis::from_str(axis_arg)?;

    if args.dry_run {
        println!("🔍 DRY RUN - nothing will be sent");
        println!("  Instrument: {} ({})", entry.name, entry.kind.as_str());
        println!("  Link: {}", describe_link(&entry.link));
        println!(
            "  On the wire: SET:DEV:{}:PSU:ACTN:{}",
            axis.group(),
            action.token()
        );
        return Ok(());
    }

    let mut rig = drivers::connect(entry, config.options_for(entry)).await?;

    match &mut rig {
        Rig::MercuryIps(driver) => {
            driver.magnet(axis).act(action).await?;
            println!("✅ {}: axis {} {}", name, axis, action.token().to_ascii_lowercase());
            Ok(())
        }
        other => Err(BusError::InvalidConfigValueError {
            field: "instrument".to_string(),
            value: name.to_string(),
            reason: format!(
                "{} does not take ramp actions; only mercury_ips does",
                other.kind().as_str()
            ),
        }),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_watch(
    args: &Args,
    config: &RackConfig,
    name: &str,
    parameter: &str,
    interval: u64,
    count: Option<u64>,
    output: Option<&str>,
    axis_arg: &str,
) -> Result<(), BusError> {
    let entry = config.instrument(name)?;
    let axis = Axis::from_str(axis_arg)?;

    if interval == 0 {
        return Err(BusError::InvalidConfigValueError {
            field: "interval".to_string(),
            value: "0".to_string(),
            reason: "Poll interval must be at least 1 second".to_string(),
        });
    }

    if args.dry_run {
        println!("🔍 DRY RUN - nothing will be sent");
        println!("  Instrument: {} ({})", entry.name, entry.kind.as_str());
        println!("  Link: {}", describe_link(&entry.link));
        println!("  Would poll: {} every {} s", parameter, interval);
        return Ok(());
    }

    let mut rig = drivers::connect(entry, config.options_for(entry)).await?;

    // 先讀一次，參數打錯就不留空檔案
    let (quantity, first, unit) = read_numeric(&mut rig, parameter, axis).await?;

    let mut writer: csv::Writer<Box<dyn std::io::Write>> = match output {
        Some(path) => csv::Writer::from_writer(Box::new(std::fs::File::create(path)?)),
        None => csv::Writer::from_writer(Box::new(std::io::stdout())),
    };
    writer.write_record(["timestamp", "elapsed_minutes", quantity])?;

    tracing::info!(
        "📈 Watching {} '{}' every {} s ({})",
        name,
        quantity,
        interval,
        unit
    );

    let started = Instant::now();
    let mut rows: u64 = 0;
    let mut value = first;

    loop {
        let elapsed_minutes = started.elapsed().as_secs_f64() / 60.0;
        writer.write_record([
            chrono::Utc::now().to_rfc3339(),
            format!("{:.3}", elapsed_minutes),
            value.to_string(),
        ])?;
        writer.flush()?;
        rows += 1;

        if let Some(limit) = count {
            if rows >= limit {
                break;
            }
        }

        tokio::time::sleep(Duration::from_secs(interval)).await;
        let (_, next, _) = read_numeric(&mut rig, parameter, axis).await?;
        value = next;
    }

    tracing::info!("✅ Watch finished: {} rows", rows);
    if let Some(path) = output {
        println!("✅ Logged {} rows of '{}' ({})", rows, quantity, unit);
        println!("📁 Output saved to: {}", path);
    }

    Ok(())
}

/// dry-run 用：把 set 參數翻成實際會上線的指令（不含結尾符）。
/// 值解析不了就回 None，留給正式路徑報錯。
fn framed_set_preview(
    entry: &InstrumentConfig,
    parameter: &str,
    value: &str,
    axis: Axis,
) -> Option<String> {
    let prefix = entry
        .isobus_address
        .map(|n| format!("@{}", n))
        .unwrap_or_default();

    match entry.kind {
        InstrumentKind::Ilm210 => match parameter {
            "rate1" | "rate2" | "rate3" => {
                let channel = &parameter[4..5];
                let letter = match ProbeRate::from_str(value).ok()? {
                    ProbeRate::Slow => 'S',
                    ProbeRate::Fast => 'T',
                };
                // 還會夾在 C1 / C3 的面板鎖裡
                Some(format!(
                    "{p}C1, {p}{}{}, {p}C3",
                    letter,
                    channel,
                    p = prefix
                ))
            }
            "control" => {
                let mode = ControlMode::from_str(value).ok()?;
                Some(format!("{}C{}", prefix, mode.command_digit()))
            }
            _ => None,
        },
        InstrumentKind::Itc503 => match parameter {
            "setpoint" => Some(format!("{}T{}", prefix, value)),
            "heater" => Some(format!("{}O{}", prefix, value)),
            "gas-flow" => Some(format!("{}G{}", prefix, value)),
            "heater-sensor" => Some(format!("{}H{}", prefix, value)),
            "auto" => {
                let mode = AutoMode::from_str(value).ok()?;
                Some(format!("{}A{}", prefix, mode.command_digit()))
            }
            "auto-pid" => Some(format!(
                "{}L{}",
                prefix,
                if parse_on_off(value).ok()? { 1 } else { 0 }
            )),
            "control" => {
                let mode = ControlMode::from_str(value).ok()?;
                Some(format!("{}C{}", prefix, mode.command_digit()))
            }
            "sweep" => match value.to_ascii_lowercase().as_str() {
                "start" => Some(format!("{}S1", prefix)),
                "stop" => Some(format!("{}S0", prefix)),
                _ => None,
            },
            "pid" => {
                let (p, i, d) = parse_pid_triple(value).ok()?;
                Some(format!(
                    "{pre}P{}, {pre}I{}, {pre}D{}",
                    p,
                    i,
                    d,
                    pre = prefix
                ))
            }
            _ => None,
        },
        InstrumentKind::MercuryIps => {
            let leaf = match parameter {
                "field-setpoint" => "FSET",
                "ramp-rate" => "RFST",
                "current-setpoint" => "CSET",
                "current-ramp-rate" => "RCST",
                "switch-heater" => "SWHN",
                _ => return None,
            };
            let wire_value = if parameter == "switch-heater" {
                if parse_on_off(value).ok()? { "ON" } else { "OFF" }.to_string()
            } else {
                value.to_string()
            };
            Some(format!(
                "SET:DEV:{}:PSU:SIG:{}:{}",
                axis.group(),
                leaf,
                wire_value
            ))
        }
    }
}

fn parse_f64_arg(value: &str) -> Result<f64, BusError> {
    value.trim().parse::<f64>().map_err(|_| BusError::ParseError {
        reply: value.to_string(),
        reason: "expected a number".to_string(),
    })
}

fn parse_on_off(value: &str) -> Result<bool, BusError> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => Err(BusError::ParseError {
            reply: other.to_string(),
            reason: "expected on or off".to_string(),
        }),
    }
}

/// `set pid 10,0.5,0` 的逗號三元組
fn parse_pid_triple(value: &str) -> Result<(f64, f64, f64), BusError> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(BusError::ParseError {
            reply: value.to_string(),
            reason: "expected P,I,D as three comma-separated numbers".to_string(),
        });
    }
    Ok((
        parse_f64_arg(parts[0])?,
        parse_f64_arg(parts[1])?,
        parse_f64_arg(parts[2])?,
    ))
}

fn emit_text(args: &Args, instrument: &str, quantity: &str, value: &str) {
    if args.json {
        println!(
            "{}",
            serde_json::json!({
                "instrument": instrument,
                "quantity": quantity,
                "value": value,
            })
        );
    } else {
        println!("📊 {}: {} = {}", instrument, quantity, value);
    }
}

fn print_identity(identity: &Identity) {
    let model = identity.model.as_deref().unwrap_or("unknown model");
    let firmware = identity.firmware.as_deref().unwrap_or("?");
    match &identity.serial {
        Some(serial) => println!("  {} (serial {}, firmware {})", model, serial, firmware),
        None => println!("  {} (firmware {})", model, firmware),
    }
}

fn describe_link(link: &LinkConfig) -> String {
    match link {
        LinkConfig::Serial { port, baud, .. } => format!("serial {} @ {} baud", port, baud),
        LinkConfig::Tcp { host, port } => format!("tcp {}:{}", host, port),
        LinkConfig::Prologix { gpib_address, over } => {
            format!("{} via GPIB {}", describe_link(over), gpib_address)
        }
    }
}

fn unknown_parameter(kind: InstrumentKind, parameter: &str, supported: &[&str]) -> BusError {
    BusError::InvalidConfigValueError {
        field: "parameter".to_string(),
        value: parameter.to_string(),
        reason: format!("{} parameters: {}", kind.as_str(), supported.join(", ")),
    }
}
