use clap::Parser;
use cryobus::config::RackConfig;
use cryobus::drivers;
use cryobus::utils::error::Result;
use cryobus::utils::validation::Validate;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "rack-check")]
#[command(about = "Connectivity probe for every instrument in a rack file")]
struct Args {
    /// Path to the rack configuration file
    #[arg(short, long, default_value = "rack.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    println!("🚀 檢查機架上每台儀器的連線");

    // 載入機架配置
    let config = RackConfig::from_file(&args.config)?;
    config.validate()?;

    println!("✅ 配置驗證通過");
    println!(
        "📋 機架 '{}': {} 台儀器",
        config.rack.name,
        config.instruments.len()
    );

    let mut reachable = 0usize;
    let mut failed = 0usize;

    for instrument in &config.instruments {
        let options = config.options_for(instrument);
        let started = Instant::now();

        match drivers::connect(instrument, options).await {
            Ok(mut rig) => match rig.identity().await {
                Ok(identity) => {
                    reachable += 1;
                    let model = identity.model.unwrap_or_else(|| "unknown".to_string());
                    println!(
                        "  ✅ {} ({}): {} 回應於 {:?}",
                        instrument.name,
                        instrument.kind.as_str(),
                        model,
                        started.elapsed()
                    );
                }
                Err(e) => {
                    failed += 1;
                    println!(
                        "  ❌ {} ({}): 鏈路開了但儀器沒回應 - {}",
                        instrument.name,
                        instrument.kind.as_str(),
                        e
                    );
                }
            },
            Err(e) => {
                failed += 1;
                println!(
                    "  ❌ {} ({}): 開啟鏈路失敗 - {}",
                    instrument.name,
                    instrument.kind.as_str(),
                    e
                );
            }
        }
    }

    println!();
    println!("📊 檢查摘要: {} 可連線, {} 失敗", reachable, failed);

    if failed > 0 {
        println!("💡 檢查線材、ISOBUS 位址與儀器電源後再試一次。");
        std::process::exit(1);
    }

    println!("🎉 機架全數就緒！");
    Ok(())
}
