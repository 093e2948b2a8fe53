use anyhow::Result;
use cryobus::adapters::MockLink;
use cryobus::core::{IsobusClient, LinkOptions};
use cryobus::domain::model::ControlMode;
use cryobus::drivers::{AutoMode, Itc503, SweepPhase};
use cryobus::utils::error::BusError;
use std::time::Duration;

fn options() -> LinkOptions {
    LinkOptions {
        timeout: Duration::from_millis(50),
        settle: Duration::from_millis(1),
        retry_attempts: 2,
        retry_delay: Duration::from_millis(1),
    }
}

fn controller(link: MockLink, address: u8) -> Itc503 {
    Itc503::new(IsobusClient::new(Box::new(link), Some(address), options()))
}

#[tokio::test]
async fn test_cooldown_session() -> Result<()> {
    // 典型降溫流程：開場儀式 C3/A3/L1、下設定點、讀回溫度、查狀態、收工
    let probe = MockLink::new()
        .expect("@1C3", "C")
        .expect("@1A3", "A")
        .expect("@1L1", "L")
        .expect("@1T4.2", "T")
        .expect("@1R0", "R4.2")
        .expect("@1R1", "R4.187")
        .expect("@1X", "X0A1C3S00H1L1")
        .expect("@1C0", "C");

    let mut itc = controller(probe.clone(), 1);

    itc.prepare_remote().await?;
    itc.set_setpoint(4.2).await?;

    assert_eq!(itc.setpoint().await?, 4.2);
    let sensor1 = itc.temperature(1).await?;
    assert!((sensor1 - 4.187).abs() < 1e-9);

    let status = itc.status().await?;
    assert_eq!(status.auto_mode, AutoMode::HeaterAuto);
    assert_eq!(status.control, ControlMode::RemoteUnlocked);
    assert_eq!(status.sweep, SweepPhase::Idle);
    assert!(status.auto_pid);

    itc.local().await?;

    probe.assert_exhausted();
    assert_eq!(
        probe.sent(),
        vec!["@1C3", "@1A3", "@1L1", "@1T4.2", "@1R0", "@1R1", "@1X", "@1C0"]
    );

    println!("✅ Cooldown session transcript matched");
    Ok(())
}

#[tokio::test]
async fn test_setpoint_guard_keeps_wire_quiet() {
    // 超出 0.3-1500 K 的設定點在客戶端就擋下
    let probe = MockLink::new();
    let mut itc = controller(probe.clone(), 1);

    let err = itc.set_setpoint(2000.0).await.unwrap_err();
    assert!(matches!(err, BusError::SetpointOutOfRange { .. }));

    let err = itc.set_setpoint(0.1).await.unwrap_err();
    assert!(matches!(err, BusError::SetpointOutOfRange { .. }));

    assert!(probe.sent().is_empty());
}

#[tokio::test]
async fn test_sweep_control_and_phase() -> Result<()> {
    // 掃描中：兩位數字 03 → 正在爬向第 2 步
    let probe = MockLink::new()
        .expect("@1S1", "S")
        .expect("@1X", "X0A0C3S03H1L0")
        .expect("@1S0", "S");

    let mut itc = controller(probe.clone(), 1);

    itc.sweep_start().await?;
    let status = itc.status().await?;
    assert_eq!(status.sweep, SweepPhase::SweepingTo(2));
    itc.sweep_stop().await?;

    probe.assert_exhausted();
    Ok(())
}

#[tokio::test]
async fn test_pid_round_trip() -> Result<()> {
    let probe = MockLink::new()
        .expect("@1P10", "P")
        .expect("@1I0.5", "I")
        .expect("@1D0", "D")
        .expect("@1R8", "R10")
        .expect("@1R9", "R0.5")
        .expect("@1R10", "R0");

    let mut itc = controller(probe.clone(), 1);

    itc.set_pid(10.0, 0.5, 0.0).await?;
    assert_eq!(itc.pid().await?, (10.0, 0.5, 0.0));

    probe.assert_exhausted();
    Ok(())
}

#[tokio::test]
async fn test_manual_heater_rejected_in_local() -> Result<()> {
    // 面板還在本地模式時儀器拒絕 O 指令
    let probe = MockLink::new().expect("@1O25", "?O25");
    let mut itc = controller(probe.clone(), 1);

    match itc.set_heater_output(25.0).await {
        Err(BusError::CommandRejected { reply, .. }) => assert_eq!(reply, "?O25"),
        other => panic!("expected rejection, got {:?}", other),
    }

    probe.assert_exhausted();
    Ok(())
}

#[tokio::test]
async fn test_silent_controller_recovers_on_retry() -> Result<()> {
    // GPIB 卡住一拍：重置後重送，第二次拿到答案
    let probe = MockLink::new()
        .expect_silence("@1R0")
        .expect("@1R0", "R1.5");
    let mut itc = controller(probe.clone(), 1);

    assert_eq!(itc.setpoint().await?, 1.5);
    assert_eq!(probe.resets(), 1);

    probe.assert_exhausted();
    Ok(())
}
