use anyhow::Result;
use cryobus::adapters::{connect_tcp, Framing};
use cryobus::core::{LinkOptions, ScpiClient};
use cryobus::domain::model::{Axis, MagnetAction};
use cryobus::drivers::MercuryIps;
use cryobus::utils::error::{BusError, ScpiFaultKind};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

fn options() -> LinkOptions {
    LinkOptions {
        timeout: Duration::from_millis(100),
        settle: Duration::from_millis(1),
        retry_attempts: 2,
        retry_delay: Duration::from_millis(1),
    }
}

/// 迷你 Mercury：一條線一答，照表回覆；None 代表裝死不回
async fn canned_mercury(
    listener: TcpListener,
    script: Vec<(&'static str, Option<&'static str>)>,
) {
    let (stream, _) = listener.accept().await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    for (expected, reply) in script {
        let line = lines
            .next_line()
            .await
            .unwrap()
            .expect("client hung up before the script finished");
        assert_eq!(line, expected, "server script diverged");

        if let Some(reply) = reply {
            writer.write_all(reply.as_bytes()).await.unwrap();
            writer.write_all(b"\n").await.unwrap();
        }
    }
}

async fn connect_supply(address: std::net::SocketAddr) -> Result<MercuryIps> {
    let link = connect_tcp(&address.ip().to_string(), address.port(), Framing::SCPI).await?;
    Ok(MercuryIps::new(ScpiClient::new(Box::new(link), options())))
}

#[tokio::test]
async fn test_mercury_session_over_tcp() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;

    // 識別、讀場、下設定點、啟動爬升、確認活動
    let server = tokio::spawn(canned_mercury(
        listener,
        vec![
            (
                "*IDN?",
                Some("IDN:OXFORD INSTRUMENTS:MERCURY iPS:170550002:2.6.04.000"),
            ),
            (
                "READ:DEV:GRPZ:PSU:SIG:FLD",
                Some("STAT:DEV:GRPZ:PSU:SIG:FLD:4.9999T"),
            ),
            (
                "SET:DEV:GRPZ:PSU:SIG:FSET:1.2",
                Some("STAT:SET:DEV:GRPZ:PSU:SIG:FSET:1.2:VALID"),
            ),
            (
                "SET:DEV:GRPZ:PSU:ACTN:RTOS",
                Some("STAT:SET:DEV:GRPZ:PSU:ACTN:RTOS:VALID"),
            ),
            (
                "READ:DEV:GRPZ:PSU:ACTN",
                Some("STAT:DEV:GRPZ:PSU:ACTN:RTOS"),
            ),
        ],
    ));

    let mut supply = connect_supply(address).await?;

    let identity = supply.connect_check().await?;
    assert_eq!(identity.model.as_deref(), Some("MERCURY iPS"));
    assert_eq!(identity.serial.as_deref(), Some("170550002"));

    let mut magnet = supply.magnet(Axis::Z);
    let field = magnet.field().await?;
    assert!((field - 4.9999).abs() < 1e-9);

    magnet.set_field_setpoint(1.2).await?;
    magnet.ramp_to_setpoint().await?;
    assert_eq!(magnet.activity().await?, MagnetAction::ToSetpoint);

    server.await?;
    println!("✅ Mercury TCP session completed");
    Ok(())
}

#[tokio::test]
async fn test_catalogue_over_tcp() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;

    let server = tokio::spawn(canned_mercury(
        listener,
        vec![(
            "READ:SYS:CAT",
            Some("STAT:SYS:CAT:DEV:GRPZ:PSU:DEV:MB1.T1:TEMP"),
        )],
    ));

    let mut supply = connect_supply(address).await?;
    let boards = supply.catalogue().await?;
    assert_eq!(boards, vec!["GRPZ:PSU", "MB1.T1:TEMP"]);

    server.await?;
    Ok(())
}

#[tokio::test]
async fn test_missing_axis_reports_not_found() -> Result<()> {
    // 單軸機上問 X 軸：控制器回 NOT_FOUND
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;

    let server = tokio::spawn(canned_mercury(
        listener,
        vec![(
            "READ:DEV:GRPX:PSU:SIG:FLD",
            Some("STAT:DEV:GRPX:PSU:SIG:FLD:NOT_FOUND"),
        )],
    ));

    let mut supply = connect_supply(address).await?;
    match supply.magnet(Axis::X).field().await {
        Err(BusError::ScpiFault { noun, fault, .. }) => {
            assert_eq!(noun, "DEV:GRPX:PSU:SIG:FLD");
            assert_eq!(fault, ScpiFaultKind::NotFound);
        }
        other => panic!("expected NOT_FOUND fault, got {:?}", other),
    }

    server.await?;
    Ok(())
}

#[tokio::test]
async fn test_interlocked_switch_heater_is_denied() -> Result<()> {
    // 引線電流對不上磁鐵電流時，開關加熱器會被拒絕
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;

    let server = tokio::spawn(canned_mercury(
        listener,
        vec![(
            "SET:DEV:GRPZ:PSU:SIG:SWHN:ON",
            Some("STAT:SET:DEV:GRPZ:PSU:SIG:SWHN:ON:DENIED"),
        )],
    ));

    let mut supply = connect_supply(address).await?;
    match supply.magnet(Axis::Z).set_switch_heater(true).await {
        Err(BusError::ScpiFault { fault, .. }) => assert_eq!(fault, ScpiFaultKind::Denied),
        other => panic!("expected DENIED fault, got {:?}", other),
    }

    server.await?;
    Ok(())
}

#[tokio::test]
async fn test_silent_controller_recovers_on_retry() -> Result<()> {
    // 第一問裝死：客戶端超時後重送同一指令，第二次拿到電壓
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;

    let server = tokio::spawn(canned_mercury(
        listener,
        vec![
            ("READ:DEV:GRPZ:PSU:SIG:VOLT", None),
            (
                "READ:DEV:GRPZ:PSU:SIG:VOLT",
                Some("STAT:DEV:GRPZ:PSU:SIG:VOLT:0.02:V"),
            ),
        ],
    ));

    let mut supply = connect_supply(address).await?;
    let volts = supply.magnet(Axis::Z).voltage().await?;
    assert!((volts - 0.02).abs() < 1e-9);

    server.await?;
    println!("✅ Retry path exercised over a real socket");
    Ok(())
}

#[tokio::test]
async fn test_wrong_device_fails_identity_check() -> Result<()> {
    // 插錯孔：*IDN? 回了別台儀器
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;

    let server = tokio::spawn(canned_mercury(
        listener,
        vec![("*IDN?", Some("IDN:ACME:WIDGETRON 9000:1:0.1"))],
    ));

    let mut supply = connect_supply(address).await?;
    match supply.connect_check().await {
        Err(BusError::IdentityMismatch { reply, .. }) => {
            assert!(reply.contains("WIDGETRON"));
        }
        other => panic!("expected identity mismatch, got {:?}", other),
    }

    server.await?;
    Ok(())
}
