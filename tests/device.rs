use std::time::Duration;

use color_eyre::Result;
use common::{
    connect, eventually, receive_key, receive_until, send, start_server, Client, N,
};
use fsr_bridge::{
    actions::{Action, Update},
    profile::Profile,
};
use pretty_assertions::assert_eq;

mod common;

/// Let the thresholds query sent on connect be answered.
async fn settle(client: &mut Client) -> Result<()> {
    receive_key(client, "thresholds").await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    Ok(())
}

#[tokio::test]
async fn update_threshold_goes_through_the_device() -> Result<()> {
    let server = start_server().await?;
    let mut client = connect(server.port).await?;
    settle(&mut client).await?;

    let mut values = vec![1000; N];
    values[1] = 900;
    send(
        &mut client,
        Action::UpdateThreshold {
            values: values.clone(),
            index: 1,
        }
        .serialize(),
    )
    .await?;

    // The device echoes its thresholds, which the profile then follows.
    let update = receive_key(&mut client, "thresholds").await?;
    assert_eq!(update, Update::Thresholds(values.clone()));
    assert_eq!(server.device.thresholds(), values);

    Ok(())
}

#[tokio::test]
async fn out_of_range_threshold_is_refused() -> Result<()> {
    let server = start_server().await?;
    let mut client = connect(server.port).await?;
    settle(&mut client).await?;

    send(
        &mut client,
        r#"["update_threshold", [1000, 5000, 1000, 1000, 1000, 1000, 1000, 1000], 1]"#.into(),
    )
    .await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(server.device.thresholds(), vec![1000; N]);

    Ok(())
}

#[tokio::test]
async fn thresholds_changed_on_the_device_are_taken() -> Result<()> {
    let server = start_server().await?;
    let mut first = connect(server.port).await?;
    settle(&mut first).await?;

    let mut thresholds = vec![1000; N];
    thresholds[7] = 123;
    server.device.set_thresholds(thresholds.clone());

    // Connecting asks the device for its thresholds.
    let mut second = connect(server.port).await?;

    let expected = Update::Thresholds(thresholds);
    receive_until(&mut second, |update| update == &expected).await?;
    receive_until(&mut first, |update| update == &expected).await?;

    Ok(())
}

#[tokio::test]
async fn update_image() -> Result<()> {
    let server = start_server().await?;
    std::fs::write(server.data.join("images").join("cat.gif"), b"GIF89a-cat")?;

    let mut client = connect(server.port).await?;
    settle(&mut client).await?;

    send(&mut client, Action::UpdateImage("cat.gif".into()).serialize()).await?;

    assert_eq!(
        receive_key(&mut client, "image").await?,
        Update::Image(Some("cat.gif".into()))
    );

    let device = server.device.clone();
    eventually("image on device", || {
        device.image() == Some(b"GIF89a-cat".to_vec())
    })
    .await?;

    Ok(())
}

#[tokio::test]
async fn changing_profile_applies_it() -> Result<()> {
    let server = start_server().await?;
    let mut client = connect(server.port).await?;
    settle(&mut client).await?;

    // Differs from what the device has.
    send(
        &mut client,
        Action::AddProfile {
            name: "bob".into(),
            data: Profile::new(None, vec![500; N]),
        }
        .serialize(),
    )
    .await?;
    receive_key(&mut client, "profiles").await?;

    // Adding only makes it current, the device keeps what it had.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.device.thresholds(), vec![1000; N]);

    send(&mut client, Action::ChangeProfile("bob".into()).serialize()).await?;

    let device = server.device.clone();
    eventually("bob on device", || device.thresholds() == vec![500; N]).await?;

    Ok(())
}

#[tokio::test]
async fn reconnecting_device_gets_the_profile() -> Result<()> {
    let server = start_server().await?;
    let mut client = connect(server.port).await?;
    settle(&mut client).await?;

    let device = server.device.clone();

    device.unplug();
    // As if it was power cycled while away.
    device.set_thresholds(vec![1023; N]);
    tokio::time::sleep(Duration::from_millis(100)).await;
    device.plug();

    eventually("profile re-applied", || device.thresholds() == vec![1000; N]).await?;

    Ok(())
}

#[tokio::test]
async fn failed_writes_restate_thresholds() -> Result<()> {
    let server = start_server().await?;
    let mut client = connect(server.port).await?;
    settle(&mut client).await?;

    server.device.fail_writes(true);

    let mut values = vec![1000; N];
    values[0] = 1;
    send(
        &mut client,
        Action::UpdateThreshold { values, index: 0 }.serialize(),
    )
    .await?;

    // What the profile holds, not what was asked for.
    assert_eq!(
        receive_key(&mut client, "thresholds").await?,
        Update::Thresholds(vec![1000; N])
    );
    assert_eq!(server.device.thresholds(), vec![1000; N]);

    Ok(())
}

#[tokio::test]
async fn device_chatter_is_ignored() -> Result<()> {
    let server = start_server().await?;
    let mut client = connect(server.port).await?;
    settle(&mut client).await?;

    server.device.print("booting");
    // Too few thresholds to be a report.
    server.device.print("t 1 2");
    server.device.set_values(vec![7; N]);

    let expected = Update::Values(vec![7; N]);
    let update = receive_until(&mut client, |update| {
        update.key() != "values" || update == &expected
    })
    .await?;

    assert_eq!(update, expected);
    assert_eq!(server.device.thresholds(), vec![1000; N]);

    Ok(())
}
