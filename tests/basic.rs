use color_eyre::Result;
use common::{connect, get, receive, receive_key, receive_until, send, start_server, N};
use fsr_bridge::actions::{Action, Update};
use pretty_assertions::assert_eq;

mod common;

#[tokio::test]
async fn can_connect() -> Result<()> {
    let server = start_server().await?;
    connect(server.port).await?;

    Ok(())
}

#[tokio::test]
async fn connecting_replays_the_current_profile() -> Result<()> {
    let server = start_server().await?;
    let mut client = connect(server.port).await?;

    assert_eq!(
        receive(&mut client).await?,
        Update::Image(Some("default.gif".into()))
    );
    assert_eq!(
        receive(&mut client).await?,
        Update::Thresholds(vec![1000; N])
    );

    Ok(())
}

#[tokio::test]
async fn values_arrive() -> Result<()> {
    let server = start_server().await?;
    server.device.set_values(vec![0, 1, 2, 3, 4, 5, 6, 7]);

    let mut client = connect(server.port).await?;

    receive_until(&mut client, |update| {
        update == &Update::Values(vec![0, 1, 2, 3, 4, 5, 6, 7])
    })
    .await?;

    Ok(())
}

#[tokio::test]
async fn bad_requests_are_ignored() -> Result<()> {
    let server = start_server().await?;
    let mut client = connect(server.port).await?;

    send(&mut client, "hi".into()).await?;
    send(&mut client, r#"["format_disk", "/"]"#.into()).await?;
    send(&mut client, r#"["change_profile"]"#.into()).await?;

    // Still connected and served.
    send(&mut client, Action::example_add_profile().serialize()).await?;
    let update = receive_key(&mut client, "cur_profile").await?;

    assert_eq!(update, Update::CurProfile("alice".into()));

    Ok(())
}

#[tokio::test]
async fn version() -> Result<()> {
    let server = start_server().await?;

    let body = get(server.port, "/version").await?;

    assert!(body.contains(env!("CARGO_PKG_VERSION")));

    Ok(())
}

#[tokio::test]
async fn config() -> Result<()> {
    let server = start_server().await?;

    let body = get(server.port, "/config").await?;

    assert!(body.contains("Mock"));

    Ok(())
}

#[tokio::test]
async fn images_are_served() -> Result<()> {
    let server = start_server().await?;
    std::fs::write(server.data.join("images").join("cat.gif"), "GIF89a")?;

    let body = get(server.port, "/images/cat.gif").await?;

    assert_eq!(body, "GIF89a");

    Ok(())
}

#[tokio::test]
async fn images_are_listed() -> Result<()> {
    let server = start_server().await?;
    let images = server.data.join("images");
    std::fs::write(images.join("dog.gif"), "GIF89a")?;
    std::fs::write(images.join("cat.gif"), "GIF89a")?;

    let body = get(server.port, "/images").await?;
    let names: Vec<String> = serde_json::from_str(&body)?;

    assert_eq!(names, vec!["cat.gif", "dog.gif"]);

    Ok(())
}
