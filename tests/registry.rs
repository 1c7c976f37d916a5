mod common;

use std::time::Duration;

use peershare::{
    client::SignalingClient,
    models::{FileDescriptor, IceCandidate},
    protocol::{ClientMessage, ServerMessage},
    ShareError,
};

use common::start_server;

#[tokio::test]
async fn search_sees_published_files_until_owner_leaves() {
    let (url, _stop) = start_server().await;

    let mut a = SignalingClient::connect(&url).await.unwrap();
    a.register("alice", "pw1").await.unwrap();
    assert_eq!(a.login("alice", "pw1").await.unwrap(), "alice");
    a.publish(vec![FileDescriptor::new("a.txt", "", 20)])
        .await
        .unwrap();
    // a round trip on the same connection orders the publish before it
    a.search("").await.unwrap();

    let mut b = SignalingClient::connect(&url).await.unwrap();
    b.register("bob", "pw2").await.unwrap();
    b.login("bob", "pw2").await.unwrap();

    let results = b.search("a").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].username, "alice");
    assert_eq!(results[0].owner_session_id, a.session_id());
    assert_eq!(
        results[0].matching_files,
        vec![FileDescriptor::new("a.txt", "", 20)]
    );

    a.close().await;
    let mut gone = false;
    for _ in 0..100 {
        if b.search("a").await.unwrap().is_empty() {
            gone = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(gone);
}

#[tokio::test]
async fn auth_errors_reach_only_the_caller() {
    let (url, _stop) = start_server().await;
    let mut a = SignalingClient::connect(&url).await.unwrap();

    assert!(matches!(
        a.login("ghost", "pw").await,
        Err(ShareError::AuthRejected(_))
    ));
    a.register("carol", "right").await.unwrap();
    assert!(matches!(
        a.register("carol", "other").await,
        Err(ShareError::AuthRejected(msg)) if msg == ShareError::UserExists.to_string()
    ));
    assert!(matches!(
        a.login("carol", "wrong").await,
        Err(ShareError::AuthRejected(msg)) if msg == ShareError::WrongPassword.to_string()
    ));

    // the connection survives all of that
    assert_eq!(a.login("carol", "right").await.unwrap(), "carol");
}

#[tokio::test]
async fn search_requires_login() {
    let (url, _stop) = start_server().await;
    let mut a = SignalingClient::connect(&url).await.unwrap();
    assert!(matches!(
        a.search("x").await,
        Err(ShareError::ServerError(_))
    ));
}

#[tokio::test]
async fn publish_is_announced_to_others() {
    let (url, _stop) = start_server().await;

    let mut a = SignalingClient::connect(&url).await.unwrap();
    let mut b = SignalingClient::connect(&url).await.unwrap();
    a.register("dave", "pw").await.unwrap();
    a.login("dave", "pw").await.unwrap();
    a.publish(vec![FileDescriptor::new("notes.md", "text", 3)])
        .await
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(2), b.recv())
        .await
        .unwrap();
    assert_eq!(
        msg,
        Some(ServerMessage::FilesUpdated {
            username: "dave".into()
        })
    );
}

#[tokio::test]
async fn relay_renames_sender_and_drops_unknown_targets() {
    let (url, _stop) = start_server().await;

    let a = SignalingClient::connect(&url).await.unwrap();
    let mut b = SignalingClient::connect(&url).await.unwrap();

    a.send(ClientMessage::Offer {
        target: "nobody".into(),
        sdp: "lost".into(),
    })
    .await
    .unwrap();
    a.send(ClientMessage::Offer {
        target: b.session_id().to_string(),
        sdp: "v=0".into(),
    })
    .await
    .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(2), b.recv())
        .await
        .unwrap();
    assert_eq!(
        msg,
        Some(ServerMessage::Offer {
            caller_id: a.session_id().to_string(),
            sdp: "v=0".into()
        })
    );
}

#[tokio::test]
async fn late_publish_error_is_not_the_search_reply() {
    let (url, _stop) = start_server().await;
    let mut a = SignalingClient::connect(&url).await.unwrap();

    // both are rejected for a client that never logged in
    a.publish(vec![FileDescriptor::new("a.txt", "", 1)])
        .await
        .unwrap();
    let search = a.search("a").await;
    assert!(matches!(search, Err(ShareError::ServerError(_))));

    let earlier = tokio::time::timeout(Duration::from_secs(2), a.recv())
        .await
        .unwrap();
    assert!(matches!(
        earlier,
        Some(ServerMessage::Error { request: Some(ref kind), .. }) if kind == "publish_files"
    ));
}

#[tokio::test]
async fn sends_keep_flowing_while_inbound_backs_up() {
    let (url, _stop) = start_server().await;
    let mut a = SignalingClient::connect(&url).await.unwrap();
    let b = SignalingClient::connect(&url).await.unwrap();

    // fill a's inbound queue well past its capacity without reading it
    for i in 0..200 {
        b.send(ClientMessage::IceCandidate {
            target: a.session_id().to_string(),
            candidate: IceCandidate::new(format!("candidate:{i}")),
        })
        .await
        .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let sending = async {
        for i in 0..200 {
            a.send(ClientMessage::IceCandidate {
                target: "nobody".into(),
                candidate: IceCandidate::new(format!("candidate:{i}")),
            })
            .await
            .unwrap();
        }
    };
    tokio::time::timeout(Duration::from_secs(5), sending)
        .await
        .expect("outbound queue stalled behind inbound");

    for i in 0..200 {
        let msg = tokio::time::timeout(Duration::from_secs(2), a.recv())
            .await
            .unwrap();
        assert!(matches!(
            msg,
            Some(ServerMessage::IceCandidate { ref candidate, .. })
                if candidate.candidate == format!("candidate:{i}")
        ));
    }
}
