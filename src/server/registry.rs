//! Authoritative map of connected sessions, who they are logged in as, and
//! what they advertise. Search is a read-only pass over the same map.

use std::collections::BTreeMap;

use log::{debug, info, trace};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::{
    error::{Result, ShareError},
    models::{FileDescriptor, SearchResult, SessionId},
    protocol::{Password, ServerMessage},
    server::credentials::CredentialStore,
};

/// One connected client.
struct Session {
    /// Set once a login succeeds; until then the session is invisible.
    username: Option<String>,
    files: Vec<FileDescriptor>,
    tx: mpsc::Sender<ServerMessage>,
}

/// Sessions are kept in a `BTreeMap` so that search results come back in a
/// stable order for a given snapshot.
#[derive(Default)]
pub struct PeerRegistry {
    credentials: CredentialStore,
    sessions: RwLock<BTreeMap<SessionId, Session>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fresh, anonymous session and returns its id.
    pub async fn connect(&self, tx: mpsc::Sender<ServerMessage>) -> SessionId {
        let id = Uuid::new_v4().to_string();
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            id.clone(),
            Session {
                username: None,
                files: Vec::new(),
                tx,
            },
        );
        debug!("session {id} connected, total: {}", sessions.len());
        id
    }

    /// Removes the session and everything it advertised.
    pub async fn disconnect(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.remove(session_id) {
            info!(
                "session {session_id} ({}) disconnected, dropped {} files, total: {}",
                session.username.as_deref().unwrap_or("anonymous"),
                session.files.len(),
                sessions.len()
            );
        }
    }

    pub async fn register(&self, username: &str, password: &Password) -> Result<()> {
        self.credentials.register(username, password).await?;
        info!("registered user {username}");
        Ok(())
    }

    /// Binds `session_id` to `username` and starts it with an empty file list.
    pub async fn login(
        &self,
        session_id: &str,
        username: &str,
        password: &Password,
    ) -> Result<String> {
        self.credentials.verify(username, password).await?;

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| ShareError::UnknownPeer(session_id.to_string()))?;
        session.username = Some(username.to_string());
        session.files.clear();

        info!("user {username} logged in on {session_id}");
        Ok(username.to_string())
    }

    /// Replaces the session's file list. Returns the owner's username.
    pub async fn publish_files(
        &self,
        session_id: &str,
        files: Vec<FileDescriptor>,
    ) -> Result<String> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or(ShareError::NotLoggedIn)?;
        let username = session.username.clone().ok_or(ShareError::NotLoggedIn)?;

        info!("{username} published {} files", files.len());
        session.files = files;
        Ok(username)
    }

    /// Files of every other logged-in session whose name or description
    /// contains `keyword`, ignoring case. An empty keyword matches all.
    pub async fn search(&self, session_id: &str, keyword: &str) -> Result<Vec<SearchResult>> {
        let needle = keyword.to_lowercase();
        let sessions = self.sessions.read().await;

        match sessions.get(session_id) {
            Some(Session {
                username: Some(_), ..
            }) => {}
            _ => return Err(ShareError::NotLoggedIn),
        }

        let results: Vec<SearchResult> = sessions
            .iter()
            .filter(|(id, _)| id.as_str() != session_id)
            .filter_map(|(id, session)| {
                let username = session.username.as_ref()?;
                let matching_files: Vec<FileDescriptor> = session
                    .files
                    .iter()
                    .filter(|f| f.matches(&needle))
                    .cloned()
                    .collect();
                if matching_files.is_empty() {
                    return None;
                }
                Some(SearchResult {
                    username: username.clone(),
                    owner_session_id: id.clone(),
                    matching_files,
                })
            })
            .collect();

        trace!("search {keyword:?} from {session_id}: {} owners", results.len());
        Ok(results)
    }

    /// Outbound queue of a connected session, if it is still here.
    pub async fn sender(&self, session_id: &str) -> Option<mpsc::Sender<ServerMessage>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|s| s.tx.clone())
    }

    /// Best-effort fan-out to every session except `except`. Full or closed
    /// queues are skipped.
    pub async fn broadcast(&self, except: &str, msg: ServerMessage) {
        let sessions = self.sessions.read().await;
        for (id, session) in sessions.iter().filter(|(id, _)| id.as_str() != except) {
            if session.tx.try_send(msg.clone()).is_err() {
                debug!("could not notify {id}, skipping");
            }
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn logged_in(
        registry: &PeerRegistry,
        username: &str,
    ) -> (SessionId, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(16);
        let id = registry.connect(tx).await;
        registry.register(username, &"pw".into()).await.unwrap();
        registry.login(&id, username, &"pw".into()).await.unwrap();
        (id, rx)
    }

    #[tokio::test]
    async fn login_outcomes() {
        let registry = PeerRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        let id = registry.connect(tx).await;

        assert!(matches!(
            registry.login(&id, "alice", &"pw1".into()).await,
            Err(ShareError::UserNotFound)
        ));
        registry.register("alice", &"pw1".into()).await.unwrap();
        assert!(matches!(
            registry.register("alice", &"pw1".into()).await,
            Err(ShareError::UserExists)
        ));
        assert!(matches!(
            registry.login(&id, "alice", &"nope".into()).await,
            Err(ShareError::WrongPassword)
        ));
        assert_eq!(
            registry.login(&id, "alice", &"pw1".into()).await.unwrap(),
            "alice"
        );
    }

    #[tokio::test]
    async fn anonymous_sessions_cannot_publish_or_search() {
        let registry = PeerRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        let id = registry.connect(tx).await;

        assert!(matches!(
            registry
                .publish_files(&id, vec![FileDescriptor::new("a", "", 1)])
                .await,
            Err(ShareError::NotLoggedIn)
        ));
        assert!(matches!(
            registry.search(&id, "").await,
            Err(ShareError::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn publish_replaces_previous_list() {
        let registry = PeerRegistry::new();
        let (alice, _a) = logged_in(&registry, "alice").await;
        let (bob, _b) = logged_in(&registry, "bob").await;

        registry
            .publish_files(
                &alice,
                vec![
                    FileDescriptor::new("old.txt", "", 1),
                    FileDescriptor::new("shared.txt", "", 2),
                ],
            )
            .await
            .unwrap();
        registry
            .publish_files(&alice, vec![FileDescriptor::new("new.txt", "", 3)])
            .await
            .unwrap();

        let results = registry.search(&bob, "").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].matching_files,
            vec![FileDescriptor::new("new.txt", "", 3)]
        );
    }

    #[tokio::test]
    async fn search_never_returns_own_files() {
        let registry = PeerRegistry::new();
        let (alice, _a) = logged_in(&registry, "alice").await;
        registry
            .publish_files(&alice, vec![FileDescriptor::new("a.txt", "mine", 20)])
            .await
            .unwrap();

        for keyword in ["", "a", "A.TXT", "mine"] {
            assert!(registry.search(&alice, keyword).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn search_matches_description_and_ignores_case() {
        let registry = PeerRegistry::new();
        let (alice, _a) = logged_in(&registry, "alice").await;
        let (bob, _b) = logged_in(&registry, "bob").await;
        registry
            .publish_files(
                &alice,
                vec![
                    FileDescriptor::new("IMG_001.jpg", "Summer Trip", 100),
                    FileDescriptor::new("report.pdf", "quarterly numbers", 200),
                ],
            )
            .await
            .unwrap();

        let results = registry.search(&bob, "summer").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].username, "alice");
        assert_eq!(results[0].owner_session_id, alice);
        assert_eq!(results[0].matching_files.len(), 1);
        assert_eq!(results[0].matching_files[0].file_name, "IMG_001.jpg");

        assert_eq!(
            registry.search(&bob, "img").await.unwrap()[0].matching_files[0].size,
            100
        );
        assert!(registry.search(&bob, "video").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_order_is_stable() {
        let registry = PeerRegistry::new();
        let (searcher, _s) = logged_in(&registry, "searcher").await;
        for name in ["u1", "u2", "u3", "u4"] {
            let (id, _rx) = logged_in(&registry, name).await;
            registry
                .publish_files(&id, vec![FileDescriptor::new("f", "", 1)])
                .await
                .unwrap();
        }

        let first = registry.search(&searcher, "").await.unwrap();
        let second = registry.search(&searcher, "").await.unwrap();
        assert_eq!(first.len(), 4);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn disconnect_removes_files() {
        let registry = PeerRegistry::new();
        let (alice, _a) = logged_in(&registry, "alice").await;
        let (bob, _b) = logged_in(&registry, "bob").await;
        registry
            .publish_files(&alice, vec![FileDescriptor::new("a.txt", "", 20)])
            .await
            .unwrap();
        assert_eq!(registry.search(&bob, "a").await.unwrap().len(), 1);

        registry.disconnect(&alice).await;
        let results = registry.search(&bob, "a").await.unwrap();
        assert!(results.iter().all(|r| r.owner_session_id != alice));
        assert!(registry.sender(&alice).await.is_none());
        assert_eq!(registry.session_count().await, 1);
    }

    #[tokio::test]
    async fn login_resets_file_list() {
        let registry = PeerRegistry::new();
        let (alice, _a) = logged_in(&registry, "alice").await;
        let (bob, _b) = logged_in(&registry, "bob").await;
        registry
            .publish_files(&alice, vec![FileDescriptor::new("a.txt", "", 20)])
            .await
            .unwrap();

        registry.login(&alice, "alice", &"pw".into()).await.unwrap();
        assert!(registry.search(&bob, "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn broadcast_skips_sender() {
        let registry = PeerRegistry::new();
        let (alice, mut a_rx) = logged_in(&registry, "alice").await;
        let (_bob, mut b_rx) = logged_in(&registry, "bob").await;

        registry
            .broadcast(
                &alice,
                ServerMessage::FilesUpdated {
                    username: "alice".into(),
                },
            )
            .await;

        assert!(matches!(
            b_rx.try_recv(),
            Ok(ServerMessage::FilesUpdated { .. })
        ));
        assert!(a_rx.try_recv().is_err());
    }
}
