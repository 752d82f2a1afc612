//! Integration tests for the full replica pipeline.
//!
//! Tests: raw message → EventBus → ProjectionWorker → IdentityProjector →
//! CredentialStore → AuthGateway
//!
//! Verifies:
//! - Upstream lifecycle events become loginable identities
//! - Redelivered and out-of-order events leave the replica consistent
//! - Bad messages never stop the consumer

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
    use serde_json::json;

    use authreplica_auth::{
        AccessClaims, AuthError, AuthGateway, BcryptPasswords, LoginPolicy, PasswordHasher,
        TokenIssuer, TokenLifetimes,
    };
    use authreplica_core::{CredentialStore, StoreError};
    use authreplica_events::{Delivery, EventBus, InMemoryEventBus, USER_EVENTS_TOPIC};

    use crate::projections::IdentityProjector;
    use crate::store::InMemoryCredentialStore;
    use crate::workers::{ProjectionHandler, ProjectionWorker, WorkerHandle};

    const SECRET: &[u8] = b"integration-secret";

    struct Harness {
        bus: InMemoryEventBus<Delivery>,
        store: Arc<InMemoryCredentialStore>,
        gateway: AuthGateway<Arc<InMemoryCredentialStore>, BcryptPasswords>,
        worker: WorkerHandle,
    }

    fn setup() -> Harness {
        let bus = InMemoryEventBus::<Delivery>::new();
        let store = Arc::new(InMemoryCredentialStore::new());

        // Subscribe BEFORE any events are published.
        let handler = ProjectionHandler::new(
            USER_EVENTS_TOPIC,
            IdentityProjector::new(Arc::clone(&store)),
        );
        let worker = ProjectionWorker::spawn("identity-projection", bus.subscribe(), handler);

        let issuer = TokenIssuer::new(SECRET, TokenLifetimes::default()).unwrap();
        let gateway = AuthGateway::new(
            Arc::clone(&store),
            BcryptPasswords::new(4),
            issuer,
            LoginPolicy::default(),
        );

        Harness {
            bus,
            store,
            gateway,
            worker,
        }
    }

    fn digest(password: &str) -> String {
        BcryptPasswords::new(4).hash(password).unwrap()
    }

    fn publish(h: &Harness, topic: &str, message: serde_json::Value) {
        let bytes = serde_json::to_vec(&message).unwrap();
        h.bus.publish(Delivery::new(topic, bytes)).unwrap();
    }

    fn publish_raw(h: &Harness, bytes: &[u8]) {
        h.bus
            .publish(Delivery::new(USER_EVENTS_TOPIC, bytes.to_vec()))
            .unwrap();
    }

    /// The worker handles messages in order; a trailing marker identity shows
    /// everything published before it has been processed.
    async fn drain(h: &Harness) {
        let marker = format!("marker-{}", next_marker());
        publish(
            h,
            USER_EVENTS_TOPIC,
            json!({"event": "user.created", "payload": {"user_name": marker, "password": "x", "blocked": false}}),
        );
        for _ in 0..200 {
            if h.store.get_by_username(&marker).await.is_ok() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("projection worker did not catch up");
    }

    fn next_marker() -> u64 {
        use std::sync::atomic::{AtomicU64, Ordering};
        static NEXT: AtomicU64 = AtomicU64::new(0);
        NEXT.fetch_add(1, Ordering::SeqCst)
    }

    fn access_claims(token: &str) -> AccessClaims {
        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(SECRET),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap()
        .claims
    }

    #[tokio::test]
    async fn created_user_can_log_in() {
        let h = setup();
        publish(
            &h,
            USER_EVENTS_TOPIC,
            json!({"event": "user.created", "payload": {"user_name": "alice", "password": digest("pw"), "blocked": false, "scopes": ["read"]}}),
        );
        drain(&h).await;

        let tokens = h.gateway.login("alice", "pw").await.unwrap();
        let claims = access_claims(&tokens.access_token);
        assert_eq!(claims.scopes, vec!["read"]);
        assert!(!claims.blocked);

        assert_eq!(h.gateway.login("alice", "wrong").await, Err(AuthError::InvalidCredentials));
        assert_eq!(h.gateway.login("bob", "pw").await, Err(AuthError::UserNotFound));

        h.worker.shutdown().await;
    }

    #[tokio::test]
    async fn redelivered_create_leaves_one_record() {
        let h = setup();
        let created = json!({"event": "user.created", "payload": {"user_name": "alice", "password": digest("pw"), "blocked": false, "scopes": null}});
        publish(&h, USER_EVENTS_TOPIC, created.clone());
        publish(&h, USER_EVENTS_TOPIC, created);
        drain(&h).await;

        let alice = h.store.get_by_username("alice").await.unwrap();
        assert!(alice.scopes.is_empty());
        // alice + one drain marker
        assert_eq!(h.store.len(), 2);

        h.worker.shutdown().await;
    }

    #[tokio::test]
    async fn refresh_reflects_scopes_added_after_login() {
        let h = setup();
        publish(
            &h,
            USER_EVENTS_TOPIC,
            json!({"event": "user.created", "payload": {"user_name": "alice", "password": digest("pw"), "blocked": false, "scopes": []}}),
        );
        drain(&h).await;
        let alice = h.store.get_by_username("alice").await.unwrap();
        let tokens = h.gateway.login("alice", "pw").await.unwrap();
        assert!(access_claims(&tokens.access_token).scopes.is_empty());

        for _ in 0..2 {
            publish(
                &h,
                USER_EVENTS_TOPIC,
                json!({"event": "user.added_scope", "payload": {"user_name": "alice", "scope": "read"}}),
            );
        }
        drain(&h).await;

        let refreshed = h.gateway.refresh_token(alice.id).await.unwrap();
        assert_eq!(access_claims(&refreshed).scopes, vec!["read"]);

        h.worker.shutdown().await;
    }

    #[tokio::test]
    async fn scope_removal_and_deletion_flow() {
        let h = setup();
        publish(
            &h,
            USER_EVENTS_TOPIC,
            json!({"event": "user.created", "payload": {"user_name": "alice", "password": digest("pw"), "blocked": false, "scopes": ["read", "write"]}}),
        );
        for _ in 0..2 {
            publish(
                &h,
                USER_EVENTS_TOPIC,
                json!({"event": "user.deleted_scope", "payload": {"user_name": "alice", "scope": "read"}}),
            );
        }
        drain(&h).await;
        assert_eq!(
            h.store.get_by_username("alice").await.unwrap().scopes,
            vec!["write"]
        );

        publish(
            &h,
            USER_EVENTS_TOPIC,
            json!({"event": "user.deleted", "payload": {"user_name": "alice"}}),
        );
        // Late update for a deleted user is harmless.
        publish(
            &h,
            USER_EVENTS_TOPIC,
            json!({"event": "user.updated", "payload": {"user_name": "alice", "blocked": true}}),
        );
        drain(&h).await;

        assert_eq!(
            h.store.get_by_username("alice").await,
            Err(StoreError::NotFound)
        );
        assert_eq!(h.gateway.login("alice", "pw").await, Err(AuthError::UserNotFound));

        h.worker.shutdown().await;
    }

    #[tokio::test]
    async fn password_change_takes_effect_for_login() {
        let h = setup();
        publish(
            &h,
            USER_EVENTS_TOPIC,
            json!({"event": "user.created", "payload": {"user_name": "alice", "password": digest("old"), "blocked": false}}),
        );
        publish(
            &h,
            USER_EVENTS_TOPIC,
            json!({"event": "user.updated_password", "payload": {"user_name": "alice", "password": digest("new")}}),
        );
        drain(&h).await;

        assert_eq!(h.gateway.login("alice", "old").await, Err(AuthError::InvalidCredentials));
        assert!(h.gateway.login("alice", "new").await.is_ok());

        h.worker.shutdown().await;
    }

    #[tokio::test]
    async fn bad_messages_do_not_stop_the_consumer() {
        let h = setup();
        publish_raw(&h, b"{not json");
        publish(
            &h,
            USER_EVENTS_TOPIC,
            json!({"event": "user.created", "payload": {"user_name": "alice"}}),
        );
        publish(
            &h,
            USER_EVENTS_TOPIC,
            json!({"event": "user.teleported", "payload": {"user_name": "alice"}}),
        );
        publish(
            &h,
            "billing-events",
            json!({"event": "user.created", "payload": {"user_name": "mallory", "password": "x", "blocked": false}}),
        );
        publish(
            &h,
            USER_EVENTS_TOPIC,
            json!({"event": "user.created", "payload": {"user_name": "bob", "password": digest("pw"), "blocked": true}}),
        );
        drain(&h).await;

        assert_eq!(h.store.get_by_username("alice").await, Err(StoreError::NotFound));
        assert_eq!(h.store.get_by_username("mallory").await, Err(StoreError::NotFound));

        let tokens = h.gateway.login("bob", "pw").await.unwrap();
        assert!(access_claims(&tokens.access_token).blocked);

        h.worker.shutdown().await;
    }
}
