//! End-to-end scenarios driving a real `KvBackend` over a temporary `sled`
//! database, matching the seeds enumerated for the session engine: sanity
//! round-trip, expiration, mass revocation, user-id-in-reference mode, key
//! rotation, and tamper rejection.

use std::sync::{Arc, Once};
use std::time::Duration;

use websess::backend::kv::KvBackend;
use websess::codec::KEY_LEN;
use websess::config::StoreConfig;
use websess::session_data::MapData;
use websess::store::StoreBuilder;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn open_backend(prefix: &[u8]) -> (KvBackend, websess::backend::kv::PrunerHandle, tempfile::TempDir) {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let tree = db.open_tree("sessions").unwrap();
    let (backend, handle) = KvBackend::open(tree, prefix.to_vec(), Duration::from_secs(3600));
    (backend, handle, dir)
}

#[tokio::test]
async fn sanity_round_trip() {
    let (backend, handle, _dir) = open_backend(b"scenario1:");
    let store = StoreBuilder::<MapData>::new(Arc::new(backend))
        .config(StoreConfig {
            max_age_secs: 10,
            min_refresh_secs: 5,
            ..StoreConfig::default()
        })
        .add_key([1u8; KEY_LEN])
        .build()
        .unwrap();

    let mut session = store.new_session(b"xyzzy".to_vec());
    session.data_mut().insert("note", "Hello, World!");
    let token = session.save().await.unwrap();

    let (loaded, _ttl) = store.get_token_session(&token).await.unwrap();
    assert_eq!(loaded.user_id(), b"xyzzy");
    assert_eq!(loaded.max_age_secs(), 10);
    assert_eq!(loaded.min_refresh_secs(), 5);
    assert_eq!(loaded.data().get("note").unwrap(), "Hello, World!");

    let mut loaded = loaded;
    loaded.delete().await.unwrap();

    assert!(store.get_token_session(&token).await.is_err());

    handle.shutdown().await;
}

#[tokio::test]
async fn expiration_deletes_the_record() {
    let (backend, handle, _dir) = open_backend(b"scenario2:");
    let store = StoreBuilder::<MapData>::new(Arc::new(backend))
        .config(StoreConfig {
            max_age_secs: 33,
            min_refresh_secs: 55,
            auth_type: websess::config::AuthType::Bearer,
            ..StoreConfig::default()
        })
        .add_key([2u8; KEY_LEN])
        .build()
        .unwrap();

    let mut session = store.new_session(Vec::new());
    session.set_max_age_secs(3);
    session.set_min_refresh_secs(5);
    let token = session.save().await.unwrap();

    let (_loaded, ttl) = store.get_token_session(&token).await.unwrap();
    assert!(ttl > 0 && ttl <= 3);

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(store.get_token_session(&token).await.is_err());

    handle.shutdown().await;
}

#[tokio::test]
async fn mass_revocation_only_removes_matching_user() {
    let (backend, handle, _dir) = open_backend(b"scenario3:");
    let store = StoreBuilder::<MapData>::new(Arc::new(backend))
        .add_key([3u8; KEY_LEN])
        .build()
        .unwrap();

    let seeds = [("u1", "m1"), ("u2", "m2"), ("u1", "m3"), ("u3", "m4"), ("u1", "m5")];
    let mut tokens = Vec::new();
    for (user, note) in seeds {
        let mut session = store.new_session(user.as_bytes().to_vec());
        session.data_mut().insert("note", note);
        tokens.push((user, note, session.save().await.unwrap()));
    }

    let (mut first, _ttl) = store.get_token_session(&tokens[0].2).await.unwrap();
    let removed = first.delete_by_user_id().await.unwrap();
    assert_eq!(removed, 3);

    for (user, note, token) in &tokens {
        let result = store.get_token_session(token).await;
        if *user == "u1" {
            assert!(result.is_err(), "expected u1 session to be revoked");
        } else {
            let (loaded, _) = result.unwrap();
            assert_eq!(loaded.data().get("note").unwrap(), note);
        }
    }

    handle.shutdown().await;
}

#[tokio::test]
async fn user_id_in_reference_mode_restores_user_id_without_local_state() {
    let (backend, handle, _dir) = open_backend(b"scenario4:");
    let store = StoreBuilder::<MapData>::new(Arc::new(backend))
        .config(StoreConfig {
            uid_to_client: true,
            ..StoreConfig::default()
        })
        .add_key([4u8; KEY_LEN])
        .build()
        .unwrap();

    let mut session = store.new_session(b"userid-xyzzy".to_vec());
    let token = session.save().await.unwrap();
    drop(session);

    let (loaded, _ttl) = store.get_token_session(&token).await.unwrap();
    assert_eq!(loaded.user_id(), b"userid-xyzzy");

    handle.shutdown().await;
}

#[tokio::test]
async fn key_rotation_preserves_then_drops_decryptability() {
    let (backend, handle, _dir) = open_backend(b"scenario5:");
    let backend = Arc::new(backend);

    let store_ab = StoreBuilder::<MapData>::new(backend.clone())
        .add_key([0xAA; KEY_LEN])
        .add_key([0xBB; KEY_LEN])
        .build()
        .unwrap();

    let mut session = store_ab.new_session(Vec::new());
    let token = session.save().await.unwrap();

    let store_ca = StoreBuilder::<MapData>::new(backend.clone())
        .add_key([0xCC; KEY_LEN])
        .add_key([0xAA; KEY_LEN])
        .build()
        .unwrap();
    assert!(store_ca.get_token_session(&token).await.is_ok());

    let store_c = StoreBuilder::<MapData>::new(backend)
        .add_key([0xCC; KEY_LEN])
        .build()
        .unwrap();
    assert!(store_c.get_token_session(&token).await.is_err());

    handle.shutdown().await;
}

#[tokio::test]
async fn tamper_rejection_leaves_the_record_intact() {
    let (backend, handle, _dir) = open_backend(b"scenario6:");
    let backend = Arc::new(backend);
    let store = StoreBuilder::<MapData>::new(backend.clone())
        .add_key([6u8; KEY_LEN])
        .build()
        .unwrap();

    let mut session = store.new_session(Vec::new());
    let token = session.save().await.unwrap();

    let mut tampered = token.clone().into_bytes();
    let last = tampered.len() - 1;
    tampered[last] = if tampered[last] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(tampered).unwrap();

    assert!(store.get_token_session(&tampered).await.is_err());
    assert!(store.get_token_session(&token).await.is_ok());

    handle.shutdown().await;
}
