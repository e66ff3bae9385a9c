//! Integration tests for accounts, wallets and the thread list.
//!
//! Covers sign-up and both login styles, wallet registration under each
//! identity mode, every recipient check `start_chat` performs before
//! writing, thread previews, profile search, and session persistence.
//!
//! Verification command: `cargo test --test directory_flows`

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ledgerchat::chat::{ChatConfig, ConversationView};
use ledgerchat::directory::{
    Account, Directory, DirectoryError, NO_MESSAGES, UNKNOWN_USER, ValidationError,
};
use ledgerchat::session::{
    AuthMode, IdentityMode, Session, SessionError, SessionFile, SessionPhase,
};
use ledgerchat::store::{InMemoryBackend, ThreadStore};
use ledgerchat::wallet::dev::DevWallet;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn directory() -> (InMemoryBackend, Directory<InMemoryBackend, DevWallet>) {
    let store = InMemoryBackend::new();
    (store.clone(), Directory::new(store, DevWallet::new()))
}

fn signed_in(mode: IdentityMode, account: Account) -> Arc<Session> {
    let session = Session::new(mode, AuthMode::PasswordLogin);
    session.activate(account.profile, account.wallets).unwrap();
    Arc::new(session)
}

/// A unique session file path per test.
fn temp_session_path(name: &str) -> PathBuf {
    let n = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir()
        .join("ledgerchat-integ-session")
        .join(format!("{name}-{}-{n}", std::process::id()))
        .join("session.json")
}

// ---------------------------------------------------------------------------
// Sign-up and login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sign_up_registers_profile_and_wallet() {
    let (_, dir) = directory();
    let reg = dir.sign_up("alice", Some("alice@example.com")).await.unwrap();

    assert_eq!(reg.account.profile.username, "alice");
    assert_eq!(
        reg.account.profile.address.as_ref(),
        Some(&reg.keys.public_address)
    );
    assert_eq!(reg.account.wallets.len(), 1);
    assert_eq!(reg.account.wallets[0].address, reg.keys.public_address);
    assert_eq!(reg.account.wallets[0].name, "Main Wallet");
}

#[tokio::test]
async fn duplicate_and_blank_usernames_are_rejected() {
    let (_, dir) = directory();
    dir.sign_up("alice", None).await.unwrap();

    assert!(matches!(
        dir.sign_up("alice", None).await,
        Err(DirectoryError::UsernameTaken(name)) if name == "alice"
    ));
    assert!(matches!(
        dir.sign_up("   ", None).await,
        Err(DirectoryError::InvalidUsername)
    ));
}

#[tokio::test]
async fn password_login_needs_matching_email() {
    let (_, dir) = directory();
    let reg = dir.sign_up("alice", Some("alice@example.com")).await.unwrap();

    let account = dir
        .login_with_password("alice", "alice@example.com")
        .await
        .unwrap();
    assert_eq!(account.profile.id, reg.account.profile.id);
    assert_eq!(account.wallets, reg.account.wallets);

    assert!(matches!(
        dir.login_with_password("alice", "mallory@example.com").await,
        Err(DirectoryError::InvalidCredentials)
    ));
    assert!(matches!(
        dir.login_with_password("nobody", "alice@example.com").await,
        Err(DirectoryError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn seed_login_proves_address_ownership() {
    let (_, dir) = directory();
    let alice = dir.sign_up("alice", None).await.unwrap();
    let bob = dir.sign_up("bob", None).await.unwrap();

    let account = dir
        .login_with_seed(
            alice.keys.private_seed.as_str(),
            alice.keys.public_address.as_str(),
        )
        .await
        .unwrap();
    assert_eq!(account.profile.username, "alice");

    assert!(matches!(
        dir.login_with_seed(
            bob.keys.private_seed.as_str(),
            alice.keys.public_address.as_str()
        )
        .await,
        Err(DirectoryError::InvalidSeed)
    ));
    assert!(matches!(
        dir.login_with_seed(alice.keys.private_seed.as_str(), "not-an-address")
            .await,
        Err(DirectoryError::Validation(ValidationError::MalformedAddress(_)))
    ));
}

#[tokio::test]
async fn seed_login_for_unregistered_address_fails() {
    let (_, dir) = directory();
    let seed = "sOrphanSeedNeverRegistered";
    let address = DevWallet::address_for_seed(seed);

    assert!(matches!(
        dir.login_with_seed(seed, address.as_str()).await,
        Err(DirectoryError::InvalidCredentials)
    ));
}

// ---------------------------------------------------------------------------
// Wallets
// ---------------------------------------------------------------------------

#[tokio::test]
async fn multi_wallet_session_adds_wallets() {
    let (_, dir) = directory();
    let alice = dir.sign_up("alice", None).await.unwrap();
    let session = signed_in(IdentityMode::MultiWallet, alice.account);

    let second = dir.create_wallet(&session, "Savings").await.unwrap();
    let wallets = session.snapshot().wallets;
    assert_eq!(wallets.len(), 2);
    assert_eq!(wallets[1].name, "Savings");

    // The primary wallet stays current until another is selected.
    assert_eq!(session.current_identity().unwrap(), alice.keys.public_address);
    session.select_wallet(&second.public_address).unwrap();
    assert_eq!(session.current_identity().unwrap(), second.public_address);
    assert!(session.is_self(&alice.keys.public_address));
}

#[tokio::test]
async fn relogin_brings_back_added_wallets() {
    let (_, dir) = directory();
    let alice = dir.sign_up("alice", Some("alice@example.com")).await.unwrap();
    let bob = dir.sign_up("bob", None).await.unwrap();
    let first = signed_in(IdentityMode::MultiWallet, alice.account);
    let savings = dir.create_wallet(&first, "Savings").await.unwrap();
    first.dispose();

    let account = dir
        .login_with_password("alice", "alice@example.com")
        .await
        .unwrap();
    let names: Vec<&str> = account.wallets.iter().map(|w| w.name.as_str()).collect();
    assert_eq!(names, vec!["Main Wallet", "Savings"]);

    let session = signed_in(IdentityMode::MultiWallet, account.clone());
    assert_eq!(session.current_identity().unwrap(), alice.keys.public_address);
    assert!(session.is_self(&savings.public_address));
    session.select_wallet(&savings.public_address).unwrap();
    let thread = dir
        .start_chat(&session, bob.keys.public_address.as_str())
        .await
        .unwrap();
    assert!(thread.involves(&savings.public_address));

    // A single-wallet session cannot hold the restored account.
    let single = Session::new(IdentityMode::SingleWallet, AuthMode::PasswordLogin);
    assert!(matches!(
        single.activate(account.profile, account.wallets),
        Err(SessionError::WalletLimit(_))
    ));
}

#[tokio::test]
async fn single_wallet_session_refuses_second_wallet() {
    let (_, dir) = directory();
    let alice = dir.sign_up("alice", None).await.unwrap();
    let session = signed_in(IdentityMode::SingleWallet, alice.account);

    assert!(matches!(
        dir.create_wallet(&session, "Second").await,
        Err(DirectoryError::Session(SessionError::WalletLimit(_)))
    ));
    assert_eq!(session.snapshot().wallets.len(), 1);
}

#[tokio::test]
async fn create_wallet_needs_sign_in() {
    let (_, dir) = directory();
    let session = Session::new(IdentityMode::MultiWallet, AuthMode::SeedLogin);

    assert!(matches!(
        dir.create_wallet(&session, "Orphan").await,
        Err(DirectoryError::Session(SessionError::NotActive))
    ));
}

// ---------------------------------------------------------------------------
// Starting chats
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_chat_rejects_bad_recipients_without_writing() {
    let (store, dir) = directory();
    let alice = dir.sign_up("alice", None).await.unwrap();
    let me = alice.keys.public_address.clone();
    let session = signed_in(IdentityMode::SingleWallet, alice.account);
    let stranger = DevWallet::address_for_seed("sStranger");

    let cases: Vec<(&str, ValidationError)> = vec![
        ("", ValidationError::EmptyRecipient),
        ("   ", ValidationError::EmptyRecipient),
        (
            "xNotALedgerAddress",
            ValidationError::MalformedAddress("xNotALedgerAddress".into()),
        ),
        (stranger.as_str(), ValidationError::UnknownRecipient(stranger.clone())),
        (me.as_str(), ValidationError::SelfChat),
    ];

    for (input, expected) in cases {
        match dir.start_chat(&session, input).await {
            Err(DirectoryError::Validation(got)) => assert_eq!(got, expected, "input {input:?}"),
            other => panic!("input {input:?}: expected validation error, got {other:?}"),
        }
    }
    assert!(store.threads_for(&me).await.unwrap().is_empty());
}

#[tokio::test]
async fn chat_with_own_second_wallet_is_self_chat() {
    let (_, dir) = directory();
    let alice = dir.sign_up("alice", None).await.unwrap();
    let session = signed_in(IdentityMode::MultiWallet, alice.account);
    let second = dir.create_wallet(&session, "Other").await.unwrap();

    assert!(matches!(
        dir.start_chat(&session, second.public_address.as_str()).await,
        Err(DirectoryError::Validation(ValidationError::SelfChat))
    ));
}

#[tokio::test]
async fn start_chat_reuses_thread_from_either_side() {
    let (_, dir) = directory();
    let alice = dir.sign_up("alice", None).await.unwrap();
    let bob = dir.sign_up("bob", None).await.unwrap();
    let alice_addr = alice.keys.public_address.clone();
    let bob_addr = bob.keys.public_address.clone();
    let alice_session = signed_in(IdentityMode::SingleWallet, alice.account);
    let bob_session = signed_in(IdentityMode::SingleWallet, bob.account);

    let first = dir.start_chat(&alice_session, bob_addr.as_str()).await.unwrap();
    let again = dir
        .start_chat(&alice_session, &format!("  {bob_addr}  "))
        .await
        .unwrap();
    let reverse = dir.start_chat(&bob_session, alice_addr.as_str()).await.unwrap();

    assert_eq!(first.id, again.id);
    assert_eq!(first.id, reverse.id);
    assert!(first.involves(&alice_addr));
    assert!(first.involves(&bob_addr));
    assert!(first.participant1 <= first.participant2);
}

// ---------------------------------------------------------------------------
// Thread list and search
// ---------------------------------------------------------------------------

#[tokio::test]
async fn previews_list_most_recent_first() {
    let (store, dir) = directory();
    let alice = dir.sign_up("alice", None).await.unwrap();
    let bob = dir.sign_up("bob", None).await.unwrap();
    let carol = dir.sign_up("carol", None).await.unwrap();
    let alice_session = signed_in(IdentityMode::SingleWallet, alice.account);

    let with_bob = dir
        .start_chat(&alice_session, bob.keys.public_address.as_str())
        .await
        .unwrap();
    let with_carol = dir
        .start_chat(&alice_session, carol.keys.public_address.as_str())
        .await
        .unwrap();

    let carol_session = signed_in(IdentityMode::SingleWallet, carol.account);
    let (carol_view, _) = ConversationView::new(
        store.clone(),
        Arc::clone(&carol_session),
        with_carol.clone(),
        ChatConfig::default(),
    );
    carol_view.submit("hi alice", false).await.unwrap();
    carol_view.submit("you there?", false).await.unwrap();

    let previews = dir.thread_previews(&alice_session).await.unwrap();
    assert_eq!(previews.len(), 2);

    assert_eq!(previews[0].thread.id, with_carol.id);
    assert_eq!(previews[0].participant, carol.keys.public_address);
    assert_eq!(previews[0].participant_username, "carol");
    assert_eq!(previews[0].last_message, "you there?");
    assert_eq!(previews[0].unread, 2);

    assert_eq!(previews[1].thread.id, with_bob.id);
    assert_eq!(previews[1].participant_username, "bob");
    assert_eq!(previews[1].last_message, NO_MESSAGES);
    assert_eq!(previews[1].unread, 0);
    assert_eq!(previews[1].timestamp, with_bob.created_at);

    // Carol's own messages are never unread for her.
    let from_carol = dir.thread_previews(&carol_session).await.unwrap();
    assert_eq!(from_carol[0].unread, 0);
}

#[tokio::test]
async fn preview_names_unknown_participant() {
    let (_, dir) = directory();
    let alice = dir.sign_up("alice", None).await.unwrap();
    let me = alice.keys.public_address.clone();
    let session = signed_in(IdentityMode::SingleWallet, alice.account);

    // A thread opened directly with an address that has no profile.
    let ghost = DevWallet::address_for_seed("sGhost");
    dir.open_thread(me, ghost.clone()).await.unwrap();

    let previews = dir.thread_previews(&session).await.unwrap();
    assert_eq!(previews[0].participant, ghost);
    assert_eq!(previews[0].participant_username, UNKNOWN_USER);
}

#[tokio::test]
async fn search_is_case_insensitive_and_skips_self() {
    let (_, dir) = directory();
    let alice = dir.sign_up("alice", None).await.unwrap();
    dir.sign_up("Alicia", None).await.unwrap();
    dir.sign_up("bob", None).await.unwrap();
    let session = signed_in(IdentityMode::SingleWallet, alice.account);

    let found: Vec<String> = dir
        .search_profiles(&session, "ALI")
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.username)
        .collect();
    assert_eq!(found, vec!["Alicia"]);

    assert!(dir.search_profiles(&session, "  ").await.unwrap().is_empty());
}

#[tokio::test]
async fn search_is_capped() {
    let (_, dir) = directory();
    let alice = dir.sign_up("alice", None).await.unwrap();
    for i in 0..15 {
        dir.sign_up(&format!("user{i}"), None).await.unwrap();
    }
    let session = signed_in(IdentityMode::SingleWallet, alice.account);

    let found = dir.search_profiles(&session, "user").await.unwrap();
    assert_eq!(found.len(), ledgerchat::directory::SEARCH_LIMIT);
}

// ---------------------------------------------------------------------------
// Session persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_survives_restart() {
    let (_, dir) = directory();
    let alice = dir.sign_up("alice", None).await.unwrap();
    let session = signed_in(IdentityMode::SingleWallet, alice.account);
    session.set_encrypt_by_default(true);

    let file = SessionFile::new(temp_session_path("restart"));
    file.save(&session.snapshot()).unwrap();

    let snapshot = file.load().unwrap().unwrap();
    assert_eq!(snapshot, session.snapshot());

    let restored = Session::restore(IdentityMode::SingleWallet, AuthMode::PasswordLogin, snapshot);
    assert_eq!(restored.phase(), SessionPhase::Active);
    assert_eq!(
        restored.current_identity().unwrap(),
        alice.keys.public_address
    );
    assert!(restored.encrypt_by_default());

    file.clear().unwrap();
    assert!(file.load().unwrap().is_none());
}

#[tokio::test]
async fn snapshot_never_contains_seed() {
    let (_, dir) = directory();
    let alice = dir.sign_up("alice", None).await.unwrap();
    let seed = alice.keys.private_seed.to_string();
    let session = signed_in(IdentityMode::SingleWallet, alice.account);

    let json = serde_json::to_string(&session.snapshot()).unwrap();
    assert!(!json.contains(&seed));
}

#[tokio::test]
async fn sign_out_clears_identity() {
    let (_, dir) = directory();
    let alice = dir.sign_up("alice", None).await.unwrap();
    let session = signed_in(IdentityMode::SingleWallet, alice.account);

    session.dispose();
    assert_eq!(session.phase(), SessionPhase::Disposed);
    assert!(session.user().is_none());
    assert!(matches!(
        dir.thread_previews(&session).await,
        Err(DirectoryError::Session(SessionError::Disposed))
    ));
}
