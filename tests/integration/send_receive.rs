//! Integration tests for sending and receiving in one thread.
//!
//! Two signed-in users share an in-memory backend whose inserts are pushed
//! through the realtime hub. Verifies:
//!
//! 1. The sender's optimistic entry is confirmed with the stored row.
//! 2. The recipient's view receives the row through its realtime pump.
//! 3. The sender's own push is suppressed (no duplicate entry).
//! 4. Per-thread ordering survives several sends.
//! 5. Read state follows focus, and history reload reflects it.
//!
//! Verification command: `cargo test --test send_receive`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use ledgerchat::chat::state::{DeliveryState, EntryId};
use ledgerchat::chat::{ChatConfig, ConversationEvent, ConversationView, PushOutcome};
use ledgerchat::directory::Directory;
use ledgerchat::realtime::hub::RealtimeHub;
use ledgerchat::realtime::{RealtimeChannel, Topic};
use ledgerchat::session::{AuthMode, IdentityMode, Session};
use ledgerchat::store::{InMemoryBackend, MessageStore, ThreadStore};
use ledgerchat::wallet::dev::DevWallet;

use ledgerchat_proto::message::{MessageRow, PublicId, Timestamp};
use ledgerchat_proto::thread::Thread;

type View = ConversationView<InMemoryBackend>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Conversation {
    hub: RealtimeHub,
    store: InMemoryBackend,
    thread: Thread,
    alice_addr: PublicId,
    bob_addr: PublicId,
    alice: Arc<View>,
    alice_events: mpsc::Receiver<ConversationEvent>,
    bob: Arc<View>,
    bob_events: mpsc::Receiver<ConversationEvent>,
    pumps: Vec<JoinHandle<()>>,
}

impl Conversation {
    /// Signs up alice and bob, opens their thread, and starts both pumps.
    async fn open() -> Self {
        let hub = RealtimeHub::new();
        let store = InMemoryBackend::with_hub(hub.clone());
        let directory = Directory::new(store.clone(), DevWallet::new());

        let alice_reg = directory.sign_up("alice", Some("alice@example.com")).await.unwrap();
        let bob_reg = directory.sign_up("bob", Some("bob@example.com")).await.unwrap();
        let alice_addr = alice_reg.keys.public_address.clone();
        let bob_addr = bob_reg.keys.public_address.clone();

        let alice_session = session_for(alice_reg.account.profile, alice_reg.account.wallets);
        let bob_session = session_for(bob_reg.account.profile, bob_reg.account.wallets);

        let thread = directory
            .start_chat(&alice_session, bob_addr.as_str())
            .await
            .unwrap();

        let (alice, alice_events) = ConversationView::new(
            store.clone(),
            alice_session,
            thread.clone(),
            ChatConfig::default(),
        );
        let (bob, bob_events) =
            ConversationView::new(store.clone(), bob_session, thread.clone(), ChatConfig::default());
        let alice = Arc::new(alice);
        let bob = Arc::new(bob);

        let mut conversation = Self {
            hub,
            store,
            thread,
            alice_addr,
            bob_addr,
            alice,
            alice_events,
            bob,
            bob_events,
            pumps: Vec::new(),
        };
        let (alice, bob) = (Arc::clone(&conversation.alice), Arc::clone(&conversation.bob));
        conversation.start_pump(&alice);
        conversation.start_pump(&bob);
        conversation
    }

    fn start_pump(&mut self, view: &Arc<View>) {
        let subscription = self.hub.subscribe(Topic::Thread(self.thread.id));
        let view = Arc::clone(view);
        self.pumps
            .push(tokio::spawn(async move { view.pump(subscription).await }));
    }

    async fn shutdown(self) {
        self.alice.dispose();
        self.bob.dispose();
        for pump in self.pumps {
            pump.await.unwrap();
        }
    }
}

fn session_for(
    profile: ledgerchat_proto::profile::Profile,
    wallets: Vec<ledgerchat_proto::profile::WalletRecord>,
) -> Arc<Session> {
    let session = Session::new(IdentityMode::SingleWallet, AuthMode::PasswordLogin);
    session.activate(profile, wallets).unwrap();
    Arc::new(session)
}

/// Polls `check` until it holds, failing the test after two seconds.
async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn texts(view: &View) -> Vec<String> {
    view.messages().into_iter().map(|m| m.text).collect()
}

// ---------------------------------------------------------------------------
// Send and confirm
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sender_entry_is_confirmed_with_stored_row() {
    let mut conv = Conversation::open().await;

    let id = conv.alice.submit("hello bob", false).await.unwrap().unwrap();
    let EntryId::Confirmed(message_id) = id else {
        panic!("expected a confirmed id, got {id}");
    };

    let messages = conv.alice.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, EntryId::Confirmed(message_id));
    assert_eq!(messages[0].text, "hello bob");
    assert_eq!(messages[0].sender, conv.alice_addr);
    assert!(messages[0].is_own);
    assert_eq!(messages[0].status, DeliveryState::Sent);

    let stored = conv.store.messages_in_thread(&conv.thread.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, message_id);
    assert_eq!(stored[0].content, "hello bob");
    assert!(!stored[0].is_encrypted);

    match conv.alice_events.recv().await.unwrap() {
        ConversationEvent::MessageConfirmed { message_id: m, .. } => assert_eq!(m, message_id),
        other => panic!("expected MessageConfirmed, got {other:?}"),
    }

    conv.shutdown().await;
}

#[tokio::test]
async fn submit_trims_surrounding_whitespace() {
    let conv = Conversation::open().await;

    conv.alice.submit("  padded  \n", false).await.unwrap();

    let stored = conv.store.messages_in_thread(&conv.thread.id).await.unwrap();
    assert_eq!(stored[0].content, "padded");
    assert_eq!(texts(&conv.alice), vec!["padded"]);

    conv.shutdown().await;
}

#[tokio::test]
async fn send_touches_thread_activity() {
    let conv = Conversation::open().await;
    let before = conv.thread.last_message_at;

    conv.alice.submit("bump", false).await.unwrap();

    let stored = conv.store.messages_in_thread(&conv.thread.id).await.unwrap();
    let thread = conv.store.thread(&conv.thread.id).await.unwrap().unwrap();
    assert!(thread.last_message_at >= before);
    assert_eq!(thread.last_message_at, stored[0].created_at);

    conv.shutdown().await;
}

// ---------------------------------------------------------------------------
// Realtime delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn recipient_receives_through_realtime() {
    let mut conv = Conversation::open().await;

    conv.alice.submit("are you there?", false).await.unwrap();

    let bob = Arc::clone(&conv.bob);
    eventually(|| bob.len() == 1).await;

    let messages = conv.bob.messages();
    assert_eq!(messages[0].text, "are you there?");
    assert_eq!(messages[0].sender, conv.alice_addr);
    assert!(!messages[0].is_own);

    match conv.bob_events.recv().await.unwrap() {
        ConversationEvent::MessageReceived { .. } => {}
        other => panic!("expected MessageReceived, got {other:?}"),
    }

    conv.shutdown().await;
}

#[tokio::test]
async fn own_push_does_not_duplicate_sender_entry() {
    let conv = Conversation::open().await;

    conv.alice.submit("just once", false).await.unwrap();
    let bob = Arc::clone(&conv.bob);
    eventually(|| bob.len() == 1).await;

    // Alice's pump saw the same row; it must have been ignored.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(conv.alice.len(), 1);

    conv.shutdown().await;
}

#[tokio::test]
async fn replies_flow_both_ways_in_order() {
    let conv = Conversation::open().await;

    conv.alice.submit("one", false).await.unwrap();
    let bob = Arc::clone(&conv.bob);
    eventually(|| bob.len() == 1).await;

    conv.bob.submit("two", false).await.unwrap();
    let alice = Arc::clone(&conv.alice);
    eventually(|| alice.len() == 2).await;

    conv.alice.submit("three", false).await.unwrap();
    eventually(|| bob.len() == 3).await;

    assert_eq!(texts(&conv.alice), vec!["one", "two", "three"]);
    assert_eq!(texts(&conv.bob), vec!["one", "two", "three"]);

    let own: Vec<bool> = conv.bob.messages().iter().map(|m| m.is_own).collect();
    assert_eq!(own, vec![false, true, false]);

    conv.shutdown().await;
}

#[tokio::test]
async fn many_sends_keep_insert_order() {
    let conv = Conversation::open().await;

    let expected: Vec<String> = (0..20).map(|i| format!("msg {i}")).collect();
    for text in &expected {
        conv.alice.submit(text, false).await.unwrap();
    }

    let bob = Arc::clone(&conv.bob);
    eventually(|| bob.len() == expected.len()).await;

    assert_eq!(texts(&conv.alice), expected);
    assert_eq!(texts(&conv.bob), expected);

    let stamps: Vec<Timestamp> = conv.bob.messages().iter().map(|m| m.created_at).collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));

    conv.shutdown().await;
}

#[tokio::test]
async fn push_from_another_thread_is_ignored() {
    let conv = Conversation::open().await;

    let directory = Directory::new(conv.store.clone(), DevWallet::new());
    let carol = directory.sign_up("carol", None).await.unwrap();
    let other = directory
        .open_thread(conv.alice_addr.clone(), carol.keys.public_address.clone())
        .await
        .unwrap();

    let row: MessageRow = conv
        .store
        .insert_message(ledgerchat_proto::message::NewMessage {
            thread_id: other.id,
            sender_id: carol.keys.public_address.clone(),
            content: "wrong room".into(),
            is_encrypted: false,
        })
        .await
        .unwrap();

    assert_eq!(conv.bob.on_remote_push(row).await, PushOutcome::ForeignThread);
    assert!(conv.bob.is_empty());

    conv.shutdown().await;
}

// ---------------------------------------------------------------------------
// Read state
// ---------------------------------------------------------------------------

#[tokio::test]
async fn focused_recipient_marks_push_read() {
    let conv = Conversation::open().await;

    conv.alice.submit("read me", false).await.unwrap();
    let bob = Arc::clone(&conv.bob);
    eventually(|| {
        bob.messages()
            .first()
            .is_some_and(|m| m.status == DeliveryState::Read)
    })
    .await;

    let stored = conv.store.messages_in_thread(&conv.thread.id).await.unwrap();
    assert!(stored[0].read);

    conv.shutdown().await;
}

#[tokio::test]
async fn unfocused_recipient_leaves_push_unread() {
    let conv = Conversation::open().await;
    conv.bob.set_focused(false);

    conv.alice.submit("later", false).await.unwrap();
    let bob = Arc::clone(&conv.bob);
    eventually(|| bob.len() == 1).await;

    assert_eq!(conv.bob.messages()[0].status, DeliveryState::Delivered);
    let stored = conv.store.messages_in_thread(&conv.thread.id).await.unwrap();
    assert!(!stored[0].read);

    // Opening the history marks it read.
    conv.bob.set_focused(true);
    let history = conv.bob.load_history().await.unwrap();
    assert_eq!(history.len(), 1);
    let stored = conv.store.messages_in_thread(&conv.thread.id).await.unwrap();
    assert!(stored[0].read);
    assert_eq!(conv.bob.messages()[0].status, DeliveryState::Read);

    conv.shutdown().await;
}

#[tokio::test]
async fn history_reload_keeps_own_messages_unread_by_peer() {
    let conv = Conversation::open().await;
    conv.bob.set_focused(false);

    conv.alice.submit("first", false).await.unwrap();
    conv.alice.submit("second", false).await.unwrap();

    let history = conv.alice.load_history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|m| m.is_own));
    assert!(history.iter().all(|m| m.status == DeliveryState::Delivered));

    // Alice's reload must not mark her own messages read.
    let stored = conv.store.messages_in_thread(&conv.thread.id).await.unwrap();
    assert!(stored.iter().all(|r| !r.read));
    assert_ne!(conv.alice_addr, conv.bob_addr);

    conv.shutdown().await;
}
