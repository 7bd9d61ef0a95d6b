//! # Directory & Relay
//!
//! Seams to the remote backend that stores public keys and encrypted
//! message records. The core never sees that backend's transport; it talks
//! to these traits.
//!
//! ## Collaborators
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        BACKEND COLLABORATORS                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────┐       ┌─────────────────────────────┐     │
//! │  │  Directory              │       │  MessageRelay               │     │
//! │  │  ─────────              │       │  ────────────               │     │
//! │  │                         │       │                             │     │
//! │  │  users table            │       │  messages table             │     │
//! │  │  • publish(user)        │       │  • insert(record)           │     │
//! │  │  • fetch(identifier)    │       │  • fetch_conversation(id)   │     │
//! │  │                         │       │  • subscribe(id) → push     │     │
//! │  └─────────────────────────┘       └─────────────────────────────┘     │
//! │                                                                         │
//! │  Everything crossing these seams is public material or ciphertext.     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::crypto::{EncryptedPayload, RsaPublicKey, RsaPublicKeyWire};
use crate::error::{Error, Result};
use crate::identity::{Identifier, PublicMaterial};

/// Buffered push events per relay before slow subscribers start lagging
const RELAY_CHANNEL_CAPACITY: usize = 256;

/// Conversation id shared by both participants: the sorted pair joined by `_`
pub fn conversation_id(a: &Identifier, b: &Identifier) -> String {
    if a <= b {
        format!("{}_{}", a, b)
    } else {
        format!("{}_{}", b, a)
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// A row of the directory's `users` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// The user's "05..." identifier
    pub mercurio_id: Identifier,
    /// base64 of the 32-byte Ed25519 public key
    pub ed25519_public_key: String,
    /// base64 of the modulus integer
    pub rsa_public_key_modulus: String,
    /// base64 of the exponent integer
    pub rsa_public_key_exponent: String,
    /// Presence flag maintained by the clients
    pub is_online: bool,
    /// Set by the directory on first publish
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Last time the user published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
}

impl UserRecord {
    /// Build the row a client publishes for itself
    pub fn from_public_material(material: &PublicMaterial) -> Self {
        let wire = material.exchange_public_key.to_wire();
        Self {
            mercurio_id: material.identifier.clone(),
            ed25519_public_key: STANDARD.encode(material.signing_public_key),
            rsa_public_key_modulus: wire.modulus,
            rsa_public_key_exponent: wire.exponent,
            is_online: true,
            created_at: None,
            last_seen: Some(crate::time::now_rfc3339()),
        }
    }

    /// Decode the published exchange key
    pub fn exchange_public_key(&self) -> Result<RsaPublicKey> {
        RsaPublicKey::from_wire(&RsaPublicKeyWire {
            modulus: self.rsa_public_key_modulus.clone(),
            exponent: self.rsa_public_key_exponent.clone(),
        })
    }
}

/// Delivery state of a relayed message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Not yet accepted by the relay
    Sending,
    /// Stored by the relay
    Sent,
    /// Fetched by the recipient
    Delivered,
    /// Opened by the recipient
    Read,
    /// Rejected
    Failed,
}

/// A row of the relay's `messages` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Random UUID
    pub id: String,
    /// See [`conversation_id`]
    pub conversation_id: String,
    /// Author
    pub sender_mercurio_id: Identifier,
    /// The only identity able to decrypt `payload`
    pub recipient_mercurio_id: Identifier,
    /// `encrypted_content`, `encrypted_aes_key`, `nonce`, `mac`
    #[serde(flatten)]
    pub payload: EncryptedPayload,
    /// RFC 3339 insertion time
    pub created_at: String,
    /// When the recipient read it
    #[serde(default)]
    pub read_at: Option<String>,
    /// Delivery state
    pub status: MessageStatus,
}

impl MessageRecord {
    /// Wrap an encrypted payload for insertion
    pub fn new(sender: Identifier, recipient: Identifier, payload: EncryptedPayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id(&sender, &recipient),
            sender_mercurio_id: sender,
            recipient_mercurio_id: recipient,
            payload,
            created_at: crate::time::now_rfc3339(),
            read_at: None,
            status: MessageStatus::Sent,
        }
    }
}

// ============================================================================
// TRAITS
// ============================================================================

/// Public key directory
#[async_trait]
pub trait Directory: Send + Sync {
    /// Insert or replace the row for `user.mercurio_id`
    async fn publish(&self, user: UserRecord) -> Result<()>;

    /// Look up a user, `None` if unknown
    async fn fetch(&self, identifier: &Identifier) -> Result<Option<UserRecord>>;
}

/// Store-and-forward relay for encrypted message records
#[async_trait]
pub trait MessageRelay: Send + Sync {
    /// Persist a record and push it to subscribers of its conversation
    async fn insert(&self, record: MessageRecord) -> Result<()>;

    /// Every record of a conversation, oldest first
    async fn fetch_conversation(&self, conversation_id: &str) -> Result<Vec<MessageRecord>>;

    /// Push stream of records inserted into `conversation_id` from now on
    async fn subscribe(&self, conversation_id: &str) -> Result<Subscription>;
}

/// Newly inserted records for one conversation
pub struct Subscription {
    conversation_id: String,
    receiver: broadcast::Receiver<MessageRecord>,
}

impl Subscription {
    /// Wrap a receiver carrying records of any conversation
    pub fn new(conversation_id: impl Into<String>, receiver: broadcast::Receiver<MessageRecord>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            receiver,
        }
    }

    /// Conversation this subscription is scoped to
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Wait for the next record. Returns `None` once the relay is gone.
    pub async fn next(&mut self) -> Option<MessageRecord> {
        loop {
            match self.receiver.recv().await {
                Ok(record) if record.conversation_id == self.conversation_id => {
                    return Some(record)
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "Subscription to {} lagged, {} records skipped",
                        self.conversation_id,
                        skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// ============================================================================
// IN-MEMORY IMPLEMENTATIONS
// ============================================================================

/// Directory held in memory
#[derive(Default)]
pub struct MemoryDirectory {
    users: RwLock<HashMap<Identifier, UserRecord>>,
}

impl MemoryDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn publish(&self, mut user: UserRecord) -> Result<()> {
        let mut users = self.users.write();
        user.created_at = users
            .get(&user.mercurio_id)
            .and_then(|existing| existing.created_at.clone())
            .or_else(|| Some(crate::time::now_rfc3339()));
        tracing::debug!("Published directory entry {}...", user.mercurio_id.short());
        users.insert(user.mercurio_id.clone(), user);
        Ok(())
    }

    async fn fetch(&self, identifier: &Identifier) -> Result<Option<UserRecord>> {
        Ok(self.users.read().get(identifier).cloned())
    }
}

/// Relay held in memory, pushing inserts over a broadcast channel
pub struct MemoryRelay {
    records: RwLock<Vec<MessageRecord>>,
    events: broadcast::Sender<MessageRecord>,
}

impl MemoryRelay {
    /// Create an empty relay
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(RELAY_CHANNEL_CAPACITY);
        Self {
            records: RwLock::new(Vec::new()),
            events,
        }
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageRelay for MemoryRelay {
    async fn insert(&self, record: MessageRecord) -> Result<()> {
        {
            let mut records = self.records.write();
            if records.iter().any(|existing| existing.id == record.id) {
                return Err(Error::RelayError(format!(
                    "duplicate message id {}",
                    record.id
                )));
            }
            records.push(record.clone());
        }

        // No subscribers is not an error
        let _ = self.events.send(record);
        Ok(())
    }

    async fn fetch_conversation(&self, conversation_id: &str) -> Result<Vec<MessageRecord>> {
        let mut records: Vec<MessageRecord> = self
            .records
            .read()
            .iter()
            .filter(|record| record.conversation_id == conversation_id)
            .cloned()
            .collect();
        // Stable: insertion order breaks timestamp ties
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    async fn subscribe(&self, conversation_id: &str) -> Result<Subscription> {
        Ok(Subscription::new(conversation_id, self.events.subscribe()))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_keys;

    fn id(byte: u8) -> Identifier {
        Identifier::from_signing_key(&[byte; 32])
    }

    fn payload() -> EncryptedPayload {
        EncryptedPayload {
            ciphertext: "Y2lwaGVy".into(),
            wrapped_key: "a2V5".into(),
            nonce: "AAAAAAAAAAAAAAAA".into(),
            tag: "AAAAAAAAAAAAAAAAAAAAAA==".into(),
        }
    }

    #[test]
    fn test_conversation_id_is_order_independent() {
        let a = id(1);
        let b = id(2);
        assert_eq!(conversation_id(&a, &b), conversation_id(&b, &a));
        assert_eq!(conversation_id(&a, &b), format!("{}_{}", a, b));
    }

    #[test]
    fn test_message_record_columns() {
        let record = MessageRecord::new(id(1), id(2), payload());
        let json = serde_json::to_value(&record).unwrap();

        for column in [
            "id",
            "conversation_id",
            "sender_mercurio_id",
            "recipient_mercurio_id",
            "encrypted_content",
            "encrypted_aes_key",
            "nonce",
            "mac",
            "created_at",
            "read_at",
            "status",
        ] {
            assert!(json.get(column).is_some(), "missing column {}", column);
        }
        assert_eq!(json["status"], "sent");

        let back: MessageRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_user_record_carries_wire_key() {
        let public = test_keys::alice().public_key();
        let material = PublicMaterial {
            identifier: id(5),
            signing_public_key: [5u8; 32],
            exchange_public_key: public.clone(),
        };

        let user = UserRecord::from_public_material(&material);
        assert_eq!(user.rsa_public_key_exponent, "AQAB");
        assert_eq!(user.exchange_public_key().unwrap(), public);
        assert_eq!(STANDARD.decode(&user.ed25519_public_key).unwrap(), vec![5u8; 32]);
    }

    #[tokio::test]
    async fn test_directory_publish_and_fetch() {
        let directory = MemoryDirectory::new();
        let user = UserRecord::from_public_material(&PublicMaterial {
            identifier: id(7),
            signing_public_key: [7u8; 32],
            exchange_public_key: test_keys::bob().public_key(),
        });

        assert!(directory.fetch(&id(7)).await.unwrap().is_none());
        directory.publish(user.clone()).await.unwrap();

        let fetched = directory.fetch(&id(7)).await.unwrap().unwrap();
        assert_eq!(fetched.mercurio_id, user.mercurio_id);
        let created = fetched.created_at.clone();
        assert!(created.is_some());

        // Republishing keeps the original creation time
        directory.publish(user).await.unwrap();
        assert_eq!(directory.fetch(&id(7)).await.unwrap().unwrap().created_at, created);
    }

    #[tokio::test]
    async fn test_relay_fetch_is_scoped_and_ordered() {
        let relay = MemoryRelay::new();

        let mut first = MessageRecord::new(id(1), id(2), payload());
        first.created_at = "2024-01-01T00:00:02.000Z".into();
        let mut second = MessageRecord::new(id(2), id(1), payload());
        second.created_at = "2024-01-01T00:00:01.000Z".into();
        let other = MessageRecord::new(id(1), id(3), payload());

        relay.insert(first.clone()).await.unwrap();
        relay.insert(second.clone()).await.unwrap();
        relay.insert(other).await.unwrap();

        let records = relay
            .fetch_conversation(&conversation_id(&id(1), &id(2)))
            .await
            .unwrap();
        assert_eq!(records, vec![second, first]);
    }

    #[tokio::test]
    async fn test_relay_rejects_duplicate_ids() {
        let relay = MemoryRelay::new();
        let record = MessageRecord::new(id(1), id(2), payload());
        relay.insert(record.clone()).await.unwrap();
        assert!(matches!(
            relay.insert(record).await,
            Err(Error::RelayError(_))
        ));
    }

    #[tokio::test]
    async fn test_subscription_receives_only_its_conversation() {
        let relay = MemoryRelay::new();
        let conversation = conversation_id(&id(1), &id(2));
        let mut subscription = relay.subscribe(&conversation).await.unwrap();

        relay
            .insert(MessageRecord::new(id(1), id(3), payload()))
            .await
            .unwrap();
        let wanted = MessageRecord::new(id(2), id(1), payload());
        relay.insert(wanted.clone()).await.unwrap();

        assert_eq!(subscription.conversation_id(), conversation);
        assert_eq!(subscription.next().await, Some(wanted));
    }

    #[tokio::test]
    async fn test_subscription_ends_when_relay_dropped() {
        let relay = MemoryRelay::new();
        let mut subscription = relay.subscribe("nobody").await.unwrap();
        drop(relay);
        assert_eq!(subscription.next().await, None);
    }
}
