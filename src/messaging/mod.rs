//! # Messaging Module
//!
//! Send and receive end-to-end encrypted text through the directory and relay.
//!
//! ## Message Encryption Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      MESSAGE ENCRYPTION                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Sender (Alice)                                                        │
//! │  ─────────────────────────────────────────────────────────────         │
//! │                                                                         │
//! │  Input: "Hello Bob!"                                                   │
//! │                                                                         │
//! │  1. Fetch Bob's exchange key from the directory                        │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  users[bob].rsa_public_key_modulus / _exponent (base64)    │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  2. Encrypt with a fresh AES key and nonce                             │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  AES-256-GCM(random_key, random_12_bytes, "Hello Bob!")    │       │
//! │  │  → ciphertext, 16-byte tag                                 │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  3. Wrap the AES key for Bob                                           │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  RSA-OAEP-SHA256(bob_exchange_public, random_key)          │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Output: MessageRecord inserted into the relay                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the recipient can open a record. The sender's own outgoing messages
//! are skipped when history is read back.

use std::sync::Arc;

use crate::directory::{
    conversation_id, Directory, MessageRecord, MessageRelay, MessageStatus, Subscription,
    UserRecord,
};
use crate::error::{Error, Result};
use crate::identity::{Identifier, IdentityManager};

/// A relay record after successful decryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage {
    /// Relay record id
    pub id: String,
    /// Conversation the record belongs to
    pub conversation_id: String,
    /// Author
    pub sender: Identifier,
    /// Addressee (the active identity)
    pub recipient: Identifier,
    /// Plaintext
    pub text: String,
    /// RFC 3339 insertion time
    pub created_at: String,
    /// Delivery state as recorded by the relay
    pub status: MessageStatus,
}

/// Composes the identity, the cipher and the backend collaborators
pub struct Messenger {
    identity: Arc<IdentityManager>,
    directory: Arc<dyn Directory>,
    relay: Arc<dyn MessageRelay>,
}

impl Messenger {
    /// Create a new messenger
    pub fn new(
        identity: Arc<IdentityManager>,
        directory: Arc<dyn Directory>,
        relay: Arc<dyn MessageRelay>,
    ) -> Self {
        Self {
            identity,
            directory,
            relay,
        }
    }

    /// Publish the active identity's public keys to the directory
    pub async fn publish_identity(&self) -> Result<UserRecord> {
        let material = self.identity.public_material()?;
        let user = UserRecord::from_public_material(&material);
        self.directory.publish(user.clone()).await?;

        tracing::info!("Published public keys for {}...", material.identifier.short());
        Ok(user)
    }

    /// Encrypt `text` for `recipient` and insert it into the relay
    pub async fn send(&self, recipient: &Identifier, text: &str) -> Result<MessageRecord> {
        let sender = self.identity.public_material()?.identifier;

        let peer = self
            .directory
            .fetch(recipient)
            .await?
            .ok_or_else(|| Error::PeerNotFound(recipient.to_string()))?;
        let peer_key = peer
            .exchange_public_key()
            .map_err(|e| Error::RecipientKeyInvalid(e.to_string()))?;

        let payload = crate::crypto::encrypt_message(text, &peer_key)?;
        let record = MessageRecord::new(sender, recipient.clone(), payload);
        self.relay.insert(record.clone()).await?;

        tracing::debug!(
            "Sent message {} to {}...",
            record.id,
            recipient.short()
        );
        Ok(record)
    }

    /// Decrypt one relay record addressed to the active identity
    pub fn open(&self, record: &MessageRecord) -> Result<DecryptedMessage> {
        let text = self.identity.decrypt_message(&record.payload)?;
        Ok(DecryptedMessage {
            id: record.id.clone(),
            conversation_id: record.conversation_id.clone(),
            sender: record.sender_mercurio_id.clone(),
            recipient: record.recipient_mercurio_id.clone(),
            text,
            created_at: record.created_at.clone(),
            status: record.status,
        })
    }

    /// Every message from the conversation with `peer` that decrypts, oldest first
    ///
    /// Records that fail with `DecryptionFailed` are skipped. That includes
    /// this identity's own outgoing messages and anything encrypted under an
    /// exchange key replaced by a restore.
    pub async fn history(&self, peer: &Identifier) -> Result<Vec<DecryptedMessage>> {
        let conversation = self.conversation_with(peer)?;
        let records = self.relay.fetch_conversation(&conversation).await?;

        let mut messages = Vec::with_capacity(records.len());
        for record in &records {
            match self.open(record) {
                Ok(message) => messages.push(message),
                Err(Error::DecryptionFailed) => {
                    tracing::warn!("Skipping message {}: decryption failed", record.id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(messages)
    }

    /// Push stream of new records in the conversation with `peer`
    pub async fn subscribe(&self, peer: &Identifier) -> Result<Subscription> {
        let conversation = self.conversation_with(peer)?;
        self.relay.subscribe(&conversation).await
    }

    fn conversation_with(&self, peer: &Identifier) -> Result<String> {
        let own = self.identity.public_material()?.identifier;
        Ok(conversation_id(&own, peer))
    }
}

// ============================================================================
// TESTS
// ============================================================================
