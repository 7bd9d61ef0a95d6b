//! # Messaging Demo
//!
//! Demonstrates end-to-end encrypted messaging between two identities
//! through an in-memory directory and relay.
//!
//! ## Run
//!
//! ```bash
//! cargo run --example messaging_demo
//! ```

use std::sync::Arc;

use mercurio_core::directory::{MemoryDirectory, MemoryRelay};
use mercurio_core::{CoreConfig, Error, MercurioCore};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mercurio_core=info".into()),
        )
        .init();

    println!("=== Mercurio Core: Messaging Demo ===\n");

    let directory = Arc::new(MemoryDirectory::new());
    let relay = Arc::new(MemoryRelay::new());

    // Step 1: Two devices, each with its own credential store
    println!("Step 1: Creating identities for Alice and Bob...");

    let alice_core = MercurioCore::open(CoreConfig::default()).expect("Failed to open Alice's core");
    let bob_core = MercurioCore::open(CoreConfig::default()).expect("Failed to open Bob's core");

    let alice_id = alice_core
        .identity()
        .generate_identity()
        .expect("Failed to create Alice");
    let bob_id = bob_core
        .identity()
        .generate_identity()
        .expect("Failed to create Bob");

    println!("  Alice: {}...", alice_id.short());
    println!("  Bob:   {}...\n", bob_id.short());

    let alice = alice_core.messenger(directory.clone(), relay.clone());
    let bob = bob_core.messenger(directory.clone(), relay.clone());

    // Step 2: Publish public keys
    println!("Step 2: Publishing public keys to the directory...");
    alice.publish_identity().await.expect("Failed to publish Alice");
    bob.publish_identity().await.expect("Failed to publish Bob");
    println!("  Done\n");

    // Step 3: Bob listens for new messages from Alice
    let mut incoming = bob.subscribe(&alice_id).await.expect("Failed to subscribe");

    // Step 4: Alice sends
    println!("Step 3: Alice sends \"hello\" to Bob...");
    let record = alice.send(&bob_id, "hello").await.expect("Failed to send");
    println!("  encrypted_content: {}", record.payload.ciphertext);
    println!("  encrypted_aes_key: {}...", &record.payload.wrapped_key[..32]);
    println!("  nonce:             {}", record.payload.nonce);
    println!("  mac:               {}\n", record.payload.tag);

    // Step 5: Bob receives via push and decrypts
    println!("Step 4: Bob receives the push and decrypts...");
    let pushed = incoming.next().await.expect("Relay closed");
    let message = bob.open(&pushed).expect("Bob failed to decrypt");
    println!("  Bob reads: {:?}\n", message.text);

    // Step 6: Alice cannot read her own outgoing message
    println!("Step 5: Alice tries to decrypt her own outgoing message...");
    match alice.open(&pushed) {
        Err(Error::DecryptionFailed) => println!("  DecryptionFailed, as expected\n"),
        other => println!("  Unexpected result: {:?}\n", other.map(|m| m.text)),
    }

    // Step 7: History
    bob.send(&alice_id, "hi alice").await.expect("Failed to reply");
    println!("Step 6: Conversation history as each side sees it...");
    for message in alice.history(&bob_id).await.expect("History failed") {
        println!("  [alice] {}: {}", message.sender.short(), message.text);
    }
    for message in bob.history(&alice_id).await.expect("History failed") {
        println!("  [bob]   {}: {}", message.sender.short(), message.text);
    }

    println!("\n=== Demo Complete ===");
}
