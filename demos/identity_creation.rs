//! # Identity Creation Demo
//!
//! This example walks through the identity lifecycle:
//! 1. Generate a new identity and show its recovery phrase
//! 2. Inspect the public material published to the directory
//! 3. Restore the identity from the phrase on a "new device"
//! 4. Log out
//!
//! ## Run
//!
//! ```bash
//! RUST_LOG=mercurio_core=debug cargo run --example identity_creation
//! ```

use std::sync::Arc;

use mercurio_core::directory::UserRecord;
use mercurio_core::storage::MemoryCredentialStore;
use mercurio_core::{CoreConfig, IdentityManager, MercurioCore, RecoveryPhrase};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mercurio_core=info".into()),
        )
        .init();

    println!("=================================================");
    println!("          MERCURIO IDENTITY CREATION DEMO");
    println!("=================================================\n");

    let config = CoreConfig::from_env().expect("Invalid MERCURIO_* environment");
    let core = MercurioCore::open(config).expect("Failed to open core");
    let info = mercurio_core::build_info();
    println!("Mercurio Core v{} ({}, {})\n", info.version, info.target, info.profile);

    // =========================================================================
    // STEP 1: Generate
    // =========================================================================
    println!("1. Generating identity (RSA-2048 keygen can take a moment)...\n");

    let identifier = core
        .identity()
        .generate_identity()
        .expect("Failed to generate identity");
    let phrase = core
        .identity()
        .recovery_phrase()
        .expect("Failed to read recovery phrase")
        .expect("Recovery phrase missing");

    println!("   Identifier: {}", identifier);
    println!("   Recovery phrase:");
    for (i, word) in phrase.split(' ').enumerate() {
        println!("     {:2}. {}", i + 1, word);
    }
    println!();

    // =========================================================================
    // STEP 2: Public material
    // =========================================================================
    println!("2. Public material for the directory...\n");

    let material = core
        .identity()
        .public_material()
        .expect("Failed to read public material");
    let record = UserRecord::from_public_material(&material);

    println!("   ed25519_public_key:      {}", record.ed25519_public_key);
    println!(
        "   rsa_public_key_modulus:  {}...",
        &record.rsa_public_key_modulus[..32]
    );
    println!("   rsa_public_key_exponent: {}", record.rsa_public_key_exponent);
    println!(
        "   SPKI DER for WebCrypto:  {} bytes",
        material.exchange_public_key.to_spki_der().len()
    );
    println!();

    // =========================================================================
    // STEP 3: Restore on another device
    // =========================================================================
    println!("3. Restoring from the phrase on a second device...\n");

    let other_device = IdentityManager::new(Arc::new(MemoryCredentialStore::new()));
    let restored = other_device
        .restore_from_phrase(&phrase)
        .expect("Failed to restore identity");
    let restored_material = other_device
        .public_material()
        .expect("Failed to read restored material");

    println!("   Same identifier:   {}", restored == identifier);
    println!(
        "   Same exchange key: {} (exchange keys are never derived from the phrase)",
        restored_material.exchange_public_key == material.exchange_public_key
    );
    println!();

    println!("   Autocomplete for \"aba\": {:?}", RecoveryPhrase::suggest_words("aba"));
    println!();

    // =========================================================================
    // STEP 4: Logout
    // =========================================================================
    println!("4. Clearing the identity...\n");

    core.identity().clear_identity().expect("Failed to clear identity");
    println!(
        "   Has identity: {}",
        core.identity().has_identity().expect("Failed to query store")
    );

    println!("\n=================================================");
    println!("                    DONE");
    println!("=================================================");
}
