use std::{path::PathBuf, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use whatsmeow_signal::{
    crypto::serialize_public_key, CiphertextMessage, EngineConfig, MemoryStore, SessionManager, JID,
};

/// Reference CLI exercising the Signal session engine over in-memory stores.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Load engine configuration from a JSON file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    verbose: bool,

    /// Choose a command to run.
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a two-party and a group exchange between two fresh accounts.
    Demo {
        /// Message Alice sends first.
        #[arg(default_value = "hello from alice")]
        message: String,
    },
    /// Generate a prekey batch for a fresh account and print its bundle.
    Prekeys,
    /// Print the effective configuration.
    Config,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Demo { message } => run_demo(config, &message)?,
        Commands::Prekeys => {
            let manager = SessionManager::new(Arc::new(MemoryStore::new()), config);
            let batch = manager.generate_pre_keys()?;
            let bundle = manager.local_pre_key_bundle()?;
            println!("Generated {} unsent prekeys", batch.len());
            println!("Registration ID: {}", bundle.registration_id);
            println!("Identity key: {}", STANDARD.encode(serialize_public_key(&bundle.identity_key)));
            println!(
                "Signed prekey {}: {}",
                bundle.signed_pre_key_id,
                STANDARD.encode(serialize_public_key(&bundle.signed_pre_key_public))
            );
            println!("Signature: {}", STANDARD.encode(&bundle.signed_pre_key_signature));
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn run_demo(config: EngineConfig, message: &str) -> Result<(), Box<dyn std::error::Error>> {
    let alice_jid: JID = "1111111111@s.whatsapp.net".parse()?;
    let bob_jid: JID = "2222222222@s.whatsapp.net".parse()?;
    let group: JID = "120363000000000000@g.us".parse()?;

    let alice = SessionManager::new(Arc::new(MemoryStore::new()), config.clone());
    let bob = SessionManager::new(Arc::new(MemoryStore::new()), config);

    alice.create_session(&bob_jid, &bob.local_pre_key_bundle()?)?;

    let hello = alice.encrypt(&bob_jid, message.as_bytes(), false, None)?;
    print_ciphertext("alice -> bob", &hello);
    let plaintext = bob.decrypt(&alice_jid, None, hello.serialize(), enc_type(&hello)?)?;
    println!("bob read: {}", String::from_utf8_lossy(&plaintext));

    let reply = bob.encrypt(&alice_jid, b"hello from bob", false, None)?;
    print_ciphertext("bob -> alice", &reply);
    let plaintext = alice.decrypt(&bob_jid, None, reply.serialize(), enc_type(&reply)?)?;
    println!("alice read: {}", String::from_utf8_lossy(&plaintext));

    let distribution = alice.create_group_session(&group, &alice_jid)?;
    bob.process_group_session(&group, &alice_jid, distribution.serialized())?;

    let broadcast = alice.encrypt(&group, b"hello group", true, Some(&alice_jid))?;
    print_ciphertext("alice -> group", &broadcast);
    let plaintext = bob.decrypt(&group, Some(&alice_jid), broadcast.serialize(), enc_type(&broadcast)?)?;
    println!("bob read in group: {}", String::from_utf8_lossy(&plaintext));

    Ok(())
}

fn enc_type(message: &CiphertextMessage) -> Result<whatsmeow_signal::EncType, Box<dyn std::error::Error>> {
    message
        .enc_type()
        .ok_or_else(|| "distribution messages have no encryption type".into())
}

fn print_ciphertext(label: &str, message: &CiphertextMessage) {
    let tag = message.enc_type().map(|t| t.as_str()).unwrap_or("-");
    println!("{label} [{tag}]: {}", STANDARD.encode(message.serialize()));
}
