//! `hereandalways vault` subcommands

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context};
use hereandalways_core::{
    AppConfig, LifecycleState, NewSecret, RevealSession, SecretEdit, SecretError,
    SecretOrchestrator, ViewScope, MASK,
};
use hereandalways_storage::{HttpCredentialApi, SupabaseStorage};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::VaultAction;

/// Build the orchestrator from configured endpoints.
pub(crate) fn connect(
    config: &AppConfig,
    token: Option<SecretString>,
) -> anyhow::Result<SecretOrchestrator> {
    let (Some(storage_url), Some(storage_key)) = (&config.storage_url, &config.storage_key) else {
        bail!("object storage is not configured; set SUPABASE_URL and SUPABASE_KEY");
    };
    let store = Arc::new(SupabaseStorage::new(
        storage_url,
        &config.storage_bucket,
        storage_key.clone(),
    ));
    let api = Arc::new(HttpCredentialApi::new(&config.api_url, token));
    Ok(SecretOrchestrator::from_config(config, store, api))
}

pub(crate) async fn run(
    config: &AppConfig,
    token: Option<SecretString>,
    action: VaultAction,
) -> anyhow::Result<()> {
    let owner_id = config.require_owner()?;
    let orchestrator = Arc::new(connect(config, token)?);

    // Ctrl-C closes the view; in-flight reveals are abandoned
    let scope = ViewScope::new();
    let closer = scope.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            closer.close();
        }
    });

    match action {
        VaultAction::Add {
            title,
            username,
            category,
            notes,
            trustees,
        } => {
            let secret = read_secret("Password or PIN: ")?;
            let new = NewSecret {
                title,
                username_or_card_number: username,
                secret,
                category,
                notes,
                trustee_ids: trustees,
            };
            let created = scope
                .settle(orchestrator.create_secret(owner_id, new, progress))
                .await;
            match created {
                Some(record) => {
                    let record = record?;
                    println!("✅ Stored '{}' ({})", record.title, record.id);
                }
                None => println!("Cancelled."),
            }
        }

        VaultAction::List { category } => {
            let records = orchestrator.list_secrets(owner_id, category).await?;
            if records.is_empty() {
                println!("No credentials stored.");
            }
            for record in records {
                let created = record
                    .created_at
                    .map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                println!(
                    "{}  {:<24} {:<14} {:<28} {}  {}",
                    record.id,
                    record.title,
                    record.category.label(),
                    record.username_or_card_number,
                    MASK,
                    created
                );
            }
        }

        VaultAction::Reveal { id, share } => {
            let record = orchestrator.get_secret(owner_id, id).await?;
            let mut session = RevealSession::open(orchestrator.clone(), record, scope.clone());

            let secret = session.reveal().await?;
            println!("{}", secret.expose_secret());

            if share {
                let link = orchestrator.share_link(session.record()).await?;
                println!("🔗 {}", link);
            }
            session.close();
        }

        VaultAction::Edit {
            id,
            title,
            username,
            category,
            notes,
            trustees,
            rotate,
        } => {
            let record = orchestrator.get_secret(owner_id, id).await?;
            let mut edit = SecretEdit::from_record(&record);
            if let Some(title) = title {
                edit.title = title;
            }
            if let Some(username) = username {
                edit.username_or_card_number = username;
            }
            if let Some(category) = category {
                edit.category = category;
            }
            if notes.is_some() {
                edit.notes = notes;
            }
            if !trustees.is_empty() {
                edit.trustee_ids = trustees;
            }
            if rotate {
                edit.new_secret = Some(read_secret("New password or PIN: ")?);
            }

            let updated = scope
                .settle(orchestrator.update_secret(owner_id, id, edit, progress))
                .await;
            match updated {
                Some(record) => {
                    let record = record?;
                    println!("✅ Updated '{}'", record.title);
                }
                None => println!("Cancelled."),
            }
        }

        VaultAction::Delete { id } => match orchestrator.delete_secret(owner_id, id).await {
            Ok(()) => println!("🗑️  Deleted {}", id),
            Err(SecretError::CleanupFailure { location, reason }) => {
                tracing::warn!(location = %location, reason = %reason, "Ciphertext left in storage");
                println!("🗑️  Deleted {} (ciphertext {} could not be removed)", id, location);
            }
            Err(e) => return Err(e.into()),
        },
    }

    Ok(())
}

fn progress(state: LifecycleState) {
    match state {
        LifecycleState::Encrypting => eprintln!("🔐 Encrypting..."),
        LifecycleState::Uploading => eprintln!("☁️  Uploading ciphertext..."),
        _ => {}
    }
}

/// Read one line from stdin as a secret.
pub(crate) fn read_secret(prompt: &str) -> anyhow::Result<SecretString> {
    eprint!("{}", prompt);
    std::io::stderr().flush().ok();

    let mut line = Zeroizing::new(String::new());
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading secret from stdin")?;
    let secret = line.trim_end_matches(['\r', '\n']).to_string();
    if secret.is_empty() {
        bail!("no secret given on stdin");
    }
    Ok(SecretString::new(secret))
}
