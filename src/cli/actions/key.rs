use crate::{
    auth::{
        material::{generate_secret, hash_secret},
        CredentialUpdate, CredentialView, NewCredential,
    },
    cli::actions::db,
    store::CredentialStore,
};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCommand {
    Create {
        name: String,
        description: Option<String>,
        valid_until: Option<DateTime<Utc>>,
        enabled: bool,
    },
    List,
    Revoke {
        id: Uuid,
    },
    Delete {
        id: Uuid,
    },
}

#[derive(Debug)]
pub struct Args {
    pub dsn: String,
    pub command: KeyCommand,
}

/// Execute a `key` subcommand against the database.
/// # Errors
/// Returns an error if the database is unreachable or the input is invalid.
/// Also fails when the credential does not exist.
pub async fn execute(args: Args) -> Result<()> {
    let store = db::connect(&args.dsn).await?;
    let output = run(&store, args.command).await?;
    println!("{output}");
    Ok(())
}

/// Run a key command and render its output.
///
/// # Errors
/// Returns an error if the store fails, the input is invalid, or the credential is missing.
pub async fn run(store: &dyn CredentialStore, command: KeyCommand) -> Result<String> {
    match command {
        KeyCommand::Create {
            name,
            description,
            valid_until,
            enabled,
        } => {
            let request = NewCredential {
                name,
                description,
                enabled,
                valid_until,
            }
            .normalized(Utc::now())?;
            let secret = generate_secret()?;
            let hash = hash_secret(&secret)?;
            let record = request.into_record(hash, Utc::now())?;
            let credential = store.insert(record).await?;
            info!(credential_id = %credential.id, "credential created from cli");
            Ok(format!(
                "{}\n\nsecret: {}\nStore this secret now; it cannot be shown again.",
                render(&credential.view())?,
                secret.expose_secret()
            ))
        }
        KeyCommand::List => {
            let views: Vec<CredentialView> =
                store.list().await?.iter().map(|c| c.view()).collect();
            serde_json::to_string_pretty(&views).context("Failed to render credentials")
        }
        KeyCommand::Revoke { id } => {
            let update = CredentialUpdate {
                enabled: Some(false),
                ..CredentialUpdate::default()
            };
            let credential = store
                .update(id, &update)
                .await?
                .ok_or_else(|| anyhow!("credential {id} not found"))?;
            info!(credential_id = %id, "credential revoked from cli");
            render(&credential.view())
        }
        KeyCommand::Delete { id } => {
            if !store.delete(id).await? {
                bail!("credential {id} not found");
            }
            info!(credential_id = %id, "credential deleted from cli");
            Ok(format!("deleted {id}"))
        }
    }
}

fn render(view: &CredentialView) -> Result<String> {
    serde_json::to_string_pretty(view).context("Failed to render credential")
}
