#![deny(unsafe_code)]

//! Threadline CLI: sign in, browse contacts, and read or write a chat.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use threadline_config::AppConfig;
use threadline_core::{
    ApiClient, ChatId, ChatSession, ContactId, DisplayMeta, Identity, LoadOutcome, Message,
    MessageBody, MessageId, SendOutcome, SessionEvent, TargetIntent, WriteOutcome, build_info,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Threadline: a terminal client for the phone-number messenger.
#[derive(Parser)]
#[command(name = "threadline", version = build_info::VERSION, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "threadline.toml")]
    config: PathBuf,

    /// Act as this user id instead of the configured identity.
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in (or register) by phone number.
    Login {
        phone: String,
        name: String,

        /// Store the returned identity in the config file.
        #[arg(long)]
        save: bool,
    },

    /// List, add, or search contacts.
    Contacts {
        #[command(subcommand)]
        action: Option<ContactsAction>,
    },

    /// Print a chat's message history.
    History {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Send a message.
    Send {
        #[command(flatten)]
        target: TargetArgs,

        /// Message text.
        #[arg(required_unless_present_any = ["voice", "file"])]
        text: Option<String>,

        /// Send a voice note of this duration (e.g. 0:45).
        #[arg(long, conflicts_with_all = ["text", "file"])]
        voice: Option<String>,

        /// Send a file attachment with this name.
        #[arg(long, conflicts_with = "text")]
        file: Option<String>,

        /// File size in bytes.
        #[arg(long, requires = "file")]
        size: Option<u64>,

        /// Reply to this message id.
        #[arg(long)]
        reply_to: Option<String>,
    },

    /// Edit one of your messages.
    Edit {
        #[command(flatten)]
        target: TargetArgs,
        id: String,
        text: String,
    },

    /// Delete one of your messages.
    Delete {
        #[command(flatten)]
        target: TargetArgs,
        id: String,
    },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[derive(Subcommand)]
enum ContactsAction {
    /// List your contacts.
    List,
    /// Add a user to your contacts.
    Add { id: String },
    /// Search users by name or phone.
    Search { query: String },
}

/// Which chat to open.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct TargetArgs {
    /// An existing chat id.
    #[arg(long)]
    chat: Option<String>,

    /// A contact id; the chat is created on first send.
    #[arg(long)]
    contact: Option<String>,
}

impl TargetArgs {
    fn intent(&self) -> Result<TargetIntent> {
        match (&self.chat, &self.contact) {
            (Some(chat), _) => Ok(TargetIntent::Chat {
                chat_id: ChatId::from(chat.as_str()),
                meta: DisplayMeta::new(format!("chat {chat}")),
            }),
            (None, Some(contact)) => Ok(TargetIntent::Contact {
                contact_id: ContactId::from(contact.as_str()),
                meta: DisplayMeta::new(format!("contact {contact}")),
            }),
            (None, None) => bail!("pass --chat or --contact"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;

    // Set up tracing subscriber: -v wins over the configured level.
    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    info!(version = %build_info::version_string(), "Threadline starting");

    match cli.command {
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
        Commands::Login { phone, name, save } => {
            cmd_login(&cli.config, config, &phone, &name, save).await?
        }
        command => {
            let identity = match cli.user {
                Some(user_id) => Some(Identity::new(user_id)),
                None => Identity::from_config(&config.identity),
            };
            let session = open_session(&config, identity)?;
            run_chat_command(&session, command).await?;
        }
    }

    Ok(())
}

fn open_session(config: &AppConfig, identity: Option<Identity>) -> Result<ChatSession> {
    let client = ApiClient::from_config(&config.api).context("building HTTP client")?;
    let session = ChatSession::with_backend(Arc::new(client));
    session.set_identity(identity);
    Ok(session)
}

async fn run_chat_command(session: &ChatSession, command: Commands) -> Result<()> {
    match command {
        Commands::Contacts { action } => cmd_contacts(session, action).await,
        Commands::History { target } => {
            open_chat(session, &target).await?;
            for msg in session.messages() {
                println!("{}", render(&msg));
            }
            Ok(())
        }
        Commands::Send {
            target,
            text,
            voice,
            file,
            size,
            reply_to,
        } => {
            let mut notices = session.subscribe();
            open_chat(session, &target).await?;
            if let Some(id) = reply_to {
                session.reply_to(&MessageId::from(id))?;
            }
            let outcome = match (voice, file, text) {
                (Some(duration), _, _) => session.send_voice(Some(&duration)).await?,
                (None, Some(name), _) => session.send_file(&name, size).await?,
                (None, None, Some(text)) => session.send_message(&text).await?,
                (None, None, None) => SendOutcome::Ignored,
            };
            while let Ok(event) = notices.try_recv() {
                if let SessionEvent::Notice(notice) = event {
                    eprintln!("{notice}");
                }
            }
            match outcome {
                SendOutcome::Confirmed { id, .. } => println!("Sent message {id}."),
                SendOutcome::RolledBack { .. } => bail!("message was not sent"),
                SendOutcome::Discarded { .. } => println!("Chat changed before the send completed."),
                SendOutcome::Ignored => println!("Nothing to send."),
            }
            Ok(())
        }
        Commands::Edit { target, id, text } => {
            open_chat(session, &target).await?;
            let outcome = session.edit_message(&MessageId::from(id), &text).await?;
            report_write("Edited", outcome)
        }
        Commands::Delete { target, id } => {
            open_chat(session, &target).await?;
            let outcome = session.delete_message(&MessageId::from(id)).await?;
            report_write("Deleted", outcome)
        }
        Commands::Login { .. } | Commands::Config { .. } => Ok(()),
    }
}

/// Select the chat and load its history.
async fn open_chat(session: &ChatSession, target: &TargetArgs) -> Result<()> {
    if session.identity().is_none() {
        bail!("not signed in: run `threadline login` or pass --user");
    }
    session.select(target.intent()?);
    match session.load_messages().await? {
        LoadOutcome::Failed => bail!("could not load messages (see log for details)"),
        LoadOutcome::Applied { count } => info!(count, "Chat opened"),
        LoadOutcome::Skipped | LoadOutcome::Discarded => {}
    }
    Ok(())
}

fn report_write(verb: &str, outcome: WriteOutcome) -> Result<()> {
    match outcome {
        WriteOutcome::Applied => println!("{verb}."),
        WriteOutcome::Failed => bail!("the server rejected the change"),
        WriteOutcome::Ignored => println!("Nothing to change."),
    }
    Ok(())
}

async fn cmd_contacts(session: &ChatSession, action: Option<ContactsAction>) -> Result<()> {
    let contacts = match action.unwrap_or(ContactsAction::List) {
        ContactsAction::List => session.refresh_contacts().await?,
        ContactsAction::Add { id } => session.add_contact(&ContactId::from(id)).await?,
        ContactsAction::Search { query } => session.search_users(&query).await?,
    };
    if contacts.is_empty() {
        println!("No contacts.");
    }
    for contact in contacts {
        let status = if contact.is_online { "online" } else { "offline" };
        println!(
            "{:>6}  {:<24} {:<16} {status}",
            contact.id, contact.name, contact.phone
        );
    }
    Ok(())
}

async fn cmd_login(
    config_path: &Path,
    mut config: AppConfig,
    phone: &str,
    name: &str,
    save: bool,
) -> Result<()> {
    let client = ApiClient::from_config(&config.api).context("building HTTP client")?;
    let identity = client.login(phone, name).await?;
    println!("Signed in as user {}.", identity.user_id);

    if save {
        config.identity.user_id = Some(identity.user_id);
        config.identity.phone = identity.phone;
        config.identity.name = identity.name;
        let text =
            toml::to_string_pretty(&config).map_err(|e| anyhow::anyhow!("TOML error: {e}"))?;
        tokio::fs::write(config_path, text)
            .await
            .with_context(|| format!("writing {}", config_path.display()))?;
        println!("Saved identity to '{}'.", config_path.display());
    }
    Ok(())
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        let toml_str =
            toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("TOML error: {e}"))?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        AppConfig::load(path).await.map_err(|e| anyhow::anyhow!(e))
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        Ok(AppConfig::default())
    }
}

/// One line per message: `[14:05] Anna: text`.
fn render(msg: &Message) -> String {
    let sender = msg.sender_label("Them");
    let mut line = format!("[{}] #{} {sender}: ", msg.time, msg.id);
    if msg.is_forwarded {
        let from = msg.forwarded_from.as_deref().unwrap_or("unknown");
        line.push_str(&format!("(forwarded from {from}) "));
    }
    if let Some(ref reply) = msg.reply_to {
        let quoted = reply.text.as_deref().unwrap_or("…");
        line.push_str(&format!("(re #{}: {quoted}) ", reply.id));
    }
    match &msg.body {
        MessageBody::Text(text) => line.push_str(text),
        MessageBody::Voice { duration } => {
            line.push_str(&format!("[voice {}]", duration.as_deref().unwrap_or("?:??")))
        }
        MessageBody::File { name, size } => match size {
            Some(size) => line.push_str(&format!("[file {name}, {size} bytes]")),
            None => line.push_str(&format!("[file {name}]")),
        },
    }
    if msg.is_edited {
        line.push_str(" (edited)");
    }
    line
}
