//! Command-line interface parsing and the interactive chat loop
//!
//! This is deliberately a thin collaborator around the session engine: it
//! reads lines, forwards sends, and prints what the timeline already
//! contains. All protocol behavior lives under [`crate::core`].

use std::error::Error;
use std::io::Write as _;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::api;
use crate::auth::{is_token_expired, token_payload, TokenStore};
use crate::core::character::{find_character, ActiveCharacter, CHARACTERS};
use crate::core::chat_stream::{ChatStreamService, ChatStreamUpdate, StreamParams};
use crate::core::config::Config;
use crate::core::events::SiblingEvent;
use crate::core::session::ChatSession;
use crate::core::sibling::{SiblingChannel, SiblingChannelConfig};

#[derive(Parser)]
#[command(name = "duet")]
#[command(about = "A terminal chat client for streamed conversations with virtual companions")]
#[command(
    long_about = "Duet is a terminal chat client for a companion backend that streams replies \
as typed events and carries a second, long-lived channel where the other \
companion occasionally chimes in.\n\n\
Authentication:\n\
  Use 'duet auth' to store your API token securely in the system keyring.\n\n\
Commands inside the chat:\n\
  /switch <id>      Talk to the other companion (clears the timeline)\n\
  /image <path> <text>  Send a message with an image attachment\n\
  /status           Show the companion's last structured state\n\
  /clear            Clear the timeline\n\
  /quit             Exit"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Backend base URL (overrides config)
    #[arg(short = 'u', long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Companion to talk to at startup
    #[arg(short = 'c', long, value_name = "CHARACTER")]
    pub character: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store an API token in the system keyring
    Auth,
    /// Remove the stored API token
    Deauth,
    /// List the available companions
    Characters,
}

pub async fn run() -> Result<(), Box<dyn Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("duet=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::load()?;
    let store = TokenStore::new();

    match args.command {
        Some(Commands::Auth) => auth_command(&store),
        Some(Commands::Deauth) => {
            store.clear_token()?;
            println!("Token removed.");
            Ok(())
        }
        Some(Commands::Characters) => {
            list_characters();
            Ok(())
        }
        None => chat_loop(args, config, store).await,
    }
}

fn auth_command(store: &TokenStore) -> Result<(), Box<dyn Error>> {
    print!("Paste your API token: ");
    std::io::stdout().flush()?;
    let mut token = String::new();
    std::io::stdin().read_line(&mut token)?;
    let token = token.trim();
    if token.is_empty() {
        return Err("no token entered".into());
    }
    if is_token_expired(token) {
        eprintln!("Warning: this token looks expired or unreadable; storing it anyway.");
    }
    store.store_token(token)?;
    match token_payload(token) {
        Some(payload) if !payload.name.is_empty() => {
            println!("Token stored. Welcome back, {}.", payload.name)
        }
        _ => println!("Token stored."),
    }
    Ok(())
}

fn list_characters() {
    for profile in &CHARACTERS {
        println!(
            "{}  {:8} {} ({})",
            profile.emoji, profile.id, profile.name, profile.nickname
        );
    }
}

fn resolve_token(store: &TokenStore, config: &Config) -> Result<String, Box<dyn Error>> {
    if let Some(token) = store.get_token()? {
        return Ok(token);
    }
    if let Some(token) = config.token.clone() {
        return Ok(token);
    }
    Err("no API token found; run `duet auth` first".into())
}

async fn chat_loop(args: Args, config: Config, store: TokenStore) -> Result<(), Box<dyn Error>> {
    let base_url = args
        .base_url
        .unwrap_or_else(|| config.base_url().to_string());
    let character_id = args
        .character
        .unwrap_or_else(|| config.default_character().to_string());
    let profile = find_character(&character_id)
        .ok_or_else(|| format!("unknown character '{character_id}'; try `duet characters`"))?;

    let token = resolve_token(&store, &config)?;
    let client = reqwest::Client::new();

    // Probe the token before opening any streams; a 401 here means
    // re-authentication, not retry.
    match api::fetch_status(&client, &base_url, &token, &character_id).await {
        Ok(state) => {
            if let Some(emotion) = &state.emotion {
                println!("{} {} is here ({emotion}).", profile.emoji, profile.nickname);
            } else {
                println!("{} {} is here.", profile.emoji, profile.nickname);
            }
        }
        Err(err) if api::is_unauthorized(err.as_ref()) => {
            store.clear_token()?;
            return Err("authentication failed; run `duet auth` again".into());
        }
        Err(err) => {
            // Status is decoration; chat may still work.
            tracing::warn!("status fetch failed: {err}");
        }
    }

    let mut session = ChatSession::new(character_id.clone());
    session
        .load_history(&client, &base_url, &token, config.history_limit())
        .await;
    for msg in &session.messages {
        render_timeline_message(profile.nickname, msg);
    }

    let active = ActiveCharacter::new(character_id);
    let (sibling, mut sibling_rx) = SiblingChannel::spawn(SiblingChannelConfig::new(
        client.clone(),
        base_url.clone(),
        Some(token.clone()),
        active.clone(),
    ));

    let (service, mut chat_rx) = ChatStreamService::new();
    let mut cancel_token = CancellationToken::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt()?;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let input = line.trim().to_string();
                match handle_line(
                    &input,
                    &mut session,
                    &service,
                    &client,
                    &base_url,
                    &token,
                    &config,
                    &active,
                    &mut cancel_token,
                ).await? {
                    LineOutcome::Continue => prompt()?,
                    LineOutcome::Sent => {}
                    LineOutcome::Quit => break,
                }
            }
            Some((update, stream_id)) = chat_rx.recv() => {
                let closed = matches!(update, ChatStreamUpdate::Closed);
                render_stream_update(&update, &session, stream_id);
                session.apply_update(update, stream_id);
                if closed && session.is_current_stream(stream_id) {
                    render_reply(&session);
                    prompt()?;
                }
            }
            Some(event) = sibling_rx.recv() => {
                render_sibling_event(&event);
                session.push_sibling(event);
            }
        }
    }

    cancel_token.cancel();
    sibling.shutdown();
    Ok(())
}

enum LineOutcome {
    Continue,
    Sent,
    Quit,
}

#[allow(clippy::too_many_arguments)]
async fn handle_line(
    input: &str,
    session: &mut ChatSession,
    service: &ChatStreamService,
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    config: &Config,
    active: &ActiveCharacter,
    cancel_token: &mut CancellationToken,
) -> Result<LineOutcome, Box<dyn Error>> {
    if input.is_empty() {
        return Ok(LineOutcome::Continue);
    }

    if let Some(rest) = input.strip_prefix('/') {
        let mut parts = rest.splitn(2, ' ');
        let command = parts.next().unwrap_or_default();
        let argument = parts.next().unwrap_or_default().trim();

        match command {
            "quit" | "exit" => return Ok(LineOutcome::Quit),
            "clear" => {
                session.clear_messages();
                println!("(timeline cleared)");
            }
            "characters" => list_characters(),
            "status" => render_status(session),
            "switch" => {
                let Some(profile) = find_character(argument) else {
                    println!("unknown character '{argument}'; try /characters");
                    return Ok(LineOutcome::Continue);
                };
                // Explicitly discard the in-flight stream rather than
                // relying on the stale-id guard alone.
                cancel_token.cancel();
                *cancel_token = CancellationToken::new();
                session.switch_character(profile.id);
                active.set(profile.id);
                session
                    .load_history(client, base_url, token, config.history_limit())
                    .await;
                println!("{} now talking to {}.", profile.emoji, profile.nickname);
                for msg in &session.messages {
                    render_timeline_message(profile.nickname, msg);
                }
            }
            "image" => {
                let mut image_parts = argument.splitn(2, ' ');
                let path = image_parts.next().unwrap_or_default();
                let text = image_parts.next().unwrap_or("").trim();
                if path.is_empty() {
                    println!("usage: /image <path> [message]");
                    return Ok(LineOutcome::Continue);
                }
                let bytes = match std::fs::read(path) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        println!("could not read {path}: {err}");
                        return Ok(LineOutcome::Continue);
                    }
                };
                let image_base64 = BASE64_STANDARD.encode(bytes);
                return send_message(session, service, client, base_url, token, cancel_token, text, Some(image_base64));
            }
            other => println!("unknown command /{other}"),
        }
        return Ok(LineOutcome::Continue);
    }

    send_message(session, service, client, base_url, token, cancel_token, input, None)
}

#[allow(clippy::too_many_arguments)]
fn send_message(
    session: &mut ChatSession,
    service: &ChatStreamService,
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    cancel_token: &mut CancellationToken,
    text: &str,
    image_base64: Option<String>,
) -> Result<LineOutcome, Box<dyn Error>> {
    let Some(stream_id) = session.begin_send(text, image_base64.as_deref()) else {
        println!("(still waiting for the previous reply)");
        return Ok(LineOutcome::Continue);
    };
    *cancel_token = CancellationToken::new();
    service.spawn_stream(StreamParams {
        client: client.clone(),
        base_url: base_url.to_string(),
        token: token.to_string(),
        character_id: session.character_id().to_string(),
        message: text.to_string(),
        image_base64,
        cancel_token: cancel_token.clone(),
        stream_id,
    });
    Ok(LineOutcome::Sent)
}

fn prompt() -> Result<(), Box<dyn Error>> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}

fn render_timeline_message(nickname: &str, msg: &crate::core::message::Message) {
    let speaker = match msg.role {
        crate::core::message::Role::User => "you",
        crate::core::message::Role::Assistant => nickname,
        crate::core::message::Role::Sibling => msg.sibling_name.as_deref().unwrap_or("sibling"),
    };
    println!("{speaker}: {}", msg.content);
}

fn render_stream_update(update: &ChatStreamUpdate, session: &ChatSession, stream_id: u64) {
    if !session.is_current_stream(stream_id) {
        return;
    }
    match update {
        ChatStreamUpdate::Event(crate::core::events::StreamEvent::ToolUse { name, .. }) => {
            println!("  [{name} running...]");
        }
        ChatStreamUpdate::Event(crate::core::events::StreamEvent::ToolResult { name, .. }) => {
            println!("  [{name} done]");
        }
        _ => {}
    }
}

fn render_reply(session: &ChatSession) {
    let Some(msg) = session.messages.iter().rev().find(|m| m.is_assistant()) else {
        return;
    };
    let nickname = find_character(session.character_id())
        .map(|p| p.nickname)
        .unwrap_or("companion");
    match &msg.emotion {
        Some(emotion) => println!("{nickname} ({emotion}): {}", msg.content),
        None => println!("{nickname}: {}", msg.content),
    }
}

fn render_sibling_event(event: &SiblingEvent) {
    if let SiblingEvent::SiblingSpeak {
        content,
        speaker_name,
        ..
    } = event
    {
        let name = speaker_name.as_deref().unwrap_or("sibling");
        println!("\n({name}, from the other room): {content}");
    }
}

fn render_status(session: &ChatSession) {
    let Some(state) = &session.character_state else {
        println!("(no structured state received yet)");
        return;
    };
    let emotion = state.emotion.as_deref().unwrap_or("unknown");
    let activity = state.activity.current.as_deref().unwrap_or("nothing much");
    let location = state.activity.location.as_deref().unwrap_or("somewhere");
    println!(
        "{}: feeling {emotion}, {activity} at {location}; satiety {:.0}, fitness {:.0}{}",
        state.character.name,
        state.hunger,
        state.fitness,
        if state.sleep.is_sleeping {
            " (asleep)"
        } else {
            ""
        }
    );
}
