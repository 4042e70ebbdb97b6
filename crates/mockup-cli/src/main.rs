use std::env;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use mockup_contracts::chat::{parse_intent, CHAT_HELP_COMMANDS};
use mockup_contracts::events::EventLog;
use mockup_contracts::settings::{CredentialStore, JsonFileStorage};
use mockup_engine::{
    export_mockup, spawn_generate, ExportContext, ExportedMockup, GeminiClient, GeminiConfig,
    ImageFile, MockupEngine, SessionInputs, SessionSnapshot, SessionState,
};
use serde_json::{json, Value};
use uuid::Uuid;

const DEFAULT_SETTINGS_PATH: &str = ".mockup/settings.json";
const CREDENTIAL_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY"];

#[derive(Debug, Parser)]
#[command(name = "mockup-rs", version, about = "Sticker mockup generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate one mockup and export it.
    Generate(GenerateArgs),
    /// Manage the saved Gemini API key.
    Key(KeyArgs),
    Chat(ChatArgs),
}

#[derive(Debug, Args)]
struct EngineArgs {
    #[arg(long)]
    settings: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    media_type: Option<String>,
    #[arg(long, default_value = ".")]
    out: PathBuf,
    /// Print the mockup as a data: URL instead of writing files.
    #[arg(long)]
    data_url: bool,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Parser)]
struct KeyArgs {
    #[command(subcommand)]
    action: KeyCommand,
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum KeyCommand {
    Set { value: String },
    Show,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long, default_value = ".")]
    out: PathBuf,
    #[command(flatten)]
    engine: EngineArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("mockup-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Key(args) => run_key(args),
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
    }
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let (engine, config) = build_engine(&args.engine)?;
    let mut image = ImageFile::new(&args.image);
    if let Some(media_type) = args.media_type.as_deref() {
        image = image.with_media_type(media_type);
    }

    engine.generate(&args.prompt, Some(&image));
    let (snapshot, inputs) = engine.current();
    match &snapshot.state {
        SessionState::Success(generated) if args.data_url => {
            println!("{}", generated.data_url());
            Ok(0)
        }
        SessionState::Success(_) => {
            let exported = save_mockup(&snapshot, inputs.as_ref(), &args.out, &config.model)?;
            println!("Mockup saved to {}", exported.image_path.display());
            println!("Receipt: {}", exported.receipt_path.display());
            Ok(0)
        }
        SessionState::Error(failure) => {
            eprintln!("Generation failed ({}): {}", failure.kind, failure.message);
            Ok(1)
        }
        other => bail!("generation ended in unexpected state: {}", other.name()),
    }
}

fn run_key(args: KeyArgs) -> Result<i32> {
    let path = settings_path(args.settings.as_deref());
    let (mut store, warning) = CredentialStore::load(JsonFileStorage::new(&path));
    if let Some(warning) = warning {
        eprintln!("{warning}");
    }
    match args.action {
        KeyCommand::Set { value } => {
            if value.trim().is_empty() {
                bail!("API key is empty");
            }
            if let Some(warning) = store.set(value) {
                eprintln!("{warning}");
                return Ok(1);
            }
            let fingerprint = store
                .get()
                .map(|credential| credential.fingerprint())
                .unwrap_or_default();
            println!("API key saved to {} ({fingerprint})", path.display());
        }
        KeyCommand::Show => match store.get() {
            Some(credential) => println!("Saved API key: {}", credential.fingerprint()),
            None => match env_credential() {
                Some((name, _)) => println!("No saved API key; {name} is set"),
                None => println!("No API key configured"),
            },
        },
    }
    Ok(0)
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let (engine, config) = build_engine(&args.engine)?;
    let engine = Arc::new(engine);
    let updates = engine.subscribe();
    thread::spawn(move || {
        for snapshot in updates {
            println!("{}", snapshot_line(&snapshot));
        }
    });

    let stdin = io::stdin();
    let mut line = String::new();
    let mut sticker: Option<ImageFile> = None;
    let mut prompt: Option<String> = None;
    let mut pending: Vec<JoinHandle<SessionSnapshot>> = Vec::new();

    println!("Sticker mockup chat started. Type /help for commands.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        let intent = parse_intent(input);
        match intent.action.as_str() {
            "noop" => continue,
            "help" => {
                println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
            }
            "set_sticker" => {
                let Some(path) = intent.arg_str("path") else {
                    println!("/sticker requires a path");
                    continue;
                };
                match load_sticker(Path::new(path)) {
                    Ok((file, media_type)) => {
                        println!("Sticker set to {} ({media_type})", file.path().display());
                        sticker = Some(file);
                    }
                    Err(message) => println!("{message}"),
                }
            }
            "remove_sticker" => {
                sticker = None;
                engine.reset();
                println!("Sticker removed");
            }
            "set_prompt" => match intent.arg_str("prompt") {
                Some(text) => {
                    prompt = Some(text.to_string());
                    println!("Prompt set");
                }
                None => println!("/prompt requires text"),
            },
            "set_key" => {
                let Some(key) = intent.arg_str("key") else {
                    println!("/key requires a value");
                    continue;
                };
                match engine.set_credential(key) {
                    Some(warning) => println!("{warning}"),
                    None => println!("API key saved"),
                }
            }
            "generate" => {
                if let Some(text) = intent.prompt.clone() {
                    prompt = Some(text);
                }
                let text = prompt.clone().unwrap_or_default();
                pending.retain(|handle| !handle.is_finished());
                pending.push(spawn_generate(&engine, text, sticker.clone()));
            }
            "save" => {
                let (snapshot, inputs) = engine.current();
                let target = intent
                    .arg_str("path")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| args.out.clone());
                match save_mockup(&snapshot, inputs.as_ref(), &target, &config.model) {
                    Ok(exported) => println!("Mockup saved to {}", exported.image_path.display()),
                    Err(err) => println!("Save failed: {err:#}"),
                }
            }
            "status" => {
                let value = status_value(
                    &engine.snapshot(),
                    sticker.as_ref(),
                    prompt.as_deref(),
                    engine
                        .credential()
                        .map(|credential| (credential.fingerprint(), credential.is_persisted())),
                    &config.model,
                );
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            "quit" => break,
            _ => {
                let command = intent.arg_str("command").unwrap_or_default();
                println!("Unknown command: /{command}. Type /help for commands.");
            }
        }
    }

    for handle in pending {
        let _ = handle.join();
    }
    Ok(())
}

fn build_engine(args: &EngineArgs) -> Result<(MockupEngine<GeminiClient>, GeminiConfig)> {
    let mut config = GeminiConfig::from_env();
    if let Some(model) = args.model.as_deref() {
        config = config.with_model(model);
    }

    let path = settings_path(args.settings.as_deref());
    let (mut store, warning) = CredentialStore::load(JsonFileStorage::new(&path));
    if let Some(warning) = warning {
        eprintln!("{warning}");
    }
    if store.get().is_none() {
        if let Some((_, key_value)) = env_credential() {
            store.adopt_transient(key_value);
        }
    }

    let mut engine = MockupEngine::new(GeminiClient::new(config.clone()), store);
    if let Some(events_path) = args.events.as_ref() {
        engine = engine.with_events(EventLog::new(events_path, Uuid::new_v4().to_string()));
    }
    Ok((engine, config))
}

fn load_sticker(path: &Path) -> std::result::Result<(ImageFile, String), String> {
    if !path.is_file() {
        return Err(format!("Sticker not found: {}", path.display()));
    }
    let file = ImageFile::new(path);
    match file.detect_media_type() {
        Ok(Some(media_type)) => Ok((file, media_type)),
        Ok(None) => Err(format!("{} is not an image", path.display())),
        Err(err) => Err(format!("Sticker unreadable: {}: {err}", path.display())),
    }
}

// The receipt names the prompt and sticker of the session being saved, not
// whatever the chat holds now.
fn save_mockup(
    snapshot: &SessionSnapshot,
    inputs: Option<&SessionInputs>,
    target: &Path,
    model: &str,
) -> Result<ExportedMockup> {
    let SessionState::Success(generated) = &snapshot.state else {
        bail!("nothing to save yet ({})", snapshot.state.name());
    };
    export_mockup(
        generated,
        target,
        &ExportContext {
            sequence: snapshot.sequence,
            model,
            prompt: inputs.map(|inputs| inputs.prompt.as_str()).unwrap_or_default(),
            input: inputs.map(|inputs| &inputs.image),
        },
    )
}

fn settings_path(explicit: Option<&Path>) -> PathBuf {
    resolve_settings_path(explicit, env::var("MOCKUP_SETTINGS_PATH").ok())
}

fn resolve_settings_path(explicit: Option<&Path>, from_env: Option<String>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    from_env
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH))
}

fn env_credential() -> Option<(&'static str, String)> {
    first_non_empty(
        CREDENTIAL_ENV_VARS
            .iter()
            .map(|name| (*name, env::var(name).ok())),
    )
}

fn first_non_empty<'a>(
    candidates: impl IntoIterator<Item = (&'a str, Option<String>)>,
) -> Option<(&'a str, String)> {
    candidates.into_iter().find_map(|(name, value)| {
        value
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(|value| (name, value))
    })
}

fn snapshot_line(snapshot: &SessionSnapshot) -> String {
    let sequence = snapshot.sequence;
    match &snapshot.state {
        SessionState::Idle => format!("[#{sequence}] ready"),
        SessionState::Encoding => format!("[#{sequence}] reading sticker..."),
        SessionState::Requesting => format!("[#{sequence}] generating mockup..."),
        SessionState::Success(image) => format!(
            "[#{sequence}] mockup ready ({}). Use /save to export it.",
            image.media_type
        ),
        SessionState::Error(failure) => {
            format!("[#{sequence}] {}: {}", failure.kind, failure.message)
        }
    }
}

fn status_value(
    snapshot: &SessionSnapshot,
    sticker: Option<&ImageFile>,
    prompt: Option<&str>,
    credential: Option<(String, bool)>,
    model: &str,
) -> Value {
    let error = match &snapshot.state {
        SessionState::Error(failure) => json!(failure),
        _ => Value::Null,
    };
    let sticker = match sticker {
        Some(file) => json!({
            "path": file.path().to_string_lossy(),
            "media_type": file.declared_media_type(),
        }),
        None => Value::Null,
    };
    let credential = match credential {
        Some((fingerprint, persisted)) => json!({
            "fingerprint": fingerprint,
            "persisted": persisted,
        }),
        None => Value::Null,
    };
    json!({
        "sequence": snapshot.sequence,
        "state": snapshot.state.name(),
        "error": error,
        "sticker": sticker,
        "prompt": prompt,
        "credential": credential,
        "model": model,
    })
}
