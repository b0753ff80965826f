use chat_autotranslate::{
    AutoTranslate, CommonMarkRenderer, MemoryMessageStore, MemorySettings, Message, MockMode,
    MockProvider, Room, Services, StaticSubscriptions, Tokenizer, TranslationConfig,
    TranslationProvider, detokenize_with_report, escape_html,
};
use clap::{Arg, ArgAction, Command};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const MESSAGE_ID: &str = "cli-message";
const ROOM_ID: &str = "cli-room";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("autotranslate")
        .version("0.1.0")
        .about("Tokenize a chat message and run it through the auto-translate pipeline")
        .arg(
            Arg::new("message")
                .help("Message text (markdown)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("target-locale")
                .help("Target language code (e.g., fr, es, de)")
                .required(true)
                .index(2),
        )
        .arg(
            Arg::new("mention")
                .long("mention")
                .short('m')
                .help("Username mentioned in the message (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("channel")
                .long("channel")
                .short('c')
                .help("Channel referenced in the message (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("schemes")
                .long("schemes")
                .short('s')
                .help("Comma-separated link schemes (default: http,https)"),
        )
        .arg(
            Arg::new("tokens")
                .long("tokens")
                .short('t')
                .help("Print the token table")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Log every pipeline step")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let text = matches
        .get_one::<String>("message")
        .ok_or("missing message")?;
    let target_locale = matches
        .get_one::<String>("target-locale")
        .ok_or("missing target locale")?;
    let show_tokens = matches.get_flag("tokens");
    let verbose = matches.get_flag("verbose");

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // 1. Configuration: environment first, the CLI always runs the mock provider
    let mut config = TranslationConfig::from_env();
    config.enabled = true;
    config.provider = Some("mock".to_string());
    if let Some(schemes) = matches.get_one::<String>("schemes") {
        config.link_schemes = schemes.clone();
    }
    let settings = Arc::new(MemorySettings::new());
    config.apply(&settings);

    // 2. Save the message
    let mut message = Message::new(MESSAGE_ID, ROOM_ID, text.as_str()).with_author("cli-user");
    for name in matches.get_many::<String>("mention").into_iter().flatten() {
        message = message.with_mention(name.as_str());
    }
    for name in matches.get_many::<String>("channel").into_iter().flatten() {
        message = message.with_channel(name.as_str());
    }
    let store = Arc::new(MemoryMessageStore::new());
    store.insert(message.clone());

    let services = Services {
        settings: settings.clone(),
        renderer: Arc::new(CommonMarkRenderer::new()),
        subscriptions: Arc::new(StaticSubscriptions::new()),
        translations: store.clone(),
        messages: store.clone(),
    };

    // 3. Show what the provider will receive
    let tokenizer = Tokenizer::from_settings(settings.as_ref(), Arc::clone(&services.renderer))?;
    let mut preview = message.clone();
    preview.text = escape_html(&preview.text);
    let tokenized = tokenizer.tokenize(preview);

    println!("📝 Source:    \"{}\"", text);
    println!("🔒 Tokenized: \"{}\"", tokenized.text);
    if show_tokens {
        for token in &tokenized.tokens {
            match &token.render_override {
                Some(replacement) => println!(
                    "   {} → {:?} (restores {:?})",
                    token.marker, token.fragment, replacement
                ),
                None => println!("   {} → {:?}", token.marker, token.fragment),
            }
        }
    }

    // 4. Translate through the orchestrator
    let provider: Arc<dyn TranslationProvider> =
        Arc::new(MockProvider::new("mock", MockMode::Suffix));
    let service = AutoTranslate::start(services, vec![provider]);
    let orchestrator = service
        .orchestrator("mock")
        .ok_or("mock provider is not registered")?;
    let saved = orchestrator
        .handle_message_saved(message, &Room::new(ROOM_ID), Some(target_locale.as_str()))
        .await;
    saved.dispatch.join().await;
    service.shutdown();

    let Some(translated) = store.translation(MESSAGE_ID, target_locale) else {
        eprintln!("❌ No translation was stored for {}", target_locale);
        return Err("translation failed".into());
    };

    // 5. Restore protected fragments
    let report = detokenize_with_report(&translated, &tokenized.tokens);
    println!("🌍 Stored:    \"{}\"", translated);
    println!("✅ Restored:  \"{}\"", report.text);
    if !report.missing_markers.is_empty() {
        eprintln!(
            "⚠️  {} marker(s) missing from the translation",
            report.missing_markers.len()
        );
    }

    Ok(())
}
