//! audiobook - Narrate chapters of a plain-text book into an audio file

mod audio;
mod chapters;
mod config;
mod error;
mod pipeline;
mod text;
mod tts;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use speech_client::voices::{DEFAULT_VOICE, GEMINI_VOICES, find_voice};
use speech_client::{ProviderKind, ProviderSettings, SpeechError, SpeechProvider, get_provider, resolve_api_key};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use audio::Assembler;
use chapters::{ChapterLocator, ChapterSelection, LocatedChapter};
use config::AudiobookConfig;
use error::{EXIT_OTHER, PipelineError};
use pipeline::{BookRequest, Pipeline, PipelineSettings, Progress};
use tts::{NARRATOR_PROMPT, Narrator};

#[derive(Parser, Debug)]
#[command(name = "audiobook")]
#[command(about = "Narrate chapters of a plain-text book into an audiobook", long_about = None)]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Args {
    /// Path to the book (plain UTF-8 text)
    book: Option<PathBuf>,

    /// Chapters to narrate: "7", "1-3", "1,3,5" or "1,3-5,9"
    #[arg(short, long)]
    chapters: Option<String>,

    /// List detected chapters and exit
    #[arg(long)]
    list: bool,

    /// Write the selected chapters' text to a file ("-" for stdout) instead of narrating
    #[arg(long, value_name = "PATH", conflicts_with = "list")]
    extract_text: Option<PathBuf>,

    /// Narrator voice (see `audiobook voices`)
    #[arg(short, long)]
    voice: Option<String>,

    /// Output file: .mp3, .m4b, .m4a or .wav (default: <book>_audiobook.mp3)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TTS model
    #[arg(long)]
    model: Option<String>,

    /// Maximum characters per synthesis request
    #[arg(long)]
    max_chars: Option<usize>,

    /// Concurrent synthesis requests
    #[arg(long)]
    concurrency: Option<usize>,

    /// Book title for output metadata (default: file name)
    #[arg(long)]
    title: Option<String>,

    /// Book author for output metadata
    #[arg(long)]
    author: Option<String>,

    /// Do not send narration style instructions
    #[arg(long)]
    no_prompt: bool,

    /// Enable debug output
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available voices
    Voices,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Set default voice
    SetVoice { voice: String },
    /// Set default TTS model
    SetModel { model: String },
    /// Set maximum characters per request
    SetMaxChars { value: usize },
    /// Set number of concurrent requests
    SetConcurrency { value: usize },
    /// Set encoder bitrate, e.g. 128k
    SetBitrate { value: String },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    let code = match run(args).await {
        Ok(()) => 0,
        Err(e) => report(&e),
    };
    std::process::exit(code);
}

fn init_logging(debug: bool) {
    let default_filter = if debug {
        "audiobook=debug,speech_client=debug"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

/// Print the error and pick the process exit code.
fn report(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<PipelineError>() {
        Some(pipeline_err) => {
            if !matches!(pipeline_err, PipelineError::Cancelled) {
                eprintln!("Error: {}", pipeline_err);
            } else {
                eprintln!("Cancelled.");
            }
            pipeline_err.exit_code()
        }
        None => {
            eprintln!("Error: {:#}", err);
            EXIT_OTHER
        }
    }
}

async fn run(args: Args) -> Result<()> {
    match &args.command {
        Some(Commands::Voices) => {
            print_voices();
            return Ok(());
        }
        Some(Commands::Config { action }) => return handle_config_command(action),
        None => {}
    }

    let book_path = args.book.clone().ok_or_else(|| {
        PipelineError::Input("book path is required. Run 'audiobook --help' for usage.".to_string())
    })?;

    let config = AudiobookConfig::load().context("Failed to load configuration")?;
    let locator = config.locator().map_err(PipelineError::from)?;

    if args.list {
        return list_chapters(&book_path, &locator).await;
    }

    let selector = args.chapters.as_deref().ok_or_else(|| {
        PipelineError::Input("--chapters is required (e.g. --chapters 1-3)".to_string())
    })?;
    let selection = ChapterSelection::parse(selector).map_err(PipelineError::from)?;

    if let Some(dest) = &args.extract_text {
        return extract_chapters(&book_path, &locator, &selection, dest).await;
    }

    let concurrency = args.concurrency.unwrap_or(config.concurrency);
    if concurrency == 0 {
        return Err(PipelineError::Input("concurrency must be at least 1".to_string()).into());
    }

    // Credential problems stop the run before any work starts
    let api_key =
        resolve_api_key(config.api_key.as_deref(), ProviderKind::Gemini).map_err(PipelineError::Auth)?;
    let model = args.model.clone().unwrap_or_else(|| config.model.clone());
    let provider = get_provider(
        ProviderKind::Gemini,
        ProviderSettings {
            model: model.clone(),
            api_key,
            base_url: config.base_url.clone(),
            timeout: config.request_timeout(),
        },
    )
    .map_err(PipelineError::from)?;
    let provider: Arc<dyn SpeechProvider> = Arc::from(provider);

    let voice = args.voice.clone().unwrap_or_else(|| config.voice.clone());
    let style_prompt = (config.narrator_prompt && !args.no_prompt).then(|| NARRATOR_PROMPT.to_string());
    let narrator = Narrator::new(provider, &voice)
        .map_err(PipelineError::from)?
        .with_style_prompt(style_prompt)
        .with_temperature(Some(config.temperature))
        .with_retry(config.retry_policy());

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&book_path));

    let settings = PipelineSettings {
        max_chunk_chars: args.max_chars.unwrap_or(config.max_chunk_chars),
        concurrency,
        work_root: config.work_dir.clone(),
    };
    let assembler = Assembler::new(config.bitrate.clone())
        .with_ffmpeg(config.ffmpeg_path.clone())
        .with_ffprobe(config.ffprobe_path.clone());

    if args.debug {
        eprintln!("Book: {}", book_path.display());
        eprintln!("Output: {}", output.display());
        eprintln!("Chapters: {}", selection);
        eprintln!("Voice: {} ({})", narrator.voice(), narrator.provider_name());
        eprintln!("Model: {}", model);
        eprintln!("Max chars: {}", settings.max_chunk_chars);
        eprintln!("Concurrency: {}", settings.concurrency);
    }

    eprintln!(
        "Narrating chapters {} of {} with voice {}",
        selection,
        book_path.display(),
        narrator.voice()
    );

    let request = BookRequest {
        book_path,
        selection,
        output,
        title: args.title.clone(),
        author: args.author.clone(),
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling, cleaning up...");
            on_signal.cancel();
        }
    });

    let mut pipeline = Pipeline::new(narrator, locator, assembler, settings);
    let mut progress = CliProgress::default();
    let result = pipeline
        .run(&request, &cancel, |event| progress.update(event))
        .await;
    progress.finish();

    let output = result?;
    eprintln!(
        "Output: {} ({:.1} MB, {})",
        output.path.display(),
        output.size_mb(),
        output.duration_display()
    );

    Ok(())
}

/// `<book-stem>_audiobook.mp3` next to the book.
fn default_output_path(book_path: &Path) -> PathBuf {
    let stem = book_path.file_stem().unwrap_or_default();
    book_path.with_file_name(format!("{}_audiobook.mp3", stem.to_string_lossy()))
}

async fn list_chapters(book_path: &Path, locator: &ChapterLocator) -> Result<()> {
    let text = pipeline::read_book(book_path).await?;
    let index = locator.index(&text).map_err(PipelineError::from)?;

    println!("{} chapter(s) in {}:", index.entries().len(), book_path.display());
    for entry in index.entries() {
        let chars = text[entry.start..entry.end].chars().count();
        println!("  {:>4}  {}  ({} chars)", entry.number, entry.title, chars);
        println!("        {}", entry.preview(&text, 60));
    }
    Ok(())
}

/// Selected chapter texts in selection order, separated by blank lines.
fn extracted_text(chapters: &[LocatedChapter]) -> String {
    chapters
        .iter()
        .map(|chapter| chapter.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

async fn extract_chapters(
    book_path: &Path,
    locator: &ChapterLocator,
    selection: &ChapterSelection,
    dest: &Path,
) -> Result<()> {
    let text = pipeline::read_book(book_path).await?;
    let chapters = locator.locate(&text, selection).map_err(PipelineError::from)?;
    let extracted = extracted_text(&chapters);

    if dest == Path::new("-") {
        println!("{}", extracted);
        return Ok(());
    }

    std::fs::write(dest, format!("{}\n", extracted))
        .with_context(|| format!("Failed to write {}", dest.display()))?;
    eprintln!(
        "Saved chapters {} ({} chars) to {}",
        selection,
        extracted.chars().count(),
        dest.display()
    );
    Ok(())
}

fn print_voices() {
    println!("Available voices (default: {}):", DEFAULT_VOICE);
    for voice in GEMINI_VOICES {
        println!("  {}", voice);
    }
}

/// Terminal progress: plain lines for steps, a bar for synthesis.
#[derive(Default)]
struct CliProgress {
    bar: Option<ProgressBar>,
}

impl CliProgress {
    fn update(&mut self, event: Progress) {
        match event {
            Progress::Located { chapters } => eprintln!("Located {} chapter(s)", chapters),
            Progress::Chunked { chunks } => {
                eprintln!("Split into {} chunk(s)", chunks);
                let bar = ProgressBar::new(chunks as u64);
                bar.set_style(bar_style());
                self.bar = Some(bar);
            }
            Progress::Synthesized { completed, .. } => {
                if let Some(bar) = &self.bar {
                    bar.set_position(completed as u64);
                }
            }
            Progress::Assembling => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_with_message("synthesis complete");
                }
                eprintln!("Assembling audiobook...");
            }
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.abandon();
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn handle_config_command(action: &ConfigAction) -> Result<()> {
    let mut config = AudiobookConfig::load()?;
    match action {
        ConfigAction::Show => {
            println!("Configuration file: {:?}", AudiobookConfig::config_path()?);
            println!();
            print!("{}", config.display_toml()?);
        }
        ConfigAction::SetVoice { voice } => {
            let canonical = find_voice(GEMINI_VOICES, voice).ok_or_else(|| {
                PipelineError::Auth(SpeechError::InvalidVoice {
                    voice: voice.clone(),
                    provider: ProviderKind::Gemini.display_name().to_string(),
                })
            })?;
            config.voice = canonical.to_string();
            config.save()?;
            println!("Default voice set to: {}", canonical);
        }
        ConfigAction::SetModel { model } => {
            config.model = model.trim().to_string();
            config.save()?;
            println!("Default model set to: {}", config.model);
        }
        ConfigAction::SetMaxChars { value } => {
            if *value == 0 {
                return Err(PipelineError::Input("max chars must be at least 1".to_string()).into());
            }
            config.max_chunk_chars = *value;
            config.save()?;
            println!("Maximum chunk size set to: {} chars", value);
        }
        ConfigAction::SetConcurrency { value } => {
            if *value == 0 {
                return Err(PipelineError::Input("concurrency must be at least 1".to_string()).into());
            }
            config.concurrency = *value;
            config.save()?;
            println!("Concurrency set to: {}", value);
        }
        ConfigAction::SetBitrate { value } => {
            config.bitrate = value.trim().to_string();
            config.save()?;
            println!("Bitrate set to: {}", config.bitrate);
        }
    }
    Ok(())
}
