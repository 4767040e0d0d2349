mod server;

use std::fs;
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use composer_contracts::challenge::{build_prompt, clamp_intensity, parse_challenge, Challenge};
use composer_contracts::events::EventWriter;
use composer_contracts::models::ModelRegistry;
use composer_engine::{ChatTurn, ImageSource, Pipeline};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "composer-rs",
    version,
    about = "Photo-to-challenge pipeline for the couples game"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Describe an image and generate a challenge for it. Exits with 2 when
    /// the model output was unusable and a fallback challenge was printed.
    Run(RunArgs),
    /// Print the generation prompt for a scene without calling a model.
    Prompt(PromptArgs),
    /// Parse raw model output into a challenge. Exits with 2 on fallback.
    Parse(ParseArgs),
    /// Talk to the game master.
    Chat(ChatArgs),
    /// Title a photo mosaic.
    Title(TitleArgs),
    /// Serve the pipeline over HTTP.
    Serve(ServeArgs),
    /// List known models.
    Models,
}

#[derive(Debug, Args)]
struct ModelArgs {
    #[arg(long)]
    vision_model: Option<String>,
    #[arg(long)]
    text_model: Option<String>,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long)]
    image: String,
    #[arg(long, allow_negative_numbers = true)]
    intensity: i64,
    #[arg(long)]
    context: Option<String>,
    #[command(flatten)]
    models: ModelArgs,
}

#[derive(Debug, Parser)]
struct PromptArgs {
    #[arg(long)]
    scene: String,
    #[arg(long, allow_negative_numbers = true)]
    intensity: i64,
    #[arg(long)]
    context: Option<String>,
}

#[derive(Debug, Parser)]
struct ParseArgs {
    #[arg(long, allow_negative_numbers = true)]
    intensity: i64,
    /// Raw model output; read from stdin when omitted.
    #[arg(long)]
    input: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    context: Option<String>,
    #[arg(long)]
    system_prompt: Option<String>,
    #[command(flatten)]
    models: ModelArgs,
}

#[derive(Debug, Parser)]
struct TitleArgs {
    #[arg(long)]
    image: String,
    #[command(flatten)]
    models: ModelArgs,
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[arg(long, default_value_t = 8000)]
    port: u16,
    #[command(flatten)]
    models: ModelArgs,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("composer-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_challenge(args),
        Command::Prompt(args) => {
            println!("{}", build_prompt(&args.scene, args.intensity, args.context.as_deref()));
            Ok(0)
        }
        Command::Parse(args) => run_parse(args),
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Title(args) => {
            let pipeline = build_pipeline(&args.models)?;
            println!("{}", pipeline.title_mosaic(&args.image)?);
            Ok(0)
        }
        Command::Serve(args) => run_serve(args),
        Command::Models => {
            print_models(&ModelRegistry::new(None));
            Ok(0)
        }
    }
}

fn build_pipeline(args: &ModelArgs) -> Result<Pipeline> {
    let events = args.events.as_deref().map(open_events).transpose()?;
    let pipeline = Pipeline::new(
        args.vision_model.as_deref(),
        args.text_model.as_deref(),
        events,
    )?;
    if args.vision_model.is_some() {
        if let Some(reason) = pipeline.vision_fallback_reason() {
            eprintln!("Model fallback: {reason}");
        }
    }
    if args.text_model.is_some() {
        if let Some(reason) = pipeline.text_fallback_reason() {
            eprintln!("Model fallback: {reason}");
        }
    }
    info!(
        vision_model = %pipeline.vision_model().name,
        text_model = %pipeline.text_model().name,
        "pipeline ready"
    );
    Ok(pipeline)
}

fn open_events(path: &Path) -> Result<EventWriter> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(EventWriter::new(path, "composer"))
}

fn run_challenge(args: RunArgs) -> Result<i32> {
    let pipeline = build_pipeline(&args.models)?;
    let challenge = pipeline.run(&args.image, args.intensity, args.context.as_deref())?;
    print_challenge(&challenge)
}

fn run_parse(args: ParseArgs) -> Result<i32> {
    let raw = match &args.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            buffer
        }
    };
    let challenge = parse_challenge(&raw, clamp_intensity(args.intensity));
    print_challenge(&challenge)
}

const FALLBACK_EXIT_CODE: i32 = 2;

fn print_challenge(challenge: &Challenge) -> Result<i32> {
    println!("{}", serde_json::to_string_pretty(challenge)?);
    Ok(challenge_exit_code(challenge))
}

fn challenge_exit_code(challenge: &Challenge) -> i32 {
    if challenge.is_fallback() {
        FALLBACK_EXIT_CODE
    } else {
        0
    }
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let pipeline = build_pipeline(&args.models)?;
    let stdin = io::stdin();
    let mut line = String::new();
    let mut history: Vec<ChatTurn> = Vec::new();

    println!("Game master ready. /reset clears the conversation, /quit leaves.");

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

        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                history.clear();
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        history.push(ChatTurn {
            role: "user".to_string(),
            content: input.to_string(),
        });
        match pipeline.chat(
            &history,
            args.system_prompt.as_deref(),
            args.context.as_deref(),
        ) {
            Ok(reply) => {
                println!("{reply}");
                history.push(ChatTurn {
                    role: "assistant".to_string(),
                    content: reply,
                });
            }
            Err(err) => {
                history.pop();
                warn!(error = %format!("{err:#}"), "chat turn failed");
                println!("Chat failed: {err:#}");
            }
        }
    }
    Ok(())
}

fn run_serve(args: ServeArgs) -> Result<i32> {
    // The blocking HTTP client must be created and dropped outside the runtime.
    let pipeline =
        Arc::new(build_pipeline(&args.models)?.with_image_source(ImageSource::RemoteOnly));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let result = runtime.block_on(server::serve(Arc::clone(&pipeline), args.port));
    drop(runtime);
    drop(pipeline);
    result?;
    Ok(0)
}

fn print_models(registry: &ModelRegistry) {
    for line in model_lines(registry) {
        println!("{line}");
    }
}

fn model_lines(registry: &ModelRegistry) -> Vec<String> {
    registry
        .list()
        .map(|model| {
            let capabilities = model
                .capabilities
                .iter()
                .map(|capability| capability.as_str())
                .collect::<Vec<&str>>()
                .join(",");
            let window = model
                .context_window
                .map(|value| value.to_string())
                .unwrap_or_else(|| "-".to_string());
            format!(
                "{}\t{}\t{}\tctx={}",
                model.name, model.provider, capabilities, window
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_model_overrides_and_out_of_range_intensity() {
        let cli = Cli::try_parse_from([
            "composer-rs",
            "run",
            "--image",
            "photo.jpg",
            "--intensity",
            "-3",
            "--text-model",
            "dryrun-text-1",
        ]);
        let Ok(Cli {
            command: Command::Run(args),
        }) = cli
        else {
            panic!("run arguments should parse");
        };
        assert_eq!(args.intensity, -3);
        assert_eq!(args.models.text_model.as_deref(), Some("dryrun-text-1"));
        assert!(args.models.vision_model.is_none());
    }

    #[test]
    fn serve_defaults_to_port_8000() {
        let Ok(Cli {
            command: Command::Serve(args),
        }) = Cli::try_parse_from(["composer-rs", "serve"])
        else {
            panic!("serve should parse");
        };
        assert_eq!(args.port, 8000);
    }

    #[test]
    fn model_lines_show_capabilities_and_provider() {
        let lines = model_lines(&ModelRegistry::new(None));
        assert!(lines
            .iter()
            .any(|line| line == "dryrun-vision-1\tdryrun\tvision\tctx=-"));
        assert!(lines
            .iter()
            .any(|line| line == "dryrun-text-1\tdryrun\ttext\tctx=8192"));
    }

    #[test]
    fn events_directory_is_created() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logs").join("events.jsonl");
        let writer = open_events(&path)?;
        assert!(temp.path().join("logs").is_dir());
        assert_eq!(writer.path(), path.as_path());
        Ok(())
    }

    #[test]
    fn parse_exit_code_marks_fallbacks() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let clean = temp.path().join("clean.txt");
        fs::write(
            &clean,
            r#"```json
{"challenge_title":"Slow Dance","challenge_text":"Sway.","rationale":"Closeness.","duration_seconds":120,"intensity":2}
```"#,
        )?;
        let prose = temp.path().join("prose.txt");
        fs::write(&prose, "no json here")?;

        let code = run_parse(ParseArgs {
            intensity: 2,
            input: Some(clean),
        })?;
        assert_eq!(code, 0);
        let code = run_parse(ParseArgs {
            intensity: 12,
            input: Some(prose),
        })?;
        assert_eq!(code, FALLBACK_EXIT_CODE);
        Ok(())
    }

    #[test]
    fn parse_reports_missing_input_file() {
        let result = run_parse(ParseArgs {
            intensity: 3,
            input: Some(PathBuf::from("/definitely/not/here.txt")),
        });
        assert!(result.is_err());
    }
}
