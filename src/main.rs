//! reality CLI: compile edit intents into program graphs and execute them.

use anyhow::Context;
use clap::{Parser, Subcommand};
use reality_adapters::{FalSegmenter, GeminiClient, HttpImageEncoder};
use reality_core::{Geometry, OpStatus, Program};
use reality_engine::demo::demo_program;
use reality_engine::{
    AuditLog, AuditSink, Capabilities, Executor, GraphStore, HandlerRegistry, HttpAuditSink,
    JsonlAuditSink, LocalProgramStore, RealityConfig, RealityRuntime,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "reality",
    version = env!("CARGO_PKG_VERSION"),
    about = "Reality: compile edit intents into executable program graphs"
)]
struct Cli {
    /// Config file
    #[arg(long, global = true, default_value = "reality.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an intent against an image, apply it, and execute the schedule
    Intent {
        /// Source image URL or path
        #[arg(long)]
        image: String,
        /// What to do, in plain words
        #[arg(long)]
        intent: String,
        /// Save the resulting program to the configured programs directory
        #[arg(long)]
        save: bool,
    },
    /// Execute a saved program and write it back
    Run {
        #[arg(long)]
        program: PathBuf,
        /// Override the program's source image
        #[arg(long)]
        image: Option<String>,
    },
    /// Print a program's registers, operations, and schedule
    Show {
        #[arg(long)]
        program: PathBuf,
    },
    /// Emit the built-in demo program
    Demo {
        /// Write here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the effective config as TOML
    Config {
        /// Write here instead of stdout (for generating a default config file)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn capabilities(config: &RealityConfig) -> anyhow::Result<(Capabilities, Arc<GeminiClient>)> {
    let timeout = config.gemini.timeout_secs;
    let (segmenter, gemini, encoder) = match config.proxy_base() {
        Some(base) => {
            tracing::info!("Routing adapters through proxy {}", base);
            (
                FalSegmenter::via_proxy(base, &config.fal)?,
                GeminiClient::via_proxy(base, config.gemini.clone())?,
                HttpImageEncoder::new(timeout)?.with_proxy(base),
            )
        }
        None => (
            FalSegmenter::from_env(&config.fal).context("segmentation needs FAL_KEY")?,
            GeminiClient::from_env(config.gemini.clone()).context("Gemini needs GEMINI_API_KEY")?,
            HttpImageEncoder::new(timeout)?,
        ),
    };
    let gemini = Arc::new(gemini);
    let caps = Capabilities {
        segmenter: Arc::new(segmenter),
        stylizer: gemini.clone(),
        analyzer: gemini.clone(),
        encoder: Arc::new(encoder),
    };
    Ok((caps, gemini))
}

fn handlers(caps: Capabilities) -> HandlerRegistry {
    let registry = HandlerRegistry::with_capabilities(caps);
    tracing::debug!("Registered handlers: {}", registry.kinds().join(", "));
    registry
}

fn audit_log(config: &RealityConfig) -> AuditLog {
    let sink: Option<Arc<dyn AuditSink>> = if let Some(path) = config.audit_jsonl() {
        tracing::info!("Audit events → {}", path.display());
        Some(Arc::new(JsonlAuditSink::new(path)))
    } else if config.audit.http {
        match config.proxy_base() {
            Some(base) => Some(Arc::new(HttpAuditSink::new(base))),
            None => {
                tracing::warn!("audit.http is set but proxy.base_url is empty, audit disabled");
                None
            }
        }
    } else {
        None
    };
    sink.map(AuditLog::spawn).unwrap_or_else(AuditLog::disabled)
}

fn read_program(path: &Path) -> anyhow::Result<Program> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn write_program(path: &Path, program: &Program) -> anyhow::Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(program)?)
        .with_context(|| format!("writing {}", path.display()))
}

fn status_icon(status: OpStatus) -> &'static str {
    match status {
        OpStatus::Completed => "✓",
        OpStatus::Error => "✗",
        OpStatus::Running => "…",
        OpStatus::Idle => "○",
    }
}

fn print_program(program: &Program) -> anyhow::Result<()> {
    println!("Program {}", program.id);
    if let Some(image) = program.source_image() {
        println!("Source: {}", image);
    }

    println!("\nRegisters:");
    for reg in &program.registers {
        let value = match &reg.geometry {
            Geometry::Image { mask_url } => mask_url.chars().take(60).collect::<String>(),
            Geometry::Text { text_value } => format!("{:?}", text_value),
            Geometry::Number { number_value } => number_value.to_string(),
            Geometry::Empty {} => "-".to_string(),
        };
        let lock = if reg.symbol.locked { " [locked]" } else { "" };
        println!(
            "  {} {} ({}){} {}",
            reg.reg_id,
            reg.display_name(),
            reg.kind,
            lock,
            value
        );
    }

    println!("\nSchedule:");
    for op_id in program.scheduled_ops() {
        let Some(op) = program.operation(&op_id) else {
            println!("  ? {} (missing)", op_id);
            continue;
        };
        let inputs: Vec<String> = program
            .input_registers(&op.op_id)
            .into_iter()
            .map(|r| r.reg_id.clone())
            .collect();
        println!(
            "  {} {} {} [{}] ← {}",
            status_icon(op.status),
            op.op_id,
            op.kind,
            op.status,
            inputs.join(", ")
        );
        if let Some(result) = &op.result {
            let result = serde_json::to_string(result)?;
            println!("      {}", result.chars().take(100).collect::<String>());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "reality=info,reality_engine=info,reality_adapters=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo { out } => {
            let program = demo_program();
            match out {
                Some(path) => {
                    write_program(&path, &program)?;
                    println!("Demo program written to {}", path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&program)?),
            }
        }
        Commands::Config { out } => {
            let toml = RealityConfig::load(&cli.config).to_toml();
            match out {
                Some(path) => {
                    std::fs::write(&path, toml)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Config written to {}", path.display());
                }
                None => print!("{}", toml),
            }
        }
        Commands::Show { program } => {
            print_program(&read_program(&program)?)?;
        }
        Commands::Run { program: path, image } => {
            let config = RealityConfig::load(&cli.config);
            let mut program = read_program(&path)?;
            if let Some(image) = image {
                program.source.image_url = Some(image);
            }
            let (caps, _) = capabilities(&config)?;
            let store = Arc::new(GraphStore::new(program, audit_log(&config)));
            let executor = Executor::new(store.clone(), handlers(caps));

            let report = executor.run(&store.main_thread_id()).await;
            write_program(&path, &store.snapshot())?;

            println!("\n=== Run Complete ===");
            for entry in &report.entries {
                println!("  {} {} ({})", status_icon(entry.status), entry.op_id, entry.kind);
            }
            for op_id in &report.skipped {
                println!("  ? {} (no such operation)", op_id);
            }
            println!("Written back to {}", path.display());
        }
        Commands::Intent {
            image,
            intent,
            save,
        } => {
            let config = RealityConfig::load(&cli.config);
            let (caps, gemini) = capabilities(&config)?;
            let mut program = Program::default();
            program.source.image_url = Some(image.clone());
            let store = Arc::new(GraphStore::new(program, audit_log(&config)));
            let runtime = RealityRuntime::new(store.clone(), gemini, handlers(caps))
                .with_program_store(Arc::new(LocalProgramStore::new(&config.storage.programs_dir)));

            let thread = store.main_thread_id();
            let outcome = runtime.process_intent(&thread, Some(&image), &intent).await?;

            println!("\n=== Thought ===\n{}", outcome.thought);
            println!("\n=== Execution ===");
            for entry in &outcome.report.entries {
                println!("  {} {} ({})", status_icon(entry.status), entry.op_id, entry.kind);
            }
            if !outcome.applied.unresolved_inputs.is_empty() {
                println!(
                    "Unresolved inputs: {}",
                    outcome.applied.unresolved_inputs.join(", ")
                );
            }

            if save {
                let handle = runtime.save().await?;
                println!("\nSaved as {}", handle);
            }
        }
    }

    Ok(())
}
