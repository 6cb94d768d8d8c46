use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use streamcore_common::models::{CommandType, NewCommand, PermissionLevel};
use streamcore_common::traits::{AttendanceRepository, CommandRepository};

mod context;
use context::{config_dir, open_repository, ServerContext};

#[derive(Parser, Debug, Clone)]
#[command(name = "streamcore")]
#[command(author, version, about = "StreamCore - chat commands, attendance and TTS for Twitch, Kick and YouTube")]
pub struct Args {
    /// Directory holding the JSON config sections.
    #[arg(long, env = "STREAMCORE_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// SQLite database path, or ":memory:". Defaults to the config directory.
    #[arg(long)]
    db: Option<String>,

    /// Synthesizer command line; `{out}` and `{text}` are substituted.
    #[arg(long, default_value = "espeak-ng -w {out} {text}")]
    synth: String,

    /// Playback program (ffplay-compatible), or "rodio" when built with it.
    #[arg(long, default_value = "ffplay")]
    player: String,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug, Clone)]
enum Cmd {
    /// Read chat lines from stdin and run until EOF (the default).
    Run,
    /// Create a custom command.
    CommandAdd {
        name: String,
        response: String,
        #[arg(long, default_value = "text")]
        kind: CommandType,
        #[arg(long, default_value_t = 5)]
        cooldown: u32,
        #[arg(long, default_value = "everyone")]
        permission: PermissionLevel,
    },
    /// Print every custom command.
    CommandList,
    /// Print attendance totals, highest first.
    AttendanceList,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("streamcore=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).with_writer(std::io::stderr).finish();
    if let Err(e) = tracing::subscriber::set_global_default(sub) {
        eprintln!("Failed to set global subscriber: {e}");
    }
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();

    match args.command.clone().unwrap_or(Cmd::Run) {
        Cmd::Run => run_server(&args)?,
        Cmd::CommandAdd { name, response, kind, cooldown, permission } => {
            let repo = open_repository(&args, &config_dir(&args))?;
            let mut cmd = NewCommand::text(&name, &response);
            cmd.command_type = kind;
            cmd.cooldown_seconds = cooldown;
            cmd.permission = permission;
            let id = repo.create_command(&cmd)?;
            println!("created {} (id {id})", cmd.normalized_name()?);
        }
        Cmd::CommandList => {
            let repo = open_repository(&args, &config_dir(&args))?;
            for c in repo.list_commands()? {
                let platforms: Vec<_> = c.active_on.iter().map(|p| p.as_str()).collect();
                println!(
                    "{:<16} {:<8} cd={}s perm={:<11} uses={:<5} {} [{}] {}",
                    c.name,
                    c.command_type.as_str(),
                    c.cooldown_seconds,
                    c.permission,
                    c.uses,
                    if c.active { "on " } else { "off" },
                    platforms.join(","),
                    c.response_template
                );
            }
        }
        Cmd::AttendanceList => {
            let repo = open_repository(&args, &config_dir(&args))?;
            for r in repo.list_attendance()? {
                println!("{:<24} {:<8} {}", r.nickname, r.platform, r.total_count);
            }
        }
    }
    Ok(())
}

fn run_server(args: &Args) -> anyhow::Result<()> {
    info!("StreamCore starting. config_dir={}", config_dir(args).display());
    let ctx = ServerContext::new(args)?;
    info!(
        tts = ctx.modules.get().tts_enabled,
        commands = ctx.modules.get().commands_enabled,
        attendance = ctx.modules.get().attendance_enabled,
        "Modules loaded"
    );
    let settings = ctx.router.settings();
    let voice = ctx.admin.voice_settings();
    info!(
        attendance = ?settings.attendance.triggers(),
        tts = %settings.tts.command,
        prefix = %settings.options.command_prefix,
        speed = voice.speed,
        pitch = voice.pitch,
        volume = voice.volume,
        "Listening for chat on stdin"
    );

    let published = ctx.run_stdin();
    info!("Input closed after {} message(s)", published);

    match ctx.repo.command_stats() {
        Ok(stats) => info!(
            total = stats.total,
            uses = stats.uses,
            popular = stats.popular.as_deref().unwrap_or("-"),
            "Command stats"
        ),
        Err(e) => error!("Could not read command stats: {}", e),
    }

    ctx.shutdown();
    info!("Main finished. Goodbye!");
    Ok(())
}
