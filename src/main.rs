use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use aldebaran::{Assembler, Config, Executable, Machine};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
  /// More logging. Repeat for more still
  #[arg(short, long, action = ArgAction::Count, global = true)]
  verbose: u8,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Assemble a source file into an executable
  Assemble {
    source: PathBuf,

    /// Output file (default: the source path without its extension)
    #[arg(short, long)]
    output: Option<PathBuf>,
  },

  /// Boot the machine and run an executable until it shuts down
  Run {
    executable: PathBuf,

    /// Print the machine state after every step
    #[arg(long)]
    trace: bool,

    /// Stop after this many steps
    #[arg(long)]
    max_steps: Option<u64>,

    /// Steps per timer beat
    #[arg(long)]
    timer_divider: Option<usize>,
  },
}

fn init_logging(verbose: u8) {
  let level = match verbose {
    0 => "warn,aldebaran::user=info",
    1 => "info",
    2 => "debug",
    _ => "trace"
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();
}

fn assemble(source: PathBuf, output: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
  let text = fs::read_to_string(&source)?;
  let assembly = Assembler::new(&text)?.assemble()?;
  let output = output.unwrap_or_else(|| source.with_extension(""));
  let executable = Executable::new(assembly.into_opcode());
  executable.save(&output)?;
  info!(output = %output.display(), length = executable.opcode.len(), "assembled");
  Ok(())
}

fn run(
  path          : PathBuf,
  trace         : bool,
  max_steps     : Option<u64>,
  timer_divider : Option<usize>
) -> Result<(), Box<dyn Error>> {
  let mut config = Config::default();
  config.max_steps = max_steps;
  if let Some(divider) = timer_divider {
    config.timer_divider = divider;
  }

  let executable = Executable::load(&path)?;
  let mut machine = Machine::new(config);
  machine.load(&executable)?;

  #[cfg(feature = "trace_computation")]
  machine.set_trace(trace);
  #[cfg(not(feature = "trace_computation"))]
  {
    if trace {
      tracing::warn!("built without trace_computation, --trace ignored");
    }
  }

  match machine.run() {
    Ok(steps) => {
      info!(steps, "finished");
      Ok(())
    }

    Err(e) => {
      eprintln!("{}", machine.crash_dump());
      Err(e.into())
    }
  } // end match on run
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  let result = match cli.command {
    Command::Assemble { source, output } => assemble(source, output),
    Command::Run { executable, trace, max_steps, timer_divider } => run(executable, trace, max_steps, timer_divider),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      error!("{}", e);
      ExitCode::FAILURE
    }
  }
}
