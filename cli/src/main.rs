use std::path::PathBuf;
use std::process;

use clap::Parser;
use env_logger::{Builder, Target};
use log::LevelFilter;

use ridl_compiler::{Compiler, IdlError, Options};

#[derive(Parser)]
#[command(name = "ridl")]
#[command(about = "Compile an IDL schema into one or more target languages", long_about = None)]
struct Cli {
    /// Input schema file
    input: PathBuf,

    /// Output root directory for gen-* packages (must exist)
    #[arg(short = 'o', long = "out", default_value = ".")]
    out: PathBuf,

    /// Add a directory to the include search path (repeatable)
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    include: Vec<PathBuf>,

    /// Also generate code for included files
    #[arg(short = 'r', long = "recurse")]
    recurse: bool,

    /// Progress messages to standard output
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Parser trace to standard output
    #[arg(long = "debug")]
    debug: bool,

    /// Suppress all warnings
    #[arg(long = "nowarn")]
    nowarn: bool,

    /// Enable strict (level 2) warnings
    #[arg(long = "strict")]
    strict: bool,

    /// Enable a back end, NAME[:key=value,...] (repeatable)
    #[arg(short = 'g', long = "gen", value_name = "NAME[:OPTS]")]
    gen: Vec<String>,
}

fn run(cli: &Cli) -> Result<(), IdlError> {
    if !cli.out.is_dir() {
        return Err(IdlError::Generator(format!(
            "Output directory {} is unusable",
            cli.out.display()
        )));
    }
    if cli.gen.is_empty() {
        return Err(IdlError::Generator(
            "No output language(s) specified".to_string(),
        ));
    }

    let warn_level = if cli.nowarn {
        -1
    } else if cli.strict {
        2
    } else {
        1
    };

    let opts = Options {
        out_path:     cli.out.clone(),
        include_dirs: cli.include.clone(),
        recurse:      cli.recurse,
        warn_level,
        gens:         cli.gen.clone(),
    };

    let mut compiler = Compiler::new(opts);
    compiler.run(&cli.input)?;
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.debug {
        LevelFilter::Debug
    } else if cli.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    let mut builder = Builder::new();
    builder.filter_level(level);
    builder.format_timestamp(None);
    builder.target(Target::Stdout);
    builder.init();

    if let Err(e) = run(&cli) {
        eprintln!("{}", e);
        process::exit(1);
    }
}
