use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::pak::Game;

#[derive(Parser, Debug)]
#[command(name = "ghpak")]
#[command(version)]
#[command(about = "Extract and compile Neversoft .pak/.pab archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  ghpak extract qb.pak.xen              extract next to the pak, into qb/\n  \
  ghpak list -n names.txt song.pak.ps2  list entries, naming keys from names.txt\n  \
  ghpak compile --qb --game gh3 qb/     build qb.pak.ps2 and qb.pab.ps2")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// More output (-vv for trace)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count, global = true)]
    pub quiet: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract every entry of a pak
    Extract {
        /// Pak file (`.pak.xen`, `.pak.ps2`, ...)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Newline-separated names used to resolve keys
        #[arg(short = 'n', long = "names", value_name = "FILE")]
        names: Option<PathBuf>,

        /// Extract into DIR instead of a folder named after the pak
        #[arg(short = 'd', value_name = "DIR")]
        extract_dir: Option<PathBuf>,
    },

    /// List the entries of a pak
    List {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(short = 'n', long = "names", value_name = "FILE")]
        names: Option<PathBuf>,
    },

    /// Compile a folder into a pak/pab pair
    Compile {
        /// Source folder
        #[arg(value_name = "DIR")]
        folder: PathBuf,

        /// Building qb.pak (PS2 .qb files keep their extension)
        #[arg(long)]
        qb: bool,

        /// Split output (reserved)
        #[arg(long)]
        split: bool,

        /// Target game
        #[arg(long, value_enum, default_value_t = Game::Ghwt)]
        game: Game,

        /// Write the output into DIR instead of next to the folder
        #[arg(short = 'd', value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },
}

impl Cli {
    /// Log filter directive for the verbosity flags.
    pub fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (q, _) if q > 1 => "error",
            (1, _) => "warn",
            (_, 0) => "info",
            (_, 1) => "debug",
            _ => "trace",
        }
    }
}
