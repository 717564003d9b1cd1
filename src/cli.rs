use crate::compressor::Preset;
use crate::formats::OutputFormat;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "img-migrate",
    about = "Compress and re-upload the product images of a catalog",
    long_about = "img-migrate downloads every catalog image that has not been migrated yet, \
                  compresses it towards a size target and re-uploads it under a new key marked \
                  as compressed. Runs can be paused with Ctrl-C and resumed later from a state file.",
    version,
    after_help = "EXAMPLES:\n  \
    img-migrate compress photo.jpg photo-small.jpg --preset aggressive\n  \
    img-migrate plan --catalog products.json\n  \
    img-migrate migrate --catalog products.json --config migrate.toml --state run.json\n  \
    img-migrate migrate --catalog products.json --state run.json --reset"
)]
pub struct Args {
    #[arg(short, long, global = true, help = "Only print errors")]
    pub quiet: bool,

    #[arg(short, long, global = true, help = "Print debug output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Compress a single local image file",
        long_about = "Compress one local image with the same compressor the migration uses. \
                      Without --preset the preset is chosen from the input size."
    )]
    Compress {
        #[arg(help = "Input image file path")]
        input: PathBuf,

        #[arg(help = "Output image file path")]
        output: PathBuf,

        #[arg(
            short,
            long,
            help = "Compression preset (aggressive, default, conservative)",
            long_help = "aggressive: 1 MiB / 1920px / quality 0.7; \
                         default: 800 KiB / 1920px / quality 0.8; \
                         conservative: 512 KiB / 2048px / quality 0.9"
        )]
        preset: Option<Preset>,

        #[arg(
            short,
            long,
            help = "Output format (jpeg, png, webp)",
            long_help = "Force the output format. By default PNG and GIF stay PNG, \
                         WebP with transparency stays WebP and everything else becomes JPEG."
        )]
        format: Option<OutputFormat>,
    },

    #[command(
        about = "List the images a migration would process",
        long_about = "Read the catalog and print one line per image URL that does not carry \
                      the compressed marker yet."
    )]
    Plan {
        #[command(flatten)]
        source: SourceArgs,
    },

    #[command(
        about = "Run or resume a migration",
        long_about = "Process every candidate image one at a time. Ctrl-C pauses after the \
                      current image; the run is saved to the state file and the next invocation \
                      resumes from where it stopped. New URLs are written back to the catalog."
    )]
    Migrate {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(
            short,
            long,
            default_value = "migration-state.json",
            help = "Run state file used to pause and resume"
        )]
        state: PathBuf,

        #[arg(long, help = "Delete each original object after its upload succeeds")]
        delete_original: bool,

        #[arg(short, long, help = "Use one preset for every image")]
        preset: Option<Preset>,

        #[arg(short, long, help = "Force one output format (jpeg, png, webp)")]
        format: Option<OutputFormat>,

        #[arg(long, help = "Discard the saved run and start over")]
        reset: bool,
    },
}

#[derive(ClapArgs, Debug)]
pub struct SourceArgs {
    #[arg(long, help = "Catalog JSON file with product records")]
    pub catalog: PathBuf,

    #[arg(
        long,
        help = "TOML configuration file",
        long_help = "Store, fetch and migration settings. Every field is optional; \
                     without a file a local store under ./media is used."
    )]
    pub config: Option<PathBuf>,
}
