use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Load events until interrupted
    Run {
        #[arg(long, help = "Config file path")]
        config: String,

        #[arg(
            long,
            help = "Stop once every file present at start has been loaded instead of following the source directory"
        )]
        once: bool,
    },
    /// Check a config file without connecting to anything
    Validate {
        #[arg(long, help = "Config file path")]
        config: String,
    },
}
