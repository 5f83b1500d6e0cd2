use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "stride-server", about = "Stride realtime messaging server")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/stride.toml")]
    pub config: String,
}
