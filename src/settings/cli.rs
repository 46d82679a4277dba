use super::Parser;

#[derive(Parser, Debug)]
#[command(name = "turnstile", about = "Session and token lifecycle service")]
pub struct Cli {
    /// Path to a settings file; defaults to settings/dev.toml in debug builds.
    #[arg(long)]
    pub settings: Option<String>,
}
