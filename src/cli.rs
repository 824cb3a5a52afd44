use clap::{Parser, Subcommand};

/// Voice Control Plane — coordinates live, paid, multi-party voice/video
/// rooms brokered through an external real-time-media vendor.
#[derive(Parser)]
#[command(name = "voice-control-plane", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP control-plane server.
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        #[arg(long, default_value = "8080")]
        port: u16,
    },

    /// Run one attestation sweep pass out-of-band (for cron/operator use).
    Sweep,

    /// Print a random HMAC secret suitable for `JWT_SECRET`.
    GenSecret,
}
