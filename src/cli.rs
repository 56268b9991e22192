use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Provision a local Ollama runtime through the installer agent")]
pub struct Args {
    /// Path to configuration file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<String>,

    /// Sub‑commands (install, status, etc.)
    #[command(subcommand)]
    pub sub: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Install, start and verify the runtime (default if no sub‑command)
    Install {
        /// Reinstall even if the runtime is already present
        #[arg(long)]
        force: bool,

        /// Pull and test this model once the runtime is ready
        #[arg(long, short = 'm')]
        model: Option<String>,

        /// Never prompt; fail with recovery advice instead
        #[arg(long)]
        no_interaction: bool,
    },
    /// Show runtime status (Exit 0 = installed and running, 1 = otherwise)
    Status,
    /// List models available to the runtime
    Models,
    /// Pull a model into the runtime
    Pull {
        name: String,
    },
    /// Send a test prompt to a model (Exit 0 = answered, 1 = failed)
    Test {
        name: String,
    },
    /// Show the detected platform, requirements and install instructions
    Platform,
    /// Show recovery actions and troubleshooting steps for an error code
    Troubleshoot {
        /// e.g. NETWORK_ERROR, PERMISSION_ERROR
        code: String,
    },
}
