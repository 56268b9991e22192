mod cli;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::error;

use rtprovision::config::ProvisionConfig;
use rtprovision::provision::{
    self, ClassifiedError, ErrorCode, InstallOptions, PlatformDetector, classify, platform,
    recovery,
};

fn main() {
    env_logger::Builder::new()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(real_main()) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn real_main() -> Result<()> {
    let args = cli::Args::parse();

    let cfg_path = match args.config {
        Some(path) => PathBuf::from(path),
        None => ProvisionConfig::default_path()?,
    };
    let cfg = ProvisionConfig::load_or_init(&cfg_path)?;

    match args.sub.unwrap_or(cli::Cmd::Install {
        force: false,
        model: None,
        no_interaction: false,
    }) {
        cli::Cmd::Install {
            force,
            model,
            no_interaction,
        } => {
            let options = InstallOptions {
                force,
                model,
                no_interaction,
            };
            provision::run_interactive_install(&cfg, &options).await
        }
        cli::Cmd::Status => handle_status(&cfg).await,
        cli::Cmd::Models => handle_models(&cfg).await,
        cli::Cmd::Pull { name } => handle_pull(&cfg, &name).await,
        cli::Cmd::Test { name } => handle_test(&cfg, &name).await,
        cli::Cmd::Platform => {
            handle_platform();
            Ok(())
        }
        cli::Cmd::Troubleshoot { code } => handle_troubleshoot(&code),
    }
}

/// Handle status command - exit 0 when installed and running
async fn handle_status(cfg: &ProvisionConfig) -> Result<()> {
    let controller = provision::connect(cfg, None, false).await?;
    match controller.status() {
        Some(status) => {
            println!("installed: {}", status.installed);
            println!("running:   {}", status.running);
            println!("version:   {}", status.version.as_deref().unwrap_or("unknown"));
            println!("port:      {}", status.port);
            for (phase, err) in &status.errors {
                println!("{phase} error: {err}");
            }
            std::process::exit(if status.is_ready() { 0 } else { 1 });
        }
        None => {
            eprintln!("Installer agent unreachable at {}", cfg.agent_url);
            std::process::exit(1);
        }
    }
}

async fn handle_models(cfg: &ProvisionConfig) -> Result<()> {
    let controller = provision::connect(cfg, None, false).await?;
    let models = controller
        .gateway()
        .get_available_models()
        .await
        .map_err(|e| classify(&e, Some("list models")))?;

    if models.is_empty() {
        println!("No models installed. Try `rtprovision pull llama3.2`.");
    }
    for model in models {
        let digest: String = model.digest.chars().take(12).collect();
        println!(
            "{:<32} {:>8.1} MB  {}  {}",
            model.name,
            model.size as f64 / 1_048_576.0,
            digest,
            model.modified_at
        );
    }
    Ok(())
}

async fn handle_pull(cfg: &ProvisionConfig, name: &str) -> Result<()> {
    let controller = provision::connect(cfg, None, false).await?;
    println!("Pulling {name}...");
    controller
        .gateway()
        .pull_model(name)
        .await
        .map_err(|e| classify(&e, Some(name)))
        .with_context(|| format!("Failed to pull {name}"))?;
    println!("✅ {name} pulled");
    Ok(())
}

/// Handle test command - exit 0 when the model answers
async fn handle_test(cfg: &ProvisionConfig, name: &str) -> Result<()> {
    let controller = provision::connect(cfg, None, false).await?;
    match controller.gateway().test_model(name).await {
        Ok(true) => {
            println!("✅ {name} answered");
            std::process::exit(0);
        }
        Ok(false) => {
            eprintln!("⚠ {name} returned an empty response");
            std::process::exit(1);
        }
        Err(e) => {
            let classified = classify(&e, Some(name));
            eprintln!("❌ {classified}");
            std::process::exit(1);
        }
    }
}

fn handle_platform() {
    let profile = PlatformDetector::new().detect();
    println!(
        "{} {} ({:?}), supported: {}",
        platform::icon(profile.os),
        platform::display_name(profile.os),
        profile.arch,
        profile.supported
    );
    println!("signature: {}", profile.signature);
    println!("\nRequirements:");
    println!("  • {}", profile.requirements.min_ram);
    println!("  • {}", profile.requirements.min_storage);
    println!("  • {}", profile.requirements.min_cpu);
    println!("\nDownload: {}", platform::download_url(profile.os));
    println!("\nInstructions:");
    for (i, step) in platform::install_instructions(profile.os).iter().enumerate() {
        println!("  {}. {step}", i + 1);
    }
}

fn handle_troubleshoot(code: &str) -> Result<()> {
    let code = ErrorCode::parse(code)
        .ok_or_else(|| anyhow::anyhow!("Unknown error code: {code}"))?;
    let error = ClassifiedError::from_code(code, None);

    println!(
        "{} {} ({:?})",
        recovery::severity_icon(error.severity),
        recovery::user_friendly_message(code),
        error.severity
    );
    println!("\nRecovery actions:");
    for action in recovery::recovery_actions_for(&error) {
        let marker = if action.requires_user_action { "you" } else { "auto" };
        println!("  • {} [{marker}]: {}", action.label, action.description);
    }
    println!("\nTroubleshooting:");
    for (i, step) in recovery::troubleshooting_steps(&error).iter().enumerate() {
        println!("  {}. {step}", i + 1);
    }
    Ok(())
}
