//! Interactive provisioning with live progress and guided recovery
//!
//! Renders controller events as progress bars, and on failure shows the
//! classified error, its recovery actions and troubleshooting steps. When a
//! human is at the terminal they can pick an action and retry.

use std::io::Write;

use anyhow::{Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use inquire::{Confirm, Select};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use tokio::sync::mpsc;

use super::controller::ProvisionController;
use super::core::ProvisionEvent;
use super::environment;
use super::error::{ClassifiedError, ErrorCode, Severity};
use super::gateway::HttpAgent;
use super::platform;
use super::recovery;
use crate::config::ProvisionConfig;

/// Options collected from the command line
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub force: bool,
    pub model: Option<String>,
    pub no_interaction: bool,
}

const QUIT_CHOICE: &str = "Quit";

/// Run installation with progress bars, Ctrl-C cancellation and recovery prompts
pub async fn run_interactive_install(config: &ProvisionConfig, options: &InstallOptions) -> Result<()> {
    let interactive = !options.no_interaction && environment::is_interactive();

    let (tx, rx) = mpsc::channel::<ProvisionEvent>(100);
    let mut controller = super::connect(config, Some(tx), options.force).await?;

    show_header(&controller);

    if !options.force && controller.status().is_some_and(|s| s.is_ready()) {
        print_colored(Color::Green, true, "\n✓ Ollama is already installed and running\n");
        drop(controller);
        return Ok(());
    }

    let progress_task = spawn_progress_renderer(rx)?;

    let stop = controller.stop_handle();
    let ctrl_c_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, stopping installation after the current call");
            stop.stop();
        }
    });

    let model = options.model.as_deref().or(config.default_model.as_deref());
    let outcome = match drive(&mut controller, interactive).await {
        Ok(()) => match model {
            Some(model) => prepare_model(&mut controller, model).await,
            None => Ok(()),
        },
        Err(e) => Err(e),
    };

    ctrl_c_task.abort();
    let version = controller.status().and_then(|s| s.version.clone());
    let port = controller.status().map(|s| s.port);
    drop(controller);
    progress_task.await.ok();

    outcome?;
    show_completion(version.as_deref(), port);
    Ok(())
}

async fn drive(controller: &mut ProvisionController<HttpAgent>, interactive: bool) -> Result<()> {
    let mut result = controller.start_installation().await;

    loop {
        let error = match result {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        show_failure(controller, &error);

        if error.code == ErrorCode::UserCancelled
            || !interactive
            || !recovery::is_recoverable(&error)
        {
            return Err(error).context("Provisioning did not complete");
        }

        let mut choices: Vec<String> = controller
            .recovery_actions()
            .iter()
            .map(|a| a.label.to_string())
            .collect();
        choices.push(QUIT_CHOICE.to_string());

        let choice = Select::new("How would you like to recover?", choices)
            .prompt()
            .map_err(|e| anyhow::anyhow!("Prompt cancelled: {}", e))?;

        let Some(action) = controller
            .recovery_actions()
            .iter()
            .find(|a| a.label == choice)
            .cloned()
        else {
            return Err(error).context("Provisioning did not complete");
        };

        if action.requires_user_action {
            println!("\n👉 {}", action.description);
            let ready = Confirm::new("Retry once you have done this?")
                .with_default(true)
                .prompt()
                .map_err(|e| anyhow::anyhow!("Prompt cancelled: {}", e))?;
            if !ready {
                return Err(error).context("Provisioning did not complete");
            }
        }

        // Remediation is advisory; only a full pipeline run confirms it.
        action.execute().await;
        result = controller.retry_installation().await;
    }
}

async fn prepare_model(controller: &mut ProvisionController<HttpAgent>, model: &str) -> Result<()> {
    println!("\n📦 Preparing model {model}...");
    match controller.prepare_model(model).await {
        Ok(true) => {
            print_colored(Color::Green, false, &format!("✓ Model {model} answered the test prompt\n"));
            Ok(())
        }
        Ok(false) => {
            print_colored(Color::Yellow, false, &format!("⚠ Model {model} returned an empty response\n"));
            Ok(())
        }
        Err(e) => {
            show_failure(controller, &e);
            Err(e).with_context(|| format!("Failed to prepare model {model}"))
        }
    }
}

fn spawn_progress_renderer(
    mut rx: mpsc::Receiver<ProvisionEvent>,
) -> Result<tokio::task::JoinHandle<()>> {
    let multi = if environment::supports_live_progress() {
        MultiProgress::new()
    } else {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    };
    let live = environment::supports_live_progress();

    let pb_overall = multi.add(ProgressBar::new(100));
    pb_overall.set_style(
        ProgressStyle::default_bar()
            .template("\n[{bar:50.cyan/blue}] {pos:>3}%  {msg}\n")
            .context("Invalid progress bar template")?
            .progress_chars("█▓░"),
    );

    let pb_step = multi.add(ProgressBar::new(100));
    pb_step.set_style(
        ProgressStyle::default_bar()
            .template("   [{bar:50.green/blue}] {pos:>3}%  {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("█▓░"),
    );

    Ok(tokio::spawn(async move {
        let mut labels: Vec<&'static str> = Vec::new();
        let label = |labels: &[&'static str], index: usize| labels.get(index).copied().unwrap_or("step");

        while let Some(event) = rx.recv().await {
            match event {
                ProvisionEvent::Reset { steps } => {
                    labels = steps.iter().map(|s| s.label).collect();
                    pb_overall.set_position(0);
                    pb_overall.set_message("Starting installation...");
                    pb_step.set_position(0);
                }
                ProvisionEvent::StepStarted { index, .. } => {
                    pb_step.set_position(0);
                    pb_step.set_message(format!("⏳ {}", label(&labels, index)));
                    pb_overall.set_message(format!("Step {}/{}", index + 1, labels.len()));
                    if !live {
                        eprintln!("⏳ {}", label(&labels, index));
                    }
                }
                ProvisionEvent::StepProgress { progress, overall, .. } => {
                    pb_step.set_position(progress as u64);
                    pb_overall.set_position(overall as u64);
                }
                ProvisionEvent::StepCompleted { index, overall, .. } => {
                    pb_step.set_position(100);
                    pb_step.set_message(format!("✅ {}", label(&labels, index)));
                    pb_overall.set_position(overall as u64);
                    if !live {
                        eprintln!("✅ {}", label(&labels, index));
                    }
                }
                ProvisionEvent::StepFailed { index, message, .. } => {
                    pb_step.set_message(format!("❌ {}", label(&labels, index)));
                    pb_overall.set_message(message.clone());
                    if !live {
                        eprintln!("❌ {}: {}", label(&labels, index), message);
                    }
                }
                ProvisionEvent::Cancelled { index } => {
                    pb_step.set_message(format!("⏹ {} (cancelled)", label(&labels, index)));
                    pb_overall.set_message("Installation cancelled");
                }
                ProvisionEvent::Finished => {
                    pb_overall.set_position(100);
                    pb_overall.set_message("Installation complete");
                }
            }
        }

        pb_overall.finish_and_clear();
        pb_step.finish_and_clear();
    }))
}

fn print_colored(color: Color, bold: bool, text: &str) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(bold));
    let _ = write!(stdout, "{text}");
    let _ = stdout.reset();
}

fn severity_term_color(severity: Severity) -> Color {
    match recovery::severity_color(severity) {
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "orange" => Color::Rgb(255, 165, 0),
        _ => Color::Red,
    }
}

fn show_header(controller: &ProvisionController<HttpAgent>) {
    let profile = controller.profile();
    print_colored(Color::Cyan, true, "🔧 Ollama Runtime Installation\n");

    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let _ = writeln!(
        stdout,
        "Platform: {} {} ({:?})",
        platform::icon(profile.os),
        platform::display_name(profile.os),
        profile.arch
    );
    let req = &profile.requirements;
    let _ = writeln!(
        stdout,
        "Requires: {}, {}, {}\n",
        req.min_ram, req.min_storage, req.min_cpu
    );

    if !profile.supported {
        print_colored(
            Color::Yellow,
            false,
            &format!(
                "⚠ Unrecognized platform; see {} for manual installation\n",
                platform::download_url(profile.os)
            ),
        );
    }
}

fn show_failure(controller: &ProvisionController<HttpAgent>, error: &ClassifiedError) {
    let color = severity_term_color(error.severity);
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);

    let _ = stderr.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true));
    let _ = writeln!(
        stderr,
        "\n{} {} ({})",
        recovery::severity_icon(error.severity),
        error.message,
        error.code
    );
    let _ = stderr.reset();
    let _ = writeln!(stderr, "   {}", recovery::user_friendly_message(error.code));
    if let Some(ref details) = error.details {
        let _ = writeln!(stderr, "   Details: {details}");
    }

    let _ = writeln!(stderr, "\n   Suggestions:");
    for suggestion in &error.suggestions {
        let _ = writeln!(stderr, "   • {suggestion}");
    }

    let actions = controller.recovery_actions();
    if !actions.is_empty() {
        let _ = writeln!(stderr, "\n   Recovery options:");
        for action in actions {
            let marker = if action.requires_user_action { "you" } else { "auto" };
            let _ = writeln!(stderr, "   • {} [{marker}]: {}", action.label, action.description);
        }
    }

    let _ = writeln!(stderr, "\n   Troubleshooting:");
    for (i, step) in recovery::troubleshooting_steps(error).iter().enumerate() {
        let _ = writeln!(stderr, "   {}. {step}", i + 1);
    }
    let _ = writeln!(stderr);
}

fn show_completion(version: Option<&str>, port: Option<u16>) {
    print_colored(
        Color::Cyan,
        false,
        "\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n",
    );
    print_colored(Color::Green, true, "\n                    ✓ OLLAMA IS READY\n\n");

    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let _ = writeln!(stdout, "  Version: {}", version.unwrap_or("unknown"));
    if let Some(port) = port {
        let _ = writeln!(stdout, "  Listening on port {port}");
    }
    let _ = writeln!(stdout, "\nNext: run `rtprovision pull <model>` to download a model");

    print_colored(
        Color::Cyan,
        false,
        "\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n",
    );
}
