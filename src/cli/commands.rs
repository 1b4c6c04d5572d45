//! Subcommand handlers.
//!
//! Each handler returns `Result<(), String>`; `main` prints the error and
//! exits with status 1.

use std::future::Future;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::args::{Args, ConfigAction, GenerationArgs, PollingArgs};
use crate::config::{default_path as get_config_path, Config, Settings, DEFAULT_CONFIG_TEMPLATE};
use crate::veo::{
    extension_for_mime, FileTaskStore, GenerationRequest, PollWatcher, PromptEnhancer,
    TaskRecord, TaskStatus, TaskStore, TerminalResult, VeoClient, VeoError, WatchOptions,
    WatchOutcome, GCP_PROJECT_ID_ENV, GEMINI_API_KEY_ENV,
};

/// Everything a handler needs: resolved settings plus global CLI overrides.
pub struct Context {
    pub settings: Settings,
    pub access_token: Option<String>,
    pub config_path: Option<PathBuf>,
}

impl Context {
    /// Load the config file, overlay the environment, then apply global
    /// CLI flags.
    pub fn from_args(args: &Args) -> Result<Self, String> {
        let config = Config::load(args.config.as_deref()).map_err(|e| e.to_string())?;
        let mut settings = Settings::from_env(&config);
        apply_overrides(&mut settings, args);

        Ok(Self {
            settings,
            access_token: args.access_token.clone(),
            config_path: args.config.clone(),
        })
    }

    fn client(&self) -> Result<VeoClient, String> {
        self.settings
            .veo_client(self.access_token.clone())
            .map_err(|e| match e {
                VeoError::Configuration(ref msg) if msg.contains(GCP_PROJECT_ID_ENV) => format!(
                    "{} is not set.\n\n\
                    Add your Google Cloud project to a .env file:\n\
                        echo '{}=my-project' >> .env\n\n\
                    Or pass it on the command line:\n\
                        veo-studio --project my-project ...",
                    GCP_PROJECT_ID_ENV, GCP_PROJECT_ID_ENV
                ),
                _ => format!("Failed to create Vertex AI client: {}", e),
            })
    }

    fn enhancer(&self) -> Result<PromptEnhancer, String> {
        self.settings.prompt_enhancer().map_err(|e| match e {
            VeoError::Configuration(_) => format!(
                "{} environment variable is not set.\n\n\
                To enhance prompts, add your API key to a .env file:\n\
                    echo '{}=your-api-key-here' >> .env\n\n\
                Or set it as an environment variable:\n\
                    export {}=\"your-api-key-here\"",
                GEMINI_API_KEY_ENV, GEMINI_API_KEY_ENV, GEMINI_API_KEY_ENV
            ),
            _ => format!("Failed to create Gemini client: {}", e),
        })
    }
}

/// CLI flags win over environment and config file.
pub fn apply_overrides(settings: &mut Settings, args: &Args) {
    if let Some(project) = &args.project {
        settings.project_id = Some(project.clone());
    }
    if let Some(region) = &args.region {
        settings.region = region.clone();
    }
    if let Some(model) = &args.model {
        settings.model = model.clone();
    }
}

/// Merge per-command polling flags into the configured watch options.
pub fn watch_options(base: &WatchOptions, polling: &PollingArgs) -> WatchOptions {
    WatchOptions {
        interval: polling
            .interval
            .map(Duration::from_secs)
            .unwrap_or(base.interval),
        max_attempts: polling.max_attempts.or(base.max_attempts),
        max_elapsed: match polling.timeout {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => base.max_elapsed,
        },
    }
}

fn generation_request(prompt: &str, generation: &GenerationArgs) -> GenerationRequest {
    GenerationRequest::new(prompt, generation.duration)
        .with_audio(generation.audio)
        .with_storage_uri(generation.storage_uri.clone())
}

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Runtime::new().map_err(|e| format!("Failed to create async runtime: {}", e))
}

fn task_store() -> Result<FileTaskStore, String> {
    FileTaskStore::with_default_dir_initialized()
        .map_err(|e| format!("Failed to access task directory: {}", e))
}

/// Store writes are best effort; a broken task directory must not fail a job.
fn remember(store: &dyn TaskStore, record: &TaskRecord) {
    if let Err(e) = store.put(record) {
        log::warn!("Failed to record task {}: {}", record.handle, e);
    }
}

/// Default download path: `veo-<hash>.mp4` in the current directory.
pub fn default_output_path(handle: &str, mime_type: &str) -> PathBuf {
    let hash = FileTaskStore::hash_handle(handle);
    PathBuf::from(format!("veo-{}.{}", &hash[..12], extension_for_mime(mime_type)))
}

/// Truncate long prompts for display
fn short_prompt(prompt: &str) -> String {
    if prompt.chars().count() > 50 {
        let head: String = prompt.chars().take(47).collect();
        format!("{}...", head)
    } else {
        prompt.to_string()
    }
}

fn describe(status: &TaskStatus) -> String {
    match status {
        TaskStatus::Pending => "pending".to_string(),
        TaskStatus::Processing { progress } => format!("processing ({}%)", progress),
        TaskStatus::Completed { video_url, .. } if video_url.starts_with("data:") => {
            "completed (inline video)".to_string()
        }
        TaskStatus::Completed { video_url, .. } => format!("completed ({})", video_url),
        TaskStatus::Error { error } => format!("error: {}", error),
        TaskStatus::Timeout { error, .. } => format!("timeout: {}", error),
    }
}

/// Answer to the approval prompt in `generate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    Enhanced,
    Original,
    Abort,
}

/// Parse an approval answer. Empty input accepts the enhanced prompt.
pub fn parse_approval(input: &str) -> Option<Approval> {
    match input.trim().to_lowercase().as_str() {
        "" | "y" | "yes" => Some(Approval::Enhanced),
        "o" | "original" => Some(Approval::Original),
        "n" | "no" | "q" => Some(Approval::Abort),
        _ => None,
    }
}

fn ask_approval(enhanced: &str) -> Result<Approval, String> {
    println!();
    println!("Enhanced prompt:");
    println!("  {}", enhanced);
    println!();

    let stdin = std::io::stdin();
    loop {
        print!("Use it? [Y]es / [o]riginal / [n]o: ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .map_err(|e| format!("Failed to read answer: {}", e))?;
        if read == 0 {
            return Ok(Approval::Abort);
        }
        match parse_approval(&line) {
            Some(answer) => return Ok(answer),
            None => println!("Please answer y, o or n."),
        }
    }
}

/// Drive `work` to completion, cancelling `token` on Ctrl+C.
///
/// The signal listener lives only as long as `work`.
async fn until_interrupted<F: Future>(token: &CancellationToken, work: F) -> F::Output {
    tokio::pin!(work);
    tokio::select! {
        output = &mut work => return output,
        Ok(()) = tokio::signal::ctrl_c() => {
            eprintln!();
            eprintln!("Interrupted, stopping watch.");
            token.cancel();
        }
    }
    work.await
}

/// Run `work` unless Ctrl+C arrives first. Returns `None` when interrupted.
async fn or_interrupted<F: Future>(work: F) -> Option<F::Output> {
    tokio::select! {
        output = work => Some(output),
        Ok(()) = tokio::signal::ctrl_c() => None,
    }
}

async fn watch_until_done(
    client: &VeoClient,
    store: &dyn TaskStore,
    handle: &str,
    options: WatchOptions,
) -> WatchOutcome {
    let watcher = PollWatcher::new(client, options).with_store(store);
    let token = watcher.cancellation_token();

    print!("Generating");
    std::io::stdout().flush().ok();

    let watch = watcher.watch(handle, |status| {
        if !status.is_terminal() {
            print!(".");
            std::io::stdout().flush().ok();
        }
    });
    let outcome = until_interrupted(&token, watch).await;

    println!();
    outcome
}

/// Turn a finished watch into a result for the terminal.
fn finish(outcome: WatchOutcome, handle: &str) -> Result<TerminalResult, String> {
    match outcome {
        WatchOutcome::Cancelled(last) => Err(format!(
            "Watch cancelled (last status: {}). Resume with: veo-studio watch {}",
            describe(&last),
            handle
        )),
        WatchOutcome::Finished(TaskStatus::Timeout { error, .. }) => Err(format!(
            "{}: {}. Resume with: veo-studio watch {}",
            VeoError::Timeout,
            error,
            handle
        )),
        WatchOutcome::Finished(status) => match TerminalResult::from_status(&status) {
            Some(result) => Ok(result),
            None => Err(format!("Generation failed: {}", describe(&status))),
        },
    }
}

fn print_result(result: &TerminalResult) {
    println!("Video ready!");
    match result.raw_reference() {
        Some(raw) => {
            println!("  URL: {}", result.url());
            println!("  Storage: {}", raw);
        }
        None => println!("  Inline {} video (use --output or `download` to save it)", result.mime_type()),
    }
}

/// Run `enhance`: print the rewritten prompt.
pub fn run_enhance(ctx: &Context, prompt: &str) -> Result<(), String> {
    let enhancer = ctx.enhancer()?;
    let rt = runtime()?;
    let enhanced = rt
        .block_on(enhancer.enhance(prompt))
        .map_err(|e| format!("Failed to enhance prompt: {}", e))?;
    println!("{}", enhanced);
    Ok(())
}

/// Run `submit`: start a job and print its handle.
pub fn run_submit(ctx: &Context, prompt: &str, generation: &GenerationArgs) -> Result<(), String> {
    let client = ctx.client()?;
    let store = task_store()?;
    let request = generation_request(prompt, generation);
    let rt = runtime()?;

    let handle = rt
        .block_on(client.submit(&request))
        .map_err(|e| format!("Failed to submit generation request: {}", e))?;

    remember(
        &store,
        &TaskRecord::new(handle.as_str(), Some(request.prompt.clone()), TaskStatus::Pending),
    );
    println!("{}", handle);
    Ok(())
}

/// Run `status`: poll once and print the normalized status as JSON.
pub fn run_status(ctx: &Context, handle: &str) -> Result<(), String> {
    let client = ctx.client()?;
    let store = task_store()?;
    let rt = runtime()?;

    let report = rt.block_on(client.poll(handle));
    if let Err(e) = store.update_status(handle, &report.status) {
        log::warn!("Failed to record task {}: {}", handle, e);
    }

    let json = serde_json::to_string_pretty(&report.status)
        .map_err(|e| format!("Failed to encode status: {}", e))?;
    println!("{}", json);

    match &report.status {
        TaskStatus::Error { error } => Err(format!("{} (HTTP {})", error, report.http_status)),
        _ => Ok(()),
    }
}

/// Run `watch`: poll until the operation settles.
pub fn run_watch(ctx: &Context, handle: &str, polling: &PollingArgs) -> Result<(), String> {
    let client = ctx.client()?;
    let store = task_store()?;
    let options = watch_options(&ctx.settings.watch, polling);
    let rt = runtime()?;

    let outcome = rt.block_on(watch_until_done(&client, &store, handle, options));
    let result = finish(outcome, handle)?;
    print_result(&result);
    Ok(())
}

/// Run `generate`: enhance, approve, submit, watch and optionally download.
pub fn run_generate(
    ctx: &Context,
    prompt: &str,
    generation: &GenerationArgs,
    enhance: bool,
    yes: bool,
    output: Option<&Path>,
    polling: &PollingArgs,
) -> Result<(), String> {
    let client = ctx.client()?;
    let store = task_store()?;
    let options = watch_options(&ctx.settings.watch, polling);
    let rt = runtime()?;

    rt.block_on(async {
        let prompt = if enhance {
            let enhancer = ctx.enhancer()?;
            print!("Enhancing prompt... ");
            std::io::stdout().flush().ok();
            let enhanced = enhancer
                .enhance(prompt)
                .await
                .map_err(|e| format!("\nFailed to enhance prompt: {}", e))?;
            println!("done");

            let approval = if yes {
                println!("  {}", enhanced);
                Approval::Enhanced
            } else {
                ask_approval(&enhanced)?
            };
            match approval {
                Approval::Enhanced => enhanced,
                Approval::Original => prompt.to_string(),
                Approval::Abort => return Err("Aborted, nothing was submitted".to_string()),
            }
        } else {
            prompt.to_string()
        };

        println!("Generating video for: \"{}\"", short_prompt(&prompt));
        println!();

        print!("Submitting to Vertex AI... ");
        std::io::stdout().flush().ok();
        let request = generation_request(&prompt, generation);
        let handle = client
            .submit(&request)
            .await
            .map_err(|e| format!("\nFailed to submit generation request: {}", e))?;
        println!("done");
        println!("  Operation: {}", handle);

        remember(
            &store,
            &TaskRecord::new(handle.as_str(), Some(prompt.clone()), TaskStatus::Pending),
        );

        let outcome = watch_until_done(&client, &store, handle.as_str(), options).await;
        let result = finish(outcome, handle.as_str())?;
        print_result(&result);

        if let Some(dest) = output {
            print!("Downloading video... ");
            std::io::stdout().flush().ok();
            let path = or_interrupted(client.download(&result, dest))
                .await
                .ok_or_else(|| "\nInterrupted, download stopped.".to_string())?
                .map_err(|e| format!("\nFailed to download video: {}", e))?;
            println!("done");
            println!("  Path: {}", path.display());
        }

        Ok(())
    })
}

/// Run `download`: save the video of a completed operation.
///
/// Uses the stored status when it is already complete, otherwise polls once.
pub fn run_download(ctx: &Context, handle: &str, output: Option<&Path>) -> Result<(), String> {
    let client = ctx.client()?;
    let store = task_store()?;
    let rt = runtime()?;

    rt.block_on(async {
        let stored = store
            .get(handle)
            .map_err(|e| format!("Failed to read task record: {}", e))?
            .and_then(|record| TerminalResult::from_status(&record.status));

        let result = match stored {
            Some(result) => result,
            None => {
                let report = client.poll(handle).await;
                if let Err(e) = store.update_status(handle, &report.status) {
                    log::warn!("Failed to record task {}: {}", handle, e);
                }
                TerminalResult::from_status(&report.status).ok_or_else(|| {
                    format!("Operation is not complete: {}", describe(&report.status))
                })?
            }
        };

        let dest = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_output_path(handle, result.mime_type()));

        print!("Downloading video... ");
        std::io::stdout().flush().ok();
        let path = client
            .download(&result, &dest)
            .await
            .map_err(|e| format!("\nFailed to download video: {}", e))?;
        println!("done");
        println!("  Path: {}", path.display());
        Ok(())
    })
}

/// Run `tasks`: list stored task records.
pub fn run_tasks() -> Result<(), String> {
    let store = FileTaskStore::new(FileTaskStore::default_dir());
    let records = store
        .list()
        .map_err(|e| format!("Failed to list tasks: {}", e))?;

    if records.is_empty() {
        println!("No tasks yet.");
        return Ok(());
    }

    println!("Tasks:\n");
    for record in &records {
        let prompt_display = record
            .prompt
            .as_deref()
            .map(short_prompt)
            .unwrap_or_else(|| "(no prompt data)".to_string());
        println!("  {}", record.handle);
        println!("    {} \"{}\"", describe(&record.status), prompt_display);
    }
    println!("\nTotal: {} task{}", records.len(), if records.len() == 1 { "" } else { "s" });
    Ok(())
}

/// Handle config subcommand actions.
pub fn handle_config_action(ctx: &Context, action: ConfigAction) -> Result<(), String> {
    match action {
        ConfigAction::Show => {
            let s = &ctx.settings;
            println!("Current configuration:");
            println!("  Project: {}", s.project_id.as_deref().unwrap_or("(not set)"));
            println!("  Region: {}", s.region);
            println!("  Model: {}", s.model);
            println!("  Storage URI: {}", s.storage_uri.as_deref().unwrap_or("(inline)"));
            if let Some(endpoint) = &s.vertex_endpoint {
                println!("  Vertex endpoint: {}", endpoint);
            }
            println!("  Gemini model: {}", s.gemini_model);
            println!(
                "  Gemini API key: {}",
                if s.gemini_api_key.is_some() { "set" } else { "(not set)" }
            );
            println!(
                "  Credentials: {}",
                match (&ctx.access_token, &s.credentials) {
                    (Some(_), _) => "access token".to_string(),
                    (None, Some(c)) => c.describe(),
                    (None, None) => "(not set)".to_string(),
                }
            );
            println!("  Poll interval: {}s", s.watch.interval.as_secs());
            match s.watch.max_attempts {
                Some(n) => println!("  Max attempts: {}", n),
                None => println!("  Max attempts: unlimited"),
            }
            match s.watch.max_elapsed {
                Some(d) => println!("  Timeout: {}s", d.as_secs()),
                None => println!("  Timeout: none"),
            }
            println!();

            let config_path = ctx.config_path.clone().unwrap_or_else(get_config_path);
            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found)", config_path.display());
            }
            Ok(())
        }
        ConfigAction::Init => {
            let config_path = ctx.config_path.clone().unwrap_or_else(get_config_path);
            init_config(&config_path)?;
            println!("Created config file: {}", config_path.display());
            Ok(())
        }
    }
}

/// Write the default config template to `path`, refusing to overwrite.
pub fn init_config(path: &Path) -> Result<(), String> {
    if path.exists() {
        return Err(format!(
            "Config file already exists: {}\nUse 'veo-studio config show' to view current settings.",
            path.display()
        ));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Error creating config directory: {}", e))?;
    }

    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)
        .map_err(|e| format!("Error writing config file: {}", e))
}
