use clap::Parser;

use veo_studio::cli::{self, Args, Command, Context};

/// Load environment variables from .env file.
fn load_env() {
    // Existing env vars win; a missing .env is fine
    let _ = dotenv::dotenv();
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn run(args: Args) -> Result<(), String> {
    let command = match &args.command {
        Some(command) => command,
        None => {
            print_usage();
            return Ok(());
        }
    };

    // `tasks` reads local records only and must work without a config file
    if let Command::Tasks = command {
        return cli::run_tasks();
    }

    let ctx = Context::from_args(&args)?;

    match command {
        Command::Enhance { prompt } => cli::run_enhance(&ctx, prompt),
        Command::Submit { prompt, generation } => cli::run_submit(&ctx, prompt, generation),
        Command::Status { handle } => cli::run_status(&ctx, handle),
        Command::Watch { handle, polling } => cli::run_watch(&ctx, handle, polling),
        Command::Generate {
            prompt,
            generation,
            enhance,
            yes,
            output,
            polling,
        } => cli::run_generate(
            &ctx,
            prompt,
            generation,
            *enhance,
            *yes,
            output.as_deref(),
            polling,
        ),
        Command::Download { handle, output } => cli::run_download(&ctx, handle, output.as_deref()),
        Command::Tasks => cli::run_tasks(),
        Command::Config { action } => cli::handle_config_action(&ctx, action.clone()),
    }
}

fn print_usage() {
    println!("veo-studio {}", env!("CARGO_PKG_VERSION"));
    println!("Text-to-video generation with Veo on Vertex AI\n");
    println!("USAGE:");
    println!("    veo-studio <COMMAND>\n");
    println!("COMMANDS:");
    println!("    generate  Enhance, approve, submit and watch a video job");
    println!("    enhance   Rewrite a prompt with Gemini");
    println!("    submit    Submit a generation job");
    println!("    status    Poll an operation once");
    println!("    watch     Poll an operation until it finishes");
    println!("    download  Save the video of a completed operation");
    println!("    tasks     List known tasks");
    println!("    config    Show or create the config file\n");
    println!("Run 'veo-studio --help' for more details.");
}

fn main() {
    // Load .env file before anything else
    load_env();

    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
