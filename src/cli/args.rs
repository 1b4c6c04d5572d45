//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Generate videos from text prompts with Veo on Vertex AI
#[derive(Parser, Debug)]
#[command(name = "veo-studio")]
#[command(version, about = "Text-to-video generation with Veo on Vertex AI", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Google Cloud project (overrides GCP_PROJECT_ID)
    #[arg(long, global = true)]
    pub project: Option<String>,

    /// Vertex AI region (overrides GCP_LOCATION_ID)
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Veo model id (overrides VEO_MODEL_ID)
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Pre-issued OAuth access token, used instead of service account credentials
    #[arg(long, global = true)]
    pub access_token: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rewrite a prompt with Gemini and print the result
    Enhance {
        /// Prompt to enhance
        prompt: String,
    },
    /// Submit a generation job and print its operation handle
    Submit {
        /// Text prompt
        prompt: String,

        #[command(flatten)]
        generation: GenerationArgs,
    },
    /// Poll an operation once and print its status as JSON
    Status {
        /// Operation handle returned by `submit`
        handle: String,
    },
    /// Poll an operation until it finishes
    Watch {
        /// Operation handle returned by `submit`
        handle: String,

        #[command(flatten)]
        polling: PollingArgs,
    },
    /// Enhance, approve, submit and watch in one go
    Generate {
        /// Text prompt
        prompt: String,

        #[command(flatten)]
        generation: GenerationArgs,

        /// Rewrite the prompt with Gemini first
        #[arg(long)]
        enhance: bool,

        /// Accept the enhanced prompt without asking
        #[arg(long, short)]
        yes: bool,

        /// Download the finished video to this path
        #[arg(long, short)]
        output: Option<PathBuf>,

        #[command(flatten)]
        polling: PollingArgs,
    },
    /// Download the video of a completed operation
    Download {
        /// Operation handle returned by `submit`
        handle: String,

        /// Destination file (default: veo-<hash>.mp4 in the current directory)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// List known tasks and their last status
    Tasks,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct GenerationArgs {
    /// Video length in seconds (1-8)
    #[arg(long, short, default_value = "8")]
    pub duration: u32,

    /// Generate an audio track
    #[arg(long)]
    pub audio: bool,

    /// Cloud Storage destination, e.g. gs://bucket/videos/
    #[arg(long)]
    pub storage_uri: Option<String>,
}

#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct PollingArgs {
    /// Seconds between status checks
    #[arg(long)]
    pub interval: Option<u64>,

    /// Give up after this many polls
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Give up after this many seconds (0 = no limit)
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["veo-studio"]);
        assert!(args.command.is_none());
        assert!(args.config.is_none());
        assert!(!args.verbose);
        assert!(args.project.is_none());
        assert!(args.region.is_none());
        assert!(args.model.is_none());
        assert!(args.access_token.is_none());
    }

    #[test]
    fn test_args_enhance_subcommand() {
        let args = Args::parse_from(["veo-studio", "enhance", "a cat on a skateboard"]);
        match args.command {
            Some(Command::Enhance { prompt }) => assert_eq!(prompt, "a cat on a skateboard"),
            other => panic!("Expected Enhance, got {:?}", other),
        }
    }

    #[test]
    fn test_args_submit_defaults() {
        let args = Args::parse_from(["veo-studio", "submit", "waves"]);
        match args.command {
            Some(Command::Submit { prompt, generation }) => {
                assert_eq!(prompt, "waves");
                assert_eq!(generation.duration, 8);
                assert!(!generation.audio);
                assert!(generation.storage_uri.is_none());
            }
            other => panic!("Expected Submit, got {:?}", other),
        }
    }

    #[test]
    fn test_args_submit_options() {
        let args = Args::parse_from([
            "veo-studio",
            "submit",
            "waves",
            "--duration",
            "5",
            "--audio",
            "--storage-uri",
            "gs://bucket/out/",
        ]);
        match args.command {
            Some(Command::Submit { generation, .. }) => {
                assert_eq!(
                    generation,
                    GenerationArgs {
                        duration: 5,
                        audio: true,
                        storage_uri: Some("gs://bucket/out/".to_string()),
                    }
                );
            }
            other => panic!("Expected Submit, got {:?}", other),
        }
    }

    #[test]
    fn test_args_watch_bounds() {
        let args = Args::parse_from([
            "veo-studio",
            "watch",
            "projects/p/locations/us-central1/operations/1",
            "--interval",
            "5",
            "--max-attempts",
            "10",
            "--timeout",
            "0",
        ]);
        match args.command {
            Some(Command::Watch { handle, polling }) => {
                assert_eq!(handle, "projects/p/locations/us-central1/operations/1");
                assert_eq!(polling.interval, Some(5));
                assert_eq!(polling.max_attempts, Some(10));
                assert_eq!(polling.timeout, Some(0));
            }
            other => panic!("Expected Watch, got {:?}", other),
        }
    }

    #[test]
    fn test_args_generate_flags() {
        let args = Args::parse_from([
            "veo-studio",
            "generate",
            "sunset",
            "--enhance",
            "-y",
            "-o",
            "/tmp/sunset.mp4",
            "-d",
            "4",
        ]);
        match args.command {
            Some(Command::Generate {
                prompt,
                generation,
                enhance,
                yes,
                output,
                polling,
            }) => {
                assert_eq!(prompt, "sunset");
                assert_eq!(generation.duration, 4);
                assert!(enhance);
                assert!(yes);
                assert_eq!(output, Some(PathBuf::from("/tmp/sunset.mp4")));
                assert_eq!(polling, PollingArgs::default());
            }
            other => panic!("Expected Generate, got {:?}", other),
        }
    }

    #[test]
    fn test_args_global_flags_after_subcommand() {
        let args = Args::parse_from([
            "veo-studio",
            "status",
            "op/1",
            "--region",
            "europe-west4",
            "--access-token",
            "ya29.token",
            "-v",
        ]);
        assert_eq!(args.region.as_deref(), Some("europe-west4"));
        assert_eq!(args.access_token.as_deref(), Some("ya29.token"));
        assert!(args.verbose);
        assert!(matches!(args.command, Some(Command::Status { .. })));
    }

    #[test]
    fn test_args_download_output() {
        let args = Args::parse_from(["veo-studio", "download", "op/1", "--output", "clip.mp4"]);
        match args.command {
            Some(Command::Download { handle, output }) => {
                assert_eq!(handle, "op/1");
                assert_eq!(output, Some(PathBuf::from("clip.mp4")));
            }
            other => panic!("Expected Download, got {:?}", other),
        }
    }

    #[test]
    fn test_args_tasks_subcommand() {
        let args = Args::parse_from(["veo-studio", "tasks"]);
        assert!(matches!(args.command, Some(Command::Tasks)));
    }

    #[test]
    fn test_args_config_option() {
        let args = Args::parse_from(["veo-studio", "--config", "/tmp/config.toml"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/config.toml")));

        let args = Args::parse_from(["veo-studio", "-c", "/tmp/test.toml"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/test.toml")));
    }

    #[test]
    fn test_args_config_show_subcommand() {
        let args = Args::parse_from(["veo-studio", "config", "show"]);
        assert!(matches!(
            args.command,
            Some(Command::Config {
                action: ConfigAction::Show
            })
        ));
    }

    #[test]
    fn test_args_config_init_subcommand() {
        let args = Args::parse_from(["veo-studio", "config", "init"]);
        assert!(matches!(
            args.command,
            Some(Command::Config {
                action: ConfigAction::Init
            })
        ));
    }

    #[test]
    fn test_args_missing_prompt_is_rejected() {
        assert!(Args::try_parse_from(["veo-studio", "submit"]).is_err());
    }
}
