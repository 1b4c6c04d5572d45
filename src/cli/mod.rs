//! Command-line interface definitions and helpers.
//!
//! This module contains all CLI argument parsing and subcommand handlers.

mod args;
mod commands;

pub use args::{Args, Command, ConfigAction, GenerationArgs, PollingArgs};
pub use commands::{
    apply_overrides, default_output_path, handle_config_action, init_config, parse_approval,
    run_download, run_enhance, run_generate, run_status, run_submit, run_tasks, run_watch,
    watch_options, Approval, Context,
};
