//! veo-studio: text-to-video generation with Veo on Vertex AI.
//!
//! The [`veo`] module holds the generation lifecycle (submit, poll, resolve,
//! watch, download). [`config`] and [`cli`] wire it up for the binary.

pub mod cli;
pub mod config;
pub mod veo;
