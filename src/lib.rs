//! # Myth Audio
//!
//! Turns story chapters into structured audio scripts (narration, sound
//! effects, music cues, dialogue) with a generative model, and keeps the paper
//! trail: grant compliance logs, affiliate notifications, and a timeline of
//! session events.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────────────┐
//! │  Chapter  │──▶│  Requester   │──▶│    Normalize     │
//! │  + theme  │   │ Gemini / ––  │   │   AudioScript    │
//! └───────────┘   └──────┬───────┘   └────────┬─────────┘
//!                        │ error              │
//!                        ▼                    ▼
//!                 ┌──────────────┐   ┌──────────────────┐
//!                 │   Fallback   │   │     Session      │
//!                 │    script    │   │ store / notify / │
//!                 └──────────────┘   │     tracker      │
//!                                    └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! myth generate --ebook-id ebook_001 --chapter-number 1 --title "The Summoning"
//! myth progress
//! myth list audio_scripts
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Events, notifications, and collection documents |
//! | [`tracker`] | Append-only session event log |
//! | [`store`] | JSON-file collection store |
//! | [`notify`] | Affiliate broadcast notifications |
//! | [`ai`] | Model requesters and fallback content |
//! | [`session`] | Explicit session tying the stores together |
//! | [`generate`] | Chapter audio script pipeline |

pub mod ai;
pub mod config;
pub mod generate;
pub mod models;
pub mod notify;
pub mod session;
pub mod store;
pub mod tracker;
