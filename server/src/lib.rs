//! Aurora Server
//!
//! WhatsApp Cloud API webhook intake: signature verification, replay
//! protection and keyword auto-replies for inbound messages.

pub mod api;
pub mod config;
pub mod db;
pub mod persistence;
pub mod ratelimit;
pub mod reply;
pub mod util;
pub mod webhook;
pub mod whatsapp;
