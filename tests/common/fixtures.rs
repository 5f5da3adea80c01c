//! Test fixture creation for the user database and uploads

use super::constants::*;
use anyhow::Result;
use audio_humanizer_server::user::{SqliteUserStore, UserManager};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Creates a temporary user database with the regular, subscriber and broke users.
/// Returns (temp_dir, db_path)
pub fn create_test_db_with_users() -> Result<(TempDir, PathBuf)> {
    let dir = TempDir::new()?;
    let db_path = dir.path().join("user.db");

    let store = Arc::new(SqliteUserStore::new(&db_path)?);
    let manager = UserManager::new(store, TEST_FREE_CREDITS);

    manager.add_user(TEST_USER, TEST_PASS)?;

    let subscriber_id = manager.add_user(SUBSCRIBER_USER, SUBSCRIBER_PASS)?;
    manager.set_subscription_active(subscriber_id, true)?;

    let broke_id = manager.add_user(BROKE_USER, BROKE_PASS)?;
    manager.set_free_credits(broke_id, 0)?;

    Ok((dir, db_path))
}

/// A small but well-formed 8-bit mono WAV file.
pub fn sample_wav() -> Vec<u8> {
    let samples: Vec<u8> = (0..800u32).map(|i| (128 + (i % 64) as i32 - 32) as u8).collect();
    let data_len = samples.len() as u32;

    let mut wav = Vec::with_capacity(44 + samples.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&8000u32.to_le_bytes());
    wav.extend_from_slice(&8000u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes());
    wav.extend_from_slice(&8u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.extend_from_slice(&samples);
    wav
}
