//! Shared constants for end-to-end tests
//!
//! When test data changes (user credentials, credit balances, etc.),
//! update only this file.

// ============================================================================
// Test User Credentials
// ============================================================================

/// Regular test user handle, starts with TEST_FREE_CREDITS
pub const TEST_USER: &str = "testuser";

/// Regular test user password
pub const TEST_PASS: &str = "testpass123";

/// Subscriber test user handle
pub const SUBSCRIBER_USER: &str = "subscriber";

/// Subscriber test user password
pub const SUBSCRIBER_PASS: &str = "subscriberpass123";

/// Test user with no credits left
pub const BROKE_USER: &str = "broke";

/// Broke test user password
pub const BROKE_PASS: &str = "brokepass123";

/// Credits granted to users created by the fixtures
pub const TEST_FREE_CREDITS: u32 = 2;

// ============================================================================
// Uploads
// ============================================================================

/// Filename sent with uploaded test audio
pub const TEST_AUDIO_FILENAME: &str = "voice memo.wav";

/// Upload limit used by test servers, in bytes
pub const TEST_MAX_UPLOAD_BYTES: u64 = 64 * 1024;

/// Prefix the scripted engine writes in front of processed audio
pub const ENHANCED_MARKER: &[u8] = b"ENHANCED:";

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Interval between server readiness checks (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;

/// Default timeout for HTTP requests in tests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
