//! Shared constants for end-to-end tests
#![allow(dead_code)]

// ============================================================================
// Access
// ============================================================================

pub const TEST_ROLE: &str = "arn:aws:iam::123456789012:role/warehouse-reader";

// ============================================================================
// Catalog
// ============================================================================

/// Song matched by `playback_event(.., TEST_SONG_TITLE, TEST_ARTIST_NAME, TEST_SONG_LENGTH, ..)`
pub const TEST_SONG_ID: &str = "SOTEST12AB0187C3F1";
pub const TEST_SONG_TITLE: &str = "Test Song";
pub const TEST_SONG_LENGTH: f64 = 200.5;

pub const TEST_ARTIST_ID: &str = "ARTEST71187B9A53B0";
pub const TEST_ARTIST_NAME: &str = "Test Artist";

pub const OTHER_SONG_ID: &str = "SOOTHER12A8C13C480";
pub const OTHER_ARTIST_ID: &str = "AROTHER1187B99BFB1";

// ============================================================================
// Timestamps (epoch milliseconds, UTC)
// ============================================================================

/// 2018-11-01 21:11:13, a Thursday in ISO week 44
pub const TS_2018_11_01_21_11_13: i64 = 1_541_106_673_000;

/// 2018-11-02 09:30:00
pub const TS_2018_11_02_09_30_00: i64 = 1_541_151_000_000;
