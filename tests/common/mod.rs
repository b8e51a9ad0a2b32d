//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{playback_event, TestWarehouse, TEST_ARTIST_NAME, TEST_SONG_TITLE};
//!
//! #[test]
//! fn test_single_play() {
//!     let test_warehouse = TestWarehouse::provisioned();
//!     test_warehouse.sources.write_events(
//!         "events.json",
//!         &[playback_event(10, 1541106673000, TEST_SONG_TITLE, TEST_ARTIST_NAME, 200.5, "free")],
//!     );
//!     test_warehouse.stage();
//!     assert_eq!(test_warehouse.load().songplays.inserted, 1);
//! }
//! ```

mod constants;
mod fixtures;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::{
    page_event, playback_event, song_record, test_song_record, TestSources, TestWarehouse,
};
