//! Output files under the data directory.
//!
//! # Output Structure
//!
//! ```text
//! data/
//! ├── daily_summary_2025-08-07.json             # summaries, one entry per article
//! ├── daily_summary_2025-08-07_with_audio.json  # same, plus `audio` URLs
//! ├── daily_full_article_2025-08-07.json        # every fetched article, raw fields included
//! └── usage_tracker.json                        # monthly budget (see `usage`)
//!
//! output/audio/
//! └── 2025-08-07/
//!     ├── article_01.mp3
//!     └── article_02.mp3
//! ```

pub mod json;
