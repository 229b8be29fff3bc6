//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `backup` - Archive apps, media, or this tool itself
//! - `restore` - Reinstall apps and extract data archives
//! - `show` - Display configuration, maps and run history
//! - `clean` - Remove entities, maps or the whole tree
//! - `preflight` - Verify the privileged environment before a run

pub mod backup;
pub mod clean;
pub mod preflight;
pub mod restore;
pub mod show;

pub use backup::{cmd_backup_apps, cmd_backup_media, cmd_backup_self};
pub use clean::cmd_clean;
pub use preflight::cmd_preflight;
pub use restore::{cmd_restore_apps, cmd_restore_media};
pub use show::cmd_show;
