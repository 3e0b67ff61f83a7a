use std::fs;
use std::path::Path;

use crate::cli::commands::InitArgs;
use crate::io::workspace::{SETTINGS_FILE, STATE_DIR, discover_workspace};

const SETTINGS_TEMPLATE: &str = r##"# annofold workspace settings

[annotations]
# Whether annotation blocks are folded. Written by `annofold toggle`;
# seeded to false (expanded) on first use when absent.
# collapsed = false

# Apply the current visibility when `annofold open` adds a view or
# `annofold watch` sees focus move. Set to false to only fold on toggle.
apply_on_open = true

# --- Block markers ---
# A block starts at a line matching `start` and ends just above the next
# line matching `end`. Patterns are regexes tested at the start of a line.
[markers]
start = "^# == Schema Info"
end = "^class\\s"

# --- Target files ---
# Documents qualify when their language matches, or when their file name
# ends with the secondary extension (e.g. the old side of a git diff).
[target]
language = "ruby"
secondary_extension = ".rb.git"
"##;

pub fn cmd_init(start: &Path, args: InitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let state_dir = start.join(STATE_DIR);
    let settings_path = state_dir.join(SETTINGS_FILE);

    if settings_path.exists() && !args.force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            settings_path.display()
        )
        .into());
    }

    if let Some(parent) = start.parent().and_then(discover_workspace) {
        eprintln!("Note: enclosing workspace found at {}/", parent.display());
        eprintln!("Creating nested workspace in {}/", start.display());
    }

    fs::create_dir_all(&state_dir)?;
    fs::write(&settings_path, SETTINGS_TEMPLATE)?;
    println!("Initialized annofold workspace in {}/", state_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::{DEFAULT_END_MARKER, DEFAULT_START_MARKER, Settings};

    #[test]
    fn template_parses_to_defaults() {
        let settings: Settings = toml::from_str(SETTINGS_TEMPLATE).unwrap();
        assert_eq!(settings.annotations.collapsed, None);
        assert!(settings.annotations.apply_on_open);
        assert_eq!(settings.markers.start, DEFAULT_START_MARKER);
        assert_eq!(settings.markers.end, DEFAULT_END_MARKER);
        assert_eq!(settings.target.language, "ruby");
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let tmp = tempfile::TempDir::new().unwrap();
        cmd_init(tmp.path(), InitArgs { force: false }).unwrap();
        assert!(cmd_init(tmp.path(), InitArgs { force: false }).is_err());
        assert!(cmd_init(tmp.path(), InitArgs { force: true }).is_ok());
        assert_eq!(discover_workspace(tmp.path()), Some(tmp.path().to_path_buf()));
    }
}
