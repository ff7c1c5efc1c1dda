use crate::error::Result;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::env;
use std::fs;
use std::path::Path;

lazy_static! {
    static ref DEFAULTS: RwLock<TransmuxerOptions> = RwLock::new(TransmuxerOptions::load());
}

const CONFIG_PATHS: [&str; 2] = ["./vdkmux.toml", "./config/vdkmux.toml"];

/// Options controlling one transmuxer instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmuxerOptions {
    /// Offset added to every `tfdt`, in 90kHz ticks
    pub base_media_decode_time: u64,
    /// Keep source timestamps instead of rebasing them on the first dts
    pub keep_original_timestamps: bool,
    /// Combine audio and video into a single fragment per flush
    pub remux: bool,
    /// Align GOPs against the end of the alignment list instead of the start
    pub align_gops_at_end: bool,
    /// Sequence number given to the first `mfhd`
    pub first_sequence_number: u32,
}

impl Default for TransmuxerOptions {
    fn default() -> Self {
        TransmuxerOptions {
            base_media_decode_time: 0,
            keep_original_timestamps: false,
            remux: true,
            align_gops_at_end: false,
            first_sequence_number: 0,
        }
    }
}

impl TransmuxerOptions {
    fn load() -> Self {
        let mut options = TransmuxerOptions::default();

        // Environment first, config file values override it
        for (key, var) in [
            ("base_media_decode_time", "VDKMUX_BASE_MEDIA_DECODE_TIME"),
            ("keep_original_timestamps", "VDKMUX_KEEP_ORIGINAL_TIMESTAMPS"),
            ("remux", "VDKMUX_REMUX"),
            ("align_gops_at_end", "VDKMUX_ALIGN_GOPS_AT_END"),
            ("first_sequence_number", "VDKMUX_FIRST_SEQUENCE_NUMBER"),
        ] {
            if let Ok(value) = env::var(var) {
                if let Err(e) = options.set(key, &value) {
                    log::warn!("ignoring {}: {}", var, e);
                }
            }
        }

        for path in CONFIG_PATHS {
            if let Ok(content) = fs::read_to_string(path) {
                match options.clone().merge_config(&content) {
                    Ok(merged) => options = merged,
                    Err(e) => log::warn!("ignoring {}: {}", path, e),
                }
            }
        }

        options
    }

    /// Parses `key = value` lines on top of the built-in defaults.
    pub fn parse_config(content: &str) -> Result<Self> {
        TransmuxerOptions::default().merge_config(content)
    }

    fn merge_config(mut self, content: &str) -> Result<Self> {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                self.set(key.trim(), value)?;
            }
        }
        Ok(self)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "base_media_decode_time" => self.base_media_decode_time = value.parse()?,
            "keep_original_timestamps" => self.keep_original_timestamps = parse_flag(value),
            "remux" => self.remux = parse_flag(value),
            "align_gops_at_end" => self.align_gops_at_end = parse_flag(value),
            "first_sequence_number" => self.first_sequence_number = value.parse()?,
            other => log::debug!("unknown config key {}", other),
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Re-reads defaults from the environment and config files
pub fn reload() {
    *DEFAULTS.write() = TransmuxerOptions::load();
}

/// Returns the process-wide default options
pub fn default_options() -> TransmuxerOptions {
    DEFAULTS.read().clone()
}

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = r#"# VDKMUX Configuration
# Values here override the VDKMUX_* environment variables.

# tfdt offset in 90kHz ticks
base_media_decode_time = 0

# keep source pts/dts instead of rebasing on the first frame
keep_original_timestamps = false

# combine audio and video into one fragment
remux = true

# align gops against the end of the alignment list
align_gops_at_end = false

first_sequence_number = 0
"#;
        fs::write(path, template)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_config() {
        let options = TransmuxerOptions::parse_config(
            "# comment\nbase_media_decode_time = 90000\nremux = \"false\"\nkeep_original_timestamps=yes\n",
        )
        .unwrap();
        assert_eq!(options.base_media_decode_time, 90000);
        assert!(!options.remux);
        assert!(options.keep_original_timestamps);
        assert!(!options.align_gops_at_end);
    }

    #[test]
    fn test_parse_config_bad_integer() {
        assert!(TransmuxerOptions::parse_config("first_sequence_number = abc").is_err());
    }

    #[test]
    fn test_template_round_trip() {
        let path = env::temp_dir().join(format!("vdkmux-template-{}.toml", std::process::id()));
        let _ = fs::remove_file(&path);
        create_default_config_template(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let options = TransmuxerOptions::parse_config(&content).unwrap();
        assert_eq!(options, TransmuxerOptions::default());
        fs::remove_file(&path).unwrap();
    }
}
