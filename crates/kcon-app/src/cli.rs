use std::path::PathBuf;

use clap::Parser;
use kcon_core::Rotation;

/// A standalone virtual-terminal emulator that draws directly to a KMS
/// framebuffer.
#[derive(Debug, Parser)]
#[command(name = "kcon", disable_help_flag = true)]
pub struct Cli {
    /// Enable antialiased (alpha) glyph blit.
    #[arg(short = 'a', default_value_t = true, overrides_with = "no_antialias")]
    pub antialias: bool,
    /// Disable antialiased glyph blit.
    #[arg(short = 'A')]
    pub no_antialias: bool,

    /// Normal font file.
    #[arg(short = 'f')]
    pub font_path: Option<PathBuf>,
    /// Bold font file. Requires `-f`.
    #[arg(short = 'F')]
    pub bold_font_path: Option<PathBuf>,

    /// Font height in pixels (6-128).
    #[arg(short = 's', default_value_t = 16)]
    pub font_size: u32,

    /// Key-repeat delay in ms (100-2000).
    #[arg(short = 'd', default_value_t = 200)]
    pub repeat_delay_ms: u32,

    /// Key-repeat rate in Hz (1-50).
    #[arg(short = 'r', default_value_t = 30)]
    pub repeat_rate_hz: u32,

    /// Idle DPMS-suspend timeout in seconds, 0 disables (30-86400 or 0).
    #[arg(short = 'i', default_value_t = 0)]
    pub idle_timeout_s: u32,

    /// Keyboard layout.
    #[arg(short = 'k', default_value = "us")]
    pub keyboard_layout: String,

    /// Keyboard options.
    #[arg(short = 'o', default_value = "")]
    pub keyboard_options: String,

    /// Keyboard variant.
    #[arg(short = 'v', default_value = "")]
    pub keyboard_variant: String,

    /// Screen rotation in 90-degree steps (0-3).
    #[arg(short = 'p', default_value_t = 0)]
    pub rotation_steps: u8,

    /// White-background default attributes.
    #[arg(short = 'w')]
    pub white_background: bool,

    /// Print usage to stderr and exit 1.
    #[arg(short = 'h')]
    pub help: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("-F requires -f")]
    BoldFontWithoutNormal,
    #[error("-s must be between 6 and 128")]
    FontSizeOutOfRange,
    #[error("-d must be between 100 and 2000")]
    RepeatDelayOutOfRange,
    #[error("-r must be between 1 and 50")]
    RepeatRateOutOfRange,
    #[error("-i must be 0 or between 30 and 86400")]
    IdleTimeoutOutOfRange,
    #[error("-p must be between 0 and 3")]
    RotationOutOfRange,
}

impl Cli {
    /// Cross-flag and range validation `clap`'s declarative API can't
    /// express cleanly: `-F` without `-f`, and every numeric flag's range.
    pub fn validate(&self) -> Result<(), CliError> {
        if self.bold_font_path.is_some() && self.font_path.is_none() {
            return Err(CliError::BoldFontWithoutNormal);
        }
        if !(6..=128).contains(&self.font_size) {
            return Err(CliError::FontSizeOutOfRange);
        }
        if !(100..=2000).contains(&self.repeat_delay_ms) {
            return Err(CliError::RepeatDelayOutOfRange);
        }
        if !(1..=50).contains(&self.repeat_rate_hz) {
            return Err(CliError::RepeatRateOutOfRange);
        }
        if self.idle_timeout_s != 0 && !(30..=86400).contains(&self.idle_timeout_s) {
            return Err(CliError::IdleTimeoutOutOfRange);
        }
        if self.rotation_steps > 3 {
            return Err(CliError::RotationOutOfRange);
        }
        Ok(())
    }

    pub fn antialias_effective(&self) -> bool {
        !self.no_antialias
    }

    pub fn rotation(&self) -> Rotation {
        match self.rotation_steps {
            1 => Rotation::Cw90,
            2 => Rotation::Cw180,
            3 => Rotation::Cw270,
            _ => Rotation::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_font_without_normal_is_rejected() {
        let cli = Cli {
            antialias: true,
            no_antialias: false,
            font_path: None,
            bold_font_path: Some(PathBuf::from("bold.ttf")),
            font_size: 16,
            repeat_delay_ms: 200,
            repeat_rate_hz: 30,
            idle_timeout_s: 0,
            keyboard_layout: "us".into(),
            keyboard_options: String::new(),
            keyboard_variant: String::new(),
            rotation_steps: 0,
            white_background: false,
            help: false,
        };
        assert!(matches!(cli.validate(), Err(CliError::BoldFontWithoutNormal)));
    }

    #[test]
    fn font_size_out_of_range_is_rejected() {
        let mut cli = Cli {
            antialias: true,
            no_antialias: false,
            font_path: None,
            bold_font_path: None,
            font_size: 4,
            repeat_delay_ms: 200,
            repeat_rate_hz: 30,
            idle_timeout_s: 0,
            keyboard_layout: "us".into(),
            keyboard_options: String::new(),
            keyboard_variant: String::new(),
            rotation_steps: 0,
            white_background: false,
            help: false,
        };
        assert!(cli.validate().is_err());
        cli.font_size = 16;
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn idle_timeout_zero_is_allowed_as_disabled() {
        let cli = Cli {
            antialias: true,
            no_antialias: false,
            font_path: None,
            bold_font_path: None,
            font_size: 16,
            repeat_delay_ms: 200,
            repeat_rate_hz: 30,
            idle_timeout_s: 0,
            keyboard_layout: "us".into(),
            keyboard_options: String::new(),
            keyboard_variant: String::new(),
            rotation_steps: 0,
            white_background: false,
            help: false,
        };
        assert!(cli.validate().is_ok());
    }
}
